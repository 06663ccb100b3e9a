//! Configuration module for the audit pipeline.
//!
//! Handles loading and validating pipeline configuration from TOML files.

mod settings;

pub use settings::*;
