//! Configuration settings for the audit pipeline.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::AuditError;

/// File rotation strategy for the rotating file sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationStrategy {
    /// One file per calendar date (UTC).
    Daily,
    /// Date-keyed files with a sequence counter, rotated at `max_file_size_mb`.
    Size,
}

/// Main configuration structure for the audit pipeline.
///
/// Loaded once at startup and shared read-only for the process lifetime.
#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    /// Directory for audit log files.
    pub log_directory: PathBuf,
    /// Prefix for audit log file names.
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
    /// Rotation strategy for the file sink.
    #[serde(default = "default_rotation_strategy")]
    pub rotation_strategy: RotationStrategy,
    /// Maximum file size in MB (size-based rotation only).
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,
    /// Number of buffered entries that forces a flush.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// Timer-triggered flush period in milliseconds.
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    /// Entity names that are never audited.
    #[serde(default)]
    pub exclude_models: Vec<String>,
    /// Field names masked in before/after payloads, in addition to the
    /// built-in sensitive set.
    #[serde(default)]
    pub sensitive_fields: Vec<String>,
    /// Whether the rotating file sink is enabled.
    #[serde(default = "default_save_to_file")]
    pub save_to_file: bool,
    /// Whether the relational sink is enabled.
    #[serde(default)]
    pub save_to_database: bool,
}

// Default value functions
fn default_file_prefix() -> String {
    "audit".to_string()
}

fn default_rotation_strategy() -> RotationStrategy {
    RotationStrategy::Daily
}

fn default_max_file_size_mb() -> u64 {
    100
}

fn default_buffer_size() -> usize {
    100
}

fn default_flush_interval_ms() -> u64 {
    5000
}

fn default_save_to_file() -> bool {
    true
}

impl AuditConfig {
    /// Create a configuration with default values for the given log directory.
    pub fn new<P: Into<PathBuf>>(log_directory: P) -> Self {
        Self {
            log_directory: log_directory.into(),
            file_prefix: default_file_prefix(),
            rotation_strategy: default_rotation_strategy(),
            max_file_size_mb: default_max_file_size_mb(),
            buffer_size: default_buffer_size(),
            flush_interval_ms: default_flush_interval_ms(),
            exclude_models: Vec::new(),
            sensitive_fields: Vec::new(),
            save_to_file: default_save_to_file(),
            save_to_database: false,
        }
    }

    /// Load settings from a TOML configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, AuditError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| AuditError::Config {
            message: format!("Failed to read config file '{}': {}", path.display(), e),
        })?;

        let config: AuditConfig = toml::from_str(&content).map_err(|e| AuditError::Config {
            message: format!("Failed to parse config file '{}': {}", path.display(), e),
        })?;

        config.validate()?;

        Ok(config)
    }

    /// Validate the settings.
    pub fn validate(&self) -> Result<(), AuditError> {
        if self.buffer_size == 0 {
            return Err(AuditError::Config {
                message: "buffer_size must be greater than zero".to_string(),
            });
        }

        if self.flush_interval_ms == 0 {
            return Err(AuditError::Config {
                message: "flush_interval_ms must be greater than zero".to_string(),
            });
        }

        if self.max_file_size_mb == 0 {
            return Err(AuditError::Config {
                message: "max_file_size_mb must be greater than zero".to_string(),
            });
        }

        Ok(())
    }

    /// Maximum file size in bytes for size-based rotation.
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb * 1024 * 1024
    }
}
