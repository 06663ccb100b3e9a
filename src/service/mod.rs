//! Audit service facade.
//!
//! Ties the event factory and buffer manager together behind the single
//! entry point host code talks to, and wires process-signal shutdown.

mod audit_service;
mod shutdown;

pub use audit_service::{AuditService, AuditServiceBuilder};
pub use shutdown::spawn_shutdown_listener;
