//! Audit event model.
//!
//! Defines the canonical audit entry, sensitive-field masking, and the
//! factory that builds entries from intercepted operations.

mod entry;
mod factory;
mod mask;

pub use entry::{AuditAction, LogEventEntry};
pub use factory::EventFactory;
pub use mask::{mask_sensitive_data, sensitive_field_set, DEFAULT_SENSITIVE_FIELDS, REDACTION_MARKER};
