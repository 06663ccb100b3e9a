//! Sensitive-field masking for audit payloads.
//!
//! Masking is shallow on purpose: only top-level keys of a payload are
//! compared against the sensitive set, and matching is case-sensitive. A
//! nested object under a non-sensitive key is persisted as-is.

use std::collections::HashSet;

use serde_json::{Map, Value};

/// Replacement written in place of a sensitive value.
pub const REDACTION_MARKER: &str = "[REDACTED]";

/// Field names that are always masked, regardless of configuration.
pub const DEFAULT_SENSITIVE_FIELDS: &[&str] = &["password", "secret", "token", "api_key", "hash"];

/// Build the effective sensitive set: built-in defaults plus configured extras.
pub fn sensitive_field_set(configured: &[String]) -> HashSet<String> {
    DEFAULT_SENSITIVE_FIELDS
        .iter()
        .map(|s| s.to_string())
        .chain(configured.iter().cloned())
        .collect()
}

/// Mask the top-level sensitive keys of a payload.
pub fn mask_sensitive_data(
    data: Option<Map<String, Value>>,
    sensitive_fields: &HashSet<String>,
) -> Option<Map<String, Value>> {
    let mut data = data?;
    for (key, value) in data.iter_mut() {
        if sensitive_fields.contains(key) {
            *value = Value::String(REDACTION_MARKER.to_string());
        }
    }
    Some(data)
}
