//! Event factory: turns observed operations into audit entries.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use crate::config::AuditConfig;
use crate::context;

use super::entry::{AuditAction, LogEventEntry};
use super::mask::{mask_sensitive_data, sensitive_field_set};

/// Builds canonical [`LogEventEntry`] values from intercepted operations.
///
/// Reads the task-bound [`crate::context::AuditContext`] to attribute each
/// entry; when no context is bound the entry is attributed to the documented
/// fallback identity instead of failing, so capture can never fault the
/// operation it observes.
pub struct EventFactory {
    exclude_models: HashSet<String>,
    sensitive_fields: HashSet<String>,
}

impl EventFactory {
    pub fn new(config: Arc<AuditConfig>) -> Self {
        Self {
            exclude_models: config.exclude_models.iter().cloned().collect(),
            sensitive_fields: sensitive_field_set(&config.sensitive_fields),
        }
    }

    /// Build an entry for an observed operation.
    ///
    /// Returns `None` when `entity_name` is excluded from auditing; the
    /// caller must not enqueue anything in that case.
    pub fn build(
        &self,
        action: AuditAction,
        entity_name: &str,
        record_id: Option<String>,
        before_data: Option<Map<String, Value>>,
        after_data: Option<Map<String, Value>>,
        metadata: Option<Map<String, Value>>,
    ) -> Option<LogEventEntry> {
        if self.exclude_models.contains(entity_name) {
            debug!(entity = entity_name, "Skipping audit for excluded entity");
            return None;
        }

        let context = context::current();

        let mut meta = metadata.unwrap_or_default();
        if let Some(ctx) = &context {
            meta.insert(
                "request_id".to_string(),
                Value::String(ctx.request_id.to_string()),
            );
            if let Some(ip) = &ctx.ip_address {
                meta.insert("ip_address".to_string(), Value::String(ip.clone()));
            }
            if let Some(agent) = &ctx.user_agent {
                meta.insert("user_agent".to_string(), Value::String(agent.clone()));
            }
        }

        let context = context.unwrap_or_else(crate::context::AuditContext::fallback);

        Some(LogEventEntry {
            id: Uuid::new_v4(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            tenant_id: context.tenant_id,
            user_id: context.user_id,
            action,
            entity_name: entity_name.to_string(),
            record_id,
            before_data: mask_sensitive_data(before_data, &self.sensitive_fields),
            after_data: mask_sensitive_data(after_data, &self.sensitive_fields),
            metadata: if meta.is_empty() { None } else { Some(meta) },
        })
    }
}
