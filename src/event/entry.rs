//! Audit event entry types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Action observed on an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    /// A read of one or more records.
    Access,
    Create,
    Update,
    Delete,
    Login,
    Logout,
}

impl AuditAction {
    /// Lowercase wire name of the action.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Access => "access",
            AuditAction::Create => "create",
            AuditAction::Update => "update",
            AuditAction::Delete => "delete",
            AuditAction::Login => "login",
            AuditAction::Logout => "logout",
        }
    }
}

/// One durable record of an observed action on an entity.
///
/// Built by the [`crate::event::EventFactory`] with a fresh id and timestamp;
/// treated as immutable from then on. Payload maps are already masked when
/// the entry exists.
///
/// Serialized as a single JSON object; `record_id`, `before_data` and
/// `after_data` appear as `null` when absent while `metadata` is omitted
/// entirely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEventEntry {
    /// Globally unique entry id, never reused.
    pub id: Uuid,
    /// Creation time, RFC 3339 UTC.
    pub timestamp: String,
    pub tenant_id: String,
    pub user_id: String,
    pub action: AuditAction,
    pub entity_name: String,
    pub record_id: Option<String>,
    /// State before the operation, sensitive fields masked.
    pub before_data: Option<Map<String, Value>>,
    /// State after the operation, sensitive fields masked.
    pub after_data: Option<Map<String, Value>>,
    /// Request provenance (`request_id`, `ip_address`, `user_agent`) plus
    /// caller-supplied extras such as `email` for login/logout events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}
