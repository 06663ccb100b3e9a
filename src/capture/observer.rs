//! Typed capture surface for the data layer.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::event::AuditAction;
use crate::service::AuditService;

/// Entity name used for login/logout events.
const USER_ENTITY: &str = "tb_user";

/// Explicit "observe this operation" surface for data-access code.
///
/// Each mutation or read call site invokes the matching method with the
/// entity name and payloads it already has in hand; the observer attributes
/// the event to the task-bound context and enqueues it. Every method is
/// fire-and-forget and never fails back into the caller.
#[derive(Clone)]
pub struct CaptureObserver {
    service: Arc<AuditService>,
}

impl CaptureObserver {
    pub fn new(service: Arc<AuditService>) -> Self {
        Self { service }
    }

    /// A single record was created.
    pub async fn created(
        &self,
        entity_name: &str,
        record_id: Option<String>,
        after_data: Option<Map<String, Value>>,
    ) {
        self.service
            .notify(AuditAction::Create, entity_name, record_id, None, after_data, None)
            .await;
    }

    /// A bulk create finished; individual ids are not known.
    pub async fn created_many(&self, entity_name: &str, count: u64, data: Option<Value>) {
        let mut after = Map::new();
        after.insert("count".to_string(), Value::from(count));
        if let Some(data) = data {
            after.insert("data".to_string(), data);
        }
        self.service
            .notify(AuditAction::Create, entity_name, None, None, Some(after), None)
            .await;
    }

    /// A single record was read.
    pub async fn accessed(&self, entity_name: &str, record_id: Option<String>) {
        self.service
            .notify(AuditAction::Access, entity_name, record_id, None, None, None)
            .await;
    }

    /// A query returned a set of records.
    pub async fn accessed_many(&self, entity_name: &str, count: u64) {
        let mut after = Map::new();
        after.insert("count".to_string(), Value::from(count));
        self.service
            .notify(AuditAction::Access, entity_name, None, None, Some(after), None)
            .await;
    }

    /// A single record was updated.
    pub async fn updated(
        &self,
        entity_name: &str,
        record_id: Option<String>,
        before_data: Option<Map<String, Value>>,
        after_data: Option<Map<String, Value>>,
    ) {
        self.service
            .notify(
                AuditAction::Update,
                entity_name,
                record_id,
                before_data,
                after_data,
                None,
            )
            .await;
    }

    /// A bulk update ran against a filter.
    pub async fn updated_many(
        &self,
        entity_name: &str,
        filter: Value,
        count: u64,
        data: Option<Value>,
    ) {
        let mut before = Map::new();
        before.insert("where".to_string(), filter);
        let mut after = Map::new();
        after.insert("count".to_string(), Value::from(count));
        if let Some(data) = data {
            after.insert("data".to_string(), data);
        }
        self.service
            .notify(
                AuditAction::Update,
                entity_name,
                None,
                Some(before),
                Some(after),
                None,
            )
            .await;
    }

    /// A single record was deleted; `before_data` is its last state.
    pub async fn deleted(
        &self,
        entity_name: &str,
        record_id: Option<String>,
        before_data: Option<Map<String, Value>>,
    ) {
        self.service
            .notify(AuditAction::Delete, entity_name, record_id, before_data, None, None)
            .await;
    }

    /// A bulk delete ran against a filter.
    pub async fn deleted_many(&self, entity_name: &str, filter: Value, count: u64) {
        let mut before = Map::new();
        before.insert("where".to_string(), filter);
        let mut after = Map::new();
        after.insert("count".to_string(), Value::from(count));
        self.service
            .notify(
                AuditAction::Delete,
                entity_name,
                None,
                Some(before),
                Some(after),
                None,
            )
            .await;
    }

    /// A user authenticated.
    pub async fn logged_in(&self, user_id: Option<String>, email: &str) {
        self.login_event(AuditAction::Login, user_id, email).await;
    }

    /// A user ended their session.
    pub async fn logged_out(&self, user_id: Option<String>, email: &str) {
        self.login_event(AuditAction::Logout, user_id, email).await;
    }

    async fn login_event(&self, action: AuditAction, user_id: Option<String>, email: &str) {
        let mut metadata = Map::new();
        metadata.insert("email".to_string(), Value::String(email.to_string()));
        self.service
            .notify(action, USER_ENTITY, user_id, None, None, Some(metadata))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuditConfig;
    use crate::error::AuditResult;
    use crate::event::LogEventEntry;
    use crate::sink::AuditSink;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    struct CollectingSink {
        written: Mutex<Vec<LogEventEntry>>,
    }

    #[async_trait]
    impl AuditSink for CollectingSink {
        fn name(&self) -> &'static str {
            "collector"
        }

        async fn write(&self, entry: &LogEventEntry) -> AuditResult<()> {
            self.written.lock().unwrap().push(entry.clone());
            Ok(())
        }

        async fn write_batch(&self, entries: &[LogEventEntry]) -> AuditResult<()> {
            self.written.lock().unwrap().extend_from_slice(entries);
            Ok(())
        }

        async fn close(&self) -> AuditResult<()> {
            Ok(())
        }
    }

    async fn observer_with_sink() -> (CaptureObserver, Arc<CollectingSink>, Arc<AuditService>) {
        let sink = Arc::new(CollectingSink {
            written: Mutex::new(Vec::new()),
        });
        let mut config = AuditConfig::new("/tmp/audit-unused");
        config.save_to_file = false;
        config.flush_interval_ms = 60_000;
        let service = Arc::new(
            AuditService::builder(config)
                .with_sink(sink.clone())
                .build()
                .unwrap(),
        );
        (CaptureObserver::new(service.clone()), sink, service)
    }

    #[tokio::test]
    async fn test_created_maps_to_create_with_after_data() {
        let (observer, sink, service) = observer_with_sink().await;
        observer
            .created(
                "tb_customer",
                Some("rec-1".to_string()),
                json!({"name": "a"}).as_object().cloned(),
            )
            .await;
        service.close().await;

        let written = sink.written.lock().unwrap();
        assert_eq!(written[0].action, AuditAction::Create);
        assert_eq!(written[0].record_id.as_deref(), Some("rec-1"));
        assert_eq!(written[0].after_data.as_ref().unwrap()["name"], "a");
        assert!(written[0].before_data.is_none());
    }

    #[tokio::test]
    async fn test_accessed_many_records_result_count() {
        let (observer, sink, service) = observer_with_sink().await;
        observer.accessed_many("tb_customer", 17).await;
        service.close().await;

        let written = sink.written.lock().unwrap();
        assert_eq!(written[0].action, AuditAction::Access);
        assert_eq!(written[0].after_data.as_ref().unwrap()["count"], 17);
    }

    #[tokio::test]
    async fn test_updated_many_carries_filter_as_before_data() {
        let (observer, sink, service) = observer_with_sink().await;
        observer
            .updated_many(
                "tb_customer",
                json!({"status": "inactive"}),
                3,
                Some(json!({"status": "archived"})),
            )
            .await;
        service.close().await;

        let written = sink.written.lock().unwrap();
        let before = written[0].before_data.as_ref().unwrap();
        assert_eq!(before["where"]["status"], "inactive");
        let after = written[0].after_data.as_ref().unwrap();
        assert_eq!(after["count"], 3);
        assert_eq!(after["data"]["status"], "archived");
    }

    #[tokio::test]
    async fn test_deleted_keeps_last_state() {
        let (observer, sink, service) = observer_with_sink().await;
        observer
            .deleted(
                "tb_customer",
                Some("rec-9".to_string()),
                json!({"name": "gone"}).as_object().cloned(),
            )
            .await;
        service.close().await;

        let written = sink.written.lock().unwrap();
        assert_eq!(written[0].action, AuditAction::Delete);
        assert_eq!(written[0].before_data.as_ref().unwrap()["name"], "gone");
        assert!(written[0].after_data.is_none());
    }

    #[tokio::test]
    async fn test_login_carries_email_metadata() {
        let (observer, sink, service) = observer_with_sink().await;
        observer
            .logged_in(Some("user-1".to_string()), "a@example.com")
            .await;
        service.close().await;

        let written = sink.written.lock().unwrap();
        assert_eq!(written[0].action, AuditAction::Login);
        assert_eq!(written[0].entity_name, "tb_user");
        assert_eq!(
            written[0].metadata.as_ref().unwrap()["email"],
            "a@example.com"
        );
    }
}
