//! Audit service facade and builder.

use std::future::Future;
use std::sync::Arc;

use serde_json::{Map, Value};
use sqlx::PgPool;

use crate::buffer::AuditBufferManager;
use crate::config::AuditConfig;
use crate::context::{self, AuditContext};
use crate::error::{AuditError, AuditResult};
use crate::event::{AuditAction, EventFactory};
use crate::sink::{AuditSink, RelationalSink, RotatingFileSink};

/// Facade over the capture pipeline.
///
/// Construction wires the configured sinks and starts the flush timer, so it
/// must happen inside a tokio runtime. One service instance is shared for
/// the process lifetime; call [`close`](AuditService::close) (or register
/// [`crate::service::spawn_shutdown_listener`]) before exit to drain the
/// buffer.
pub struct AuditService {
    factory: EventFactory,
    buffer: Arc<AuditBufferManager>,
}

impl AuditService {
    /// Start building a service for the given configuration.
    pub fn builder(config: AuditConfig) -> AuditServiceBuilder {
        AuditServiceBuilder {
            config,
            pool: None,
            extra_sinks: Vec::new(),
        }
    }

    /// Record an observed operation.
    ///
    /// Fire-and-forget: exclusion rules may drop the event, and any internal
    /// failure is logged rather than surfaced, so this can never fault the
    /// business operation being observed. May transiently block when the
    /// buffer threshold is crossed and this call performs the flush.
    pub async fn notify(
        &self,
        action: AuditAction,
        entity_name: &str,
        record_id: Option<String>,
        before_data: Option<Map<String, Value>>,
        after_data: Option<Map<String, Value>>,
        metadata: Option<Map<String, Value>>,
    ) {
        if let Some(entry) = self.factory.build(
            action,
            entity_name,
            record_id,
            before_data,
            after_data,
            metadata,
        ) {
            self.buffer.add(entry).await;
        }
    }

    /// Run a future with `context` bound as the active audit context.
    ///
    /// Request frameworks call this once per inbound request, wrapping the
    /// request continuation.
    pub async fn run_with_context<F>(&self, context: AuditContext, future: F) -> F::Output
    where
        F: Future,
    {
        context::scope(context, future).await
    }

    /// Force a flush of the pending buffer.
    pub async fn flush(&self) {
        self.buffer.flush().await;
    }

    /// Number of entries waiting in the buffer. Exposed for monitoring.
    pub fn buffer_len(&self) -> usize {
        self.buffer.buffer_len()
    }

    /// Drain the buffer and close every sink. Idempotent.
    pub async fn close(&self) {
        self.buffer.close().await;
    }
}

/// Builder wiring sinks from configuration.
pub struct AuditServiceBuilder {
    config: AuditConfig,
    pool: Option<PgPool>,
    extra_sinks: Vec<Arc<dyn AuditSink>>,
}

impl AuditServiceBuilder {
    /// Supply the database pool backing the relational sink.
    pub fn with_pool(mut self, pool: PgPool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Add a custom sink alongside the configured ones.
    pub fn with_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.extra_sinks.push(sink);
        self
    }

    /// Validate the configuration and assemble the service.
    pub fn build(self) -> AuditResult<AuditService> {
        self.config.validate()?;

        let config = Arc::new(self.config);
        let mut sinks = self.extra_sinks;

        if config.save_to_file {
            sinks.push(Arc::new(RotatingFileSink::new(&config)?));
        }

        if config.save_to_database {
            let pool = self.pool.ok_or_else(|| AuditError::Config {
                message: "save_to_database is enabled but no database pool was provided"
                    .to_string(),
            })?;
            sinks.push(Arc::new(RelationalSink::new(pool, &config.exclude_models)));
        }

        let buffer = AuditBufferManager::new(sinks, &config);

        Ok(AuditService {
            factory: EventFactory::new(config),
            buffer,
        })
    }
}
