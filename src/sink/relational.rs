//! Relational sink: maps audit entries to rows in the activity table.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::AuditResult;
use crate::event::{AuditAction, LogEventEntry};

use super::AuditSink;

/// The activity table audits everything else, so it must never audit itself.
const ACTIVITY_TABLE: &str = "tb_activity";

/// Sink that persists audit entries to the `tb_activity` table.
///
/// The connection pool is owned by the host; [`AuditSink::close`] is a no-op.
pub struct RelationalSink {
    pool: PgPool,
    exclude_models: HashSet<String>,
}

struct ActivityRow {
    id: Uuid,
    action: &'static str,
    entity_type: String,
    entity_id: Option<Uuid>,
    actor_id: Option<Uuid>,
    old_data: Value,
    new_data: Value,
    meta_data: Value,
    ip_address: Option<String>,
    user_agent: Option<String>,
    description: String,
    created_by_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl RelationalSink {
    /// Create the sink. `exclude_models` extends the built-in exclusion of
    /// the activity table itself.
    pub fn new(pool: PgPool, exclude_models: &[String]) -> Self {
        let mut exclude: HashSet<String> = exclude_models.iter().cloned().collect();
        exclude.insert(ACTIVITY_TABLE.to_string());
        Self {
            pool,
            exclude_models: exclude,
        }
    }

    /// Create the activity table if it does not exist yet.
    pub async fn ensure_schema(&self) -> AuditResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tb_activity (
                id UUID PRIMARY KEY,
                action TEXT NOT NULL,
                entity_type TEXT NOT NULL,
                entity_id UUID,
                actor_id UUID,
                old_data JSONB NOT NULL,
                new_data JSONB NOT NULL,
                meta_data JSONB NOT NULL,
                ip_address TEXT,
                user_agent TEXT,
                description TEXT NOT NULL,
                created_by_id UUID,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Translate an action into the activity vocabulary.
    fn db_action(action: AuditAction) -> &'static str {
        match action {
            AuditAction::Access => "view",
            AuditAction::Create => "create",
            AuditAction::Update => "update",
            AuditAction::Delete => "delete",
            AuditAction::Login => "login",
            AuditAction::Logout => "logout",
        }
    }

    /// Normalize an entity name: strip the table prefix, CamelCase to
    /// lower_snake_case.
    fn entity_type(entity_name: &str) -> String {
        let stripped = entity_name.strip_prefix("tb_").unwrap_or(entity_name);
        let mut out = String::with_capacity(stripped.len() + 4);
        for ch in stripped.chars() {
            if ch.is_ascii_uppercase() {
                if !out.is_empty() {
                    out.push('_');
                }
                out.push(ch.to_ascii_lowercase());
            } else {
                out.push(ch);
            }
        }
        out
    }

    /// Parse an upstream id only if it has UUID shape; malformed ids become
    /// NULL instead of violating the column type.
    fn as_uuid(value: Option<&str>) -> Option<Uuid> {
        value.and_then(|v| Uuid::parse_str(v).ok())
    }

    fn description(entry: &LogEventEntry, action: &str) -> String {
        if matches!(entry.action, AuditAction::Login | AuditAction::Logout) {
            let verb = if entry.action == AuditAction::Login {
                "logged in"
            } else {
                "logged out"
            };
            return match entry
                .metadata
                .as_ref()
                .and_then(|m| m.get("email"))
                .and_then(|v| v.as_str())
            {
                Some(email) => format!("User {} {}", email, verb),
                None => format!("User {}", verb),
            };
        }

        match &entry.record_id {
            Some(record_id) => format!("{} on {} ({})", action, entry.entity_name, record_id),
            None => format!("{} on {}", action, entry.entity_name),
        }
    }

    fn build_row(entry: &LogEventEntry) -> ActivityRow {
        let action = Self::db_action(entry.action);
        let actor = Self::as_uuid(Some(entry.user_id.as_str()));
        ActivityRow {
            id: entry.id,
            action,
            entity_type: Self::entity_type(&entry.entity_name),
            entity_id: Self::as_uuid(entry.record_id.as_deref()),
            actor_id: actor,
            old_data: entry
                .before_data
                .clone()
                .map(Value::Object)
                .unwrap_or_else(|| Value::Object(Default::default())),
            new_data: entry
                .after_data
                .clone()
                .map(Value::Object)
                .unwrap_or_else(|| Value::Object(Default::default())),
            meta_data: entry
                .metadata
                .clone()
                .map(Value::Object)
                .unwrap_or_else(|| Value::Object(Default::default())),
            ip_address: entry
                .metadata
                .as_ref()
                .and_then(|m| m.get("ip_address"))
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
            user_agent: entry
                .metadata
                .as_ref()
                .and_then(|m| m.get("user_agent"))
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
            description: Self::description(entry, action),
            created_by_id: actor,
            created_at: DateTime::parse_from_rfc3339(&entry.timestamp)
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        }
    }

    fn rows_for(&self, entries: &[LogEventEntry]) -> Vec<ActivityRow> {
        entries
            .iter()
            .filter(|entry| !self.exclude_models.contains(&entry.entity_name))
            .map(Self::build_row)
            .collect()
    }

    async fn insert_row(&self, row: &ActivityRow) -> AuditResult<()> {
        sqlx::query(
            r#"
            INSERT INTO tb_activity
                (id, action, entity_type, entity_id, actor_id, old_data, new_data,
                 meta_data, ip_address, user_agent, description, created_by_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(row.id)
        .bind(row.action)
        .bind(&row.entity_type)
        .bind(row.entity_id)
        .bind(row.actor_id)
        .bind(&row.old_data)
        .bind(&row.new_data)
        .bind(&row.meta_data)
        .bind(&row.ip_address)
        .bind(&row.user_agent)
        .bind(&row.description)
        .bind(row.created_by_id)
        .bind(row.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_rows_bulk(&self, rows: &[ActivityRow]) -> AuditResult<()> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO tb_activity \
             (id, action, entity_type, entity_id, actor_id, old_data, new_data, \
              meta_data, ip_address, user_agent, description, created_by_id, created_at) ",
        );
        builder.push_values(rows, |mut b, row| {
            b.push_bind(row.id)
                .push_bind(row.action)
                .push_bind(&row.entity_type)
                .push_bind(row.entity_id)
                .push_bind(row.actor_id)
                .push_bind(&row.old_data)
                .push_bind(&row.new_data)
                .push_bind(&row.meta_data)
                .push_bind(&row.ip_address)
                .push_bind(&row.user_agent)
                .push_bind(&row.description)
                .push_bind(row.created_by_id)
                .push_bind(row.created_at);
        });
        builder.push(" ON CONFLICT (id) DO NOTHING");
        builder.build().execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl AuditSink for RelationalSink {
    fn name(&self) -> &'static str {
        "database"
    }

    async fn write(&self, entry: &LogEventEntry) -> AuditResult<()> {
        if self.exclude_models.contains(&entry.entity_name) {
            return Ok(());
        }
        self.insert_row(&Self::build_row(entry)).await
    }

    async fn write_batch(&self, entries: &[LogEventEntry]) -> AuditResult<()> {
        let rows = self.rows_for(entries);
        if rows.is_empty() {
            return Ok(());
        }

        match self.insert_rows_bulk(&rows).await {
            Ok(()) => Ok(()),
            Err(bulk_err) => {
                // One malformed row must not sink the batch; retry row by row.
                warn!(error = %bulk_err, rows = rows.len(),
                    "Bulk activity insert failed, falling back to individual writes");
                let mut last_err = None;
                let mut failed = 0usize;
                for row in &rows {
                    if let Err(e) = self.insert_row(row).await {
                        warn!(error = %e, id = %row.id, "Individual activity insert failed");
                        failed += 1;
                        last_err = Some(e);
                    }
                }
                match last_err {
                    // Nothing got through: treat as a transient sink outage so
                    // the buffer manager requeues the batch.
                    Some(e) if failed == rows.len() => Err(e),
                    _ => {
                        if failed > 0 {
                            debug!(failed, total = rows.len(), "Dropped malformed activity rows");
                        }
                        Ok(())
                    }
                }
            }
        }
    }

    async fn close(&self) -> AuditResult<()> {
        // Connection lifecycle is owned by the host.
        Ok(())
    }
}
