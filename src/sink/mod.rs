//! Durable sinks for audit entries.
//!
//! A sink persists batches of audit entries to one destination. Sinks are
//! independent: the buffer manager fans each flush out to every enabled sink
//! and records per-sink outcomes, so one sink's failure never rolls back
//! another's write.

mod file;
mod relational;

use async_trait::async_trait;

use crate::error::AuditResult;
use crate::event::LogEventEntry;

pub use file::RotatingFileSink;
pub use relational::RelationalSink;

/// A durable destination for audit entries.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Short sink name used in log messages.
    fn name(&self) -> &'static str;

    /// Persist a single entry.
    async fn write(&self, entry: &LogEventEntry) -> AuditResult<()>;

    /// Persist a batch of entries.
    ///
    /// An error means the batch as a whole must be considered undelivered to
    /// this sink; the buffer manager will retry it.
    async fn write_batch(&self, entries: &[LogEventEntry]) -> AuditResult<()>;

    /// Release any resources held by the sink. Safe to call more than once.
    async fn close(&self) -> AuditResult<()>;
}
