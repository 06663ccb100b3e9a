//! Buffer manager: accumulates audit entries and flushes them to sinks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::future::join_all;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::AuditConfig;
use crate::event::LogEventEntry;
use crate::sink::AuditSink;

/// Coordination core of the pipeline.
///
/// Entries are appended to an in-memory queue and drained to every enabled
/// sink when the queue reaches the configured size, when the flush timer
/// fires, or on [`close`](AuditBufferManager::close). Delivery is
/// at-least-once: a failed batch is requeued whole, so sinks that already
/// accepted it may see it again on retry.
///
/// The queue is unbounded; if every sink is down for long enough the buffer
/// grows until delivery resumes. [`buffer_len`](AuditBufferManager::buffer_len)
/// exposes the depth as an observability signal.
pub struct AuditBufferManager {
    queue: Mutex<Vec<LogEventEntry>>,
    sinks: Vec<Arc<dyn AuditSink>>,
    buffer_size: usize,
    is_flushing: AtomicBool,
    is_shutting_down: AtomicBool,
    closed: AtomicBool,
    flush_timer: Mutex<Option<JoinHandle<()>>>,
}

impl AuditBufferManager {
    /// Create the manager and start its flush timer.
    pub fn new(sinks: Vec<Arc<dyn AuditSink>>, config: &AuditConfig) -> Arc<Self> {
        let manager = Arc::new(Self {
            queue: Mutex::new(Vec::new()),
            sinks,
            buffer_size: config.buffer_size,
            is_flushing: AtomicBool::new(false),
            is_shutting_down: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            flush_timer: Mutex::new(None),
        });
        manager.start_flush_timer(Duration::from_millis(config.flush_interval_ms));
        manager
    }

    fn start_flush_timer(self: &Arc<Self>, period: Duration) {
        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut timer = tokio::time::interval(period);
            // The first tick of a tokio interval completes immediately.
            timer.tick().await;
            loop {
                timer.tick().await;
                manager.flush().await;
            }
        });
        *lock_ignore_poison(&self.flush_timer) = Some(handle);
    }

    /// Append an entry to the queue.
    ///
    /// When the append fills the buffer, the calling task performs the flush
    /// before returning; this is the only case where `add` blocks. After
    /// shutdown has begun the queue is bypassed and the entry is written
    /// straight to every sink, best-effort.
    pub async fn add(&self, entry: LogEventEntry) {
        if self.is_shutting_down.load(Ordering::SeqCst) {
            self.write_through(&entry).await;
            return;
        }

        let should_flush = {
            let mut queue = lock_ignore_poison(&self.queue);
            queue.push(entry);
            queue.len() >= self.buffer_size
        };

        if should_flush {
            self.flush().await;
        }
    }

    /// Drain the queue and dispatch the batch to all sinks concurrently.
    ///
    /// Reentrant-safe: while a flush is running, further calls (from the
    /// timer or from producers) return immediately. On any sink failure the
    /// whole batch is placed back at the front of the queue for the next
    /// attempt; failures are logged, never propagated.
    pub async fn flush(&self) {
        if self
            .is_flushing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let batch = std::mem::take(&mut *lock_ignore_poison(&self.queue));
        if batch.is_empty() {
            self.is_flushing.store(false, Ordering::SeqCst);
            return;
        }

        let failed_sinks = self.dispatch(&batch).await;

        if failed_sinks > 0 {
            let mut queue = lock_ignore_poison(&self.queue);
            let newer = std::mem::take(&mut *queue);
            let requeued = batch.len();
            queue.extend(batch);
            queue.extend(newer);
            warn!(
                failed_sinks,
                requeued, "Audit flush failed, batch requeued for retry"
            );
        } else {
            debug!(entries = batch.len(), "Audit batch flushed");
        }

        self.is_flushing.store(false, Ordering::SeqCst);
    }

    /// Fan a batch out to every sink, returning the number of sinks that
    /// failed. Sink writes run concurrently and independently; there is no
    /// cross-sink transaction and no short-circuiting.
    async fn dispatch(&self, batch: &[LogEventEntry]) -> usize {
        let writes = self.sinks.iter().map(|sink| async move {
            (sink.name(), sink.write_batch(batch).await)
        });

        let mut failed = 0;
        for (name, result) in join_all(writes).await {
            if let Err(e) = result {
                warn!(sink = name, error = %e, "Audit sink batch write failed");
                failed += 1;
            }
        }
        failed
    }

    /// Best-effort direct write used once shutdown has begun.
    async fn write_through(&self, entry: &LogEventEntry) {
        let writes = self.sinks.iter().map(|sink| async move {
            (sink.name(), sink.write(entry).await)
        });
        for (name, result) in join_all(writes).await {
            if let Err(e) = result {
                warn!(sink = name, error = %e, "Direct audit write failed during shutdown");
            }
        }
    }

    /// Stop the timer, drain the queue once, and close every sink.
    ///
    /// Idempotent: the first caller performs the shutdown, later callers
    /// return immediately. Failures are logged and never prevent completion.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.is_shutting_down.store(true, Ordering::SeqCst);

        if let Some(handle) = lock_ignore_poison(&self.flush_timer).take() {
            handle.abort();
        }

        self.flush().await;

        for sink in &self.sinks {
            if let Err(e) = sink.close().await {
                warn!(sink = sink.name(), error = %e, "Failed to close audit sink");
            }
        }
        debug!("Audit buffer manager closed");
    }

    /// Number of entries waiting in the queue.
    pub fn buffer_len(&self) -> usize {
        lock_ignore_poison(&self.queue).len()
    }
}

/// A poisoned queue mutex only means another thread panicked mid-append;
/// the queue itself is still structurally sound, so keep going.
fn lock_ignore_poison<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AuditError, AuditResult};
    use crate::event::AuditAction;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use uuid::Uuid;

    struct MockSink {
        sink_name: &'static str,
        written: Mutex<Vec<LogEventEntry>>,
        direct_writes: AtomicUsize,
        failing: AtomicBool,
        close_calls: AtomicUsize,
    }

    impl MockSink {
        fn new(sink_name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                sink_name,
                written: Mutex::new(Vec::new()),
                direct_writes: AtomicUsize::new(0),
                failing: AtomicBool::new(false),
                close_calls: AtomicUsize::new(0),
            })
        }

        fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        fn written_count(&self) -> usize {
            self.written.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl AuditSink for MockSink {
        fn name(&self) -> &'static str {
            self.sink_name
        }

        async fn write(&self, entry: &LogEventEntry) -> AuditResult<()> {
            self.direct_writes.fetch_add(1, Ordering::SeqCst);
            self.write_batch(std::slice::from_ref(entry)).await
        }

        async fn write_batch(&self, entries: &[LogEventEntry]) -> AuditResult<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(AuditError::Sink {
                    message: "injected failure".to_string(),
                });
            }
            self.written.lock().unwrap().extend_from_slice(entries);
            Ok(())
        }

        async fn close(&self) -> AuditResult<()> {
            self.close_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn entry(n: usize) -> LogEventEntry {
        LogEventEntry {
            id: Uuid::new_v4(),
            timestamp: "2026-08-05T10:30:45.123Z".to_string(),
            tenant_id: "acme".to_string(),
            user_id: "user-1".to_string(),
            action: AuditAction::Create,
            entity_name: format!("tb_entity_{}", n),
            record_id: None,
            before_data: None,
            after_data: None,
            metadata: None,
        }
    }

    fn config(buffer_size: usize, flush_interval_ms: u64) -> AuditConfig {
        let mut config = AuditConfig::new("/tmp/audit");
        config.buffer_size = buffer_size;
        config.flush_interval_ms = flush_interval_ms;
        config
    }

    #[tokio::test]
    async fn test_no_flush_below_buffer_size() {
        let sink = MockSink::new("a");
        let manager = AuditBufferManager::new(vec![sink.clone()], &config(10, 60_000));

        for n in 0..9 {
            manager.add(entry(n)).await;
        }

        assert_eq!(manager.buffer_len(), 9);
        assert_eq!(sink.written_count(), 0);
        manager.close().await;
    }

    #[tokio::test]
    async fn test_reaching_buffer_size_triggers_synchronous_flush() {
        let sink = MockSink::new("a");
        let manager = AuditBufferManager::new(vec![sink.clone()], &config(5, 60_000));

        for n in 0..5 {
            manager.add(entry(n)).await;
        }

        // The fifth add performed the flush before returning.
        assert_eq!(manager.buffer_len(), 0);
        assert_eq!(sink.written_count(), 5);
        manager.close().await;
    }

    #[tokio::test]
    async fn test_failed_batch_is_requeued() {
        let sink = MockSink::new("a");
        sink.set_failing(true);
        let manager = AuditBufferManager::new(vec![sink.clone()], &config(3, 60_000));

        for n in 0..3 {
            manager.add(entry(n)).await;
        }

        // Flush ran and failed; nothing was lost.
        assert_eq!(sink.written_count(), 0);
        assert_eq!(manager.buffer_len(), 3);

        sink.set_failing(false);
        manager.flush().await;
        assert_eq!(manager.buffer_len(), 0);
        assert_eq!(sink.written_count(), 3);
        manager.close().await;
    }

    #[tokio::test]
    async fn test_requeued_batch_precedes_newer_entries() {
        let sink = MockSink::new("a");
        sink.set_failing(true);
        let manager = AuditBufferManager::new(vec![sink.clone()], &config(2, 60_000));

        manager.add(entry(0)).await;
        manager.add(entry(1)).await; // failed flush, requeued
        sink.set_failing(false);
        manager.add(entry(2)).await;
        manager.flush().await;

        let written = sink.written.lock().unwrap();
        let names: Vec<&str> = written.iter().map(|e| e.entity_name.as_str()).collect();
        assert_eq!(names, vec!["tb_entity_0", "tb_entity_1", "tb_entity_2"]);
        drop(written);
        manager.close().await;
    }

    #[tokio::test]
    async fn test_one_sink_failure_does_not_block_the_other() {
        let good = MockSink::new("good");
        let bad = MockSink::new("bad");
        bad.set_failing(true);
        let manager =
            AuditBufferManager::new(vec![good.clone(), bad.clone()], &config(2, 60_000));

        manager.add(entry(0)).await;
        manager.add(entry(1)).await;

        // The healthy sink received the batch even though the other failed,
        // and the batch stays queued for retry.
        assert_eq!(good.written_count(), 2);
        assert_eq!(bad.written_count(), 0);
        assert_eq!(manager.buffer_len(), 2);

        // Retry delivers to the recovered sink and re-delivers to the healthy
        // one: at-least-once, duplicates accepted.
        bad.set_failing(false);
        manager.flush().await;
        assert_eq!(bad.written_count(), 2);
        assert_eq!(good.written_count(), 4);
        manager.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_flushes_partial_buffer() {
        let sink = MockSink::new("a");
        let manager = AuditBufferManager::new(vec![sink.clone()], &config(100, 200));

        manager.add(entry(0)).await;
        assert_eq!(sink.written_count(), 0);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(sink.written_count(), 1);
        assert_eq!(manager.buffer_len(), 0);
        manager.close().await;
    }

    #[tokio::test]
    async fn test_close_drains_and_closes_sinks() {
        let sink = MockSink::new("a");
        let manager = AuditBufferManager::new(vec![sink.clone()], &config(100, 60_000));

        for n in 0..7 {
            manager.add(entry(n)).await;
        }
        manager.close().await;

        assert_eq!(manager.buffer_len(), 0);
        assert_eq!(sink.written_count(), 7);
        assert_eq!(sink.close_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let sink = MockSink::new("a");
        let manager = AuditBufferManager::new(vec![sink.clone()], &config(100, 60_000));

        manager.close().await;
        manager.close().await;
        assert_eq!(sink.close_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_add_after_close_bypasses_queue() {
        let sink = MockSink::new("a");
        let manager = AuditBufferManager::new(vec![sink.clone()], &config(100, 60_000));
        manager.close().await;

        manager.add(entry(0)).await;

        assert_eq!(manager.buffer_len(), 0);
        assert_eq!(sink.direct_writes.load(Ordering::SeqCst), 1);
        assert_eq!(sink.written_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_producers_lose_nothing() {
        let sink = MockSink::new("a");
        let manager = AuditBufferManager::new(vec![sink.clone()], &config(16, 60_000));

        let mut handles = Vec::new();
        for task in 0..8usize {
            let manager = Arc::clone(&manager);
            handles.push(tokio::spawn(async move {
                for n in 0..25 {
                    manager.add(entry(task * 100 + n)).await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        manager.close().await;

        // 8 producers x 25 entries, delivered exactly once across threshold
        // flushes and the final drain.
        assert_eq!(sink.written_count(), 200);
    }
}
