//! Rotating append-only file sink.
//!
//! Writes one JSON object per line. File names are keyed by the current
//! UTC calendar date; with size-based rotation a zero-padded sequence
//! counter is appended and the sink moves to the next segment once the
//! current file reaches the configured size. Bytes written are tracked in
//! memory so rotation checks do not stat the file on every write.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};

use crate::config::{AuditConfig, RotationStrategy};
use crate::error::{AuditError, AuditResult};
use crate::event::LogEventEntry;

use super::AuditSink;

struct OpenSegment {
    path: PathBuf,
    file: File,
    bytes_written: u64,
}

/// Append-only JSONL sink with daily or size-based rotation.
pub struct RotatingFileSink {
    log_directory: PathBuf,
    file_prefix: String,
    strategy: RotationStrategy,
    max_file_size: u64,
    segment: Mutex<Option<OpenSegment>>,
}

impl RotatingFileSink {
    /// Create the sink, creating the log directory if needed.
    pub fn new(config: &AuditConfig) -> AuditResult<Self> {
        if !config.log_directory.exists() {
            debug!(path = %config.log_directory.display(), "Creating audit log directory");
            std::fs::create_dir_all(&config.log_directory)?;
        }

        Ok(Self {
            log_directory: config.log_directory.clone(),
            file_prefix: config.file_prefix.clone(),
            strategy: config.rotation_strategy,
            max_file_size: config.max_file_size_bytes(),
            segment: Mutex::new(None),
        })
    }

    fn daily_path(&self, date: &str) -> PathBuf {
        self.log_directory
            .join(format!("{}-{}.jsonl", self.file_prefix, date))
    }

    /// First segment path for `date` that is missing or still under the size
    /// threshold.
    fn size_based_path(&self, date: &str) -> PathBuf {
        let mut counter = 1u32;
        loop {
            let path = self
                .log_directory
                .join(format!("{}-{}-{:04}.jsonl", self.file_prefix, date, counter));
            let full = path
                .metadata()
                .map(|m| m.len() >= self.max_file_size)
                .unwrap_or(false);
            if !full {
                return path;
            }
            counter += 1;
        }
    }

    fn target_path(&self) -> PathBuf {
        let date = Utc::now().format("%Y-%m-%d").to_string();
        match self.strategy {
            RotationStrategy::Daily => self.daily_path(&date),
            RotationStrategy::Size => self.size_based_path(&date),
        }
    }

    fn open_segment(path: &Path) -> AuditResult<OpenSegment> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let bytes_written = file.metadata()?.len();
        Ok(OpenSegment {
            path: path.to_path_buf(),
            file,
            bytes_written,
        })
    }

    /// Ensure the open segment is the one the next write belongs to.
    fn rotate_if_needed(&self, segment: &mut Option<OpenSegment>) -> AuditResult<()> {
        let target = self.target_path();

        let stale = match segment {
            Some(open) => open.path != target,
            None => true,
        };
        if stale {
            *segment = Some(Self::open_segment(&target)?);
        }

        if self.strategy == RotationStrategy::Size {
            let full = segment
                .as_ref()
                .map(|open| open.bytes_written >= self.max_file_size)
                .unwrap_or(false);
            if full {
                // The current segment just filled up; rescanning skips it.
                *segment = None;
                let next = self.target_path();
                *segment = Some(Self::open_segment(&next)?);
            }
        }

        Ok(())
    }

    fn write_line(open: &mut OpenSegment, entry: &LogEventEntry) -> AuditResult<()> {
        let json = serde_json::to_string(entry)?;
        writeln!(open.file, "{}", json)?;
        open.bytes_written += json.len() as u64 + 1;
        Ok(())
    }

    fn lock_segment(&self) -> AuditResult<std::sync::MutexGuard<'_, Option<OpenSegment>>> {
        self.segment.lock().map_err(|e| AuditError::Sink {
            message: format!("Failed to acquire file sink lock: {}", e),
        })
    }

    fn sync_segment(segment: &Option<OpenSegment>) {
        if let Some(open) = segment {
            if let Err(e) = open.file.sync_data() {
                warn!(error = %e, path = %open.path.display(), "Failed to sync audit file");
            }
        }
    }
}

#[async_trait]
impl AuditSink for RotatingFileSink {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn write(&self, entry: &LogEventEntry) -> AuditResult<()> {
        let mut segment = self.lock_segment()?;
        self.rotate_if_needed(&mut segment)?;
        if let Some(open) = segment.as_mut() {
            Self::write_line(open, entry)?;
        }
        Self::sync_segment(&segment);
        Ok(())
    }

    async fn write_batch(&self, entries: &[LogEventEntry]) -> AuditResult<()> {
        let mut segment = self.lock_segment()?;
        for entry in entries {
            self.rotate_if_needed(&mut segment)?;
            if let Some(open) = segment.as_mut() {
                Self::write_line(open, entry)?;
            }
        }
        Self::sync_segment(&segment);
        Ok(())
    }

    async fn close(&self) -> AuditResult<()> {
        let mut segment = self.lock_segment()?;
        if let Some(open) = segment.take() {
            if let Err(e) = open.file.sync_data() {
                warn!(error = %e, path = %open.path.display(), "Failed to sync audit file on close");
            }
            debug!(path = %open.path.display(), "Closed audit file");
        }
        Ok(())
    }
}
