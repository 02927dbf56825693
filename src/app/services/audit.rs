//! Audit sink for rejected records
//!
//! Every record the pipeline rejects is retained with its reason for later
//! inspection. The sink is append-only and is never read back by the
//! pipeline itself.

use crate::app::models::RejectedRecord;
use crate::{Error, Result};
use async_trait::async_trait;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;

/// Append-only destination for rejected records
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Append one rejected record
    async fn record(&self, rejected: &RejectedRecord) -> Result<()>;

    /// Persist buffered entries
    async fn flush(&self) -> Result<()>;
}

// =============================================================================
// JSONL File Sink
// =============================================================================

/// File-backed audit sink, one JSON document per line
pub struct JsonlAuditSink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl JsonlAuditSink {
    /// Open the sink in append mode, creating the file if needed
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    Error::audit_sink(
                        format!("Failed to create audit directory '{}'", parent.display()),
                        e,
                    )
                })?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                Error::audit_sink(format!("Failed to open audit sink '{}'", path.display()), e)
            })?;

        info!("Audit sink opened: {}", path.display());
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }
}

#[async_trait]
impl AuditSink for JsonlAuditSink {
    async fn record(&self, rejected: &RejectedRecord) -> Result<()> {
        let line = serde_json::to_string(rejected)?;
        let mut writer = self.writer.lock().unwrap();
        writeln!(writer, "{}", line).map_err(|e| {
            Error::audit_sink(
                format!("Failed to append to audit sink '{}'", self.path.display()),
                e,
            )
        })
    }

    async fn flush(&self) -> Result<()> {
        self.writer.lock().unwrap().flush().map_err(|e| {
            Error::audit_sink(
                format!("Failed to flush audit sink '{}'", self.path.display()),
                e,
            )
        })
    }
}

// =============================================================================
// In-Memory Sink
// =============================================================================

/// Memory-backed audit sink for tests and dry runs
#[derive(Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<RejectedRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far
    pub fn snapshot(&self) -> Vec<RejectedRecord> {
        self.entries.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, rejected: &RejectedRecord) -> Result<()> {
        self.entries.lock().unwrap().push(rejected.clone());
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::models::{RawRecord, RejectReason};
    use std::io::BufRead;

    fn rejected(seq: u64, reason: RejectReason) -> RejectedRecord {
        RejectedRecord::new(reason, RawRecord::malformed(seq, "test"))
    }

    #[tokio::test]
    async fn test_memory_sink_records_in_order() {
        let sink = MemoryAuditSink::new();
        sink.record(&rejected(0, RejectReason::Malformed)).await.unwrap();
        sink.record(&rejected(1, RejectReason::DuplicateKey)).await.unwrap();

        let entries = sink.snapshot();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].reason, RejectReason::Malformed);
        assert_eq!(entries[1].reason, RejectReason::DuplicateKey);
    }

    #[tokio::test]
    async fn test_jsonl_sink_appends_lines() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("rejects.jsonl");

        let sink = JsonlAuditSink::open(&path).unwrap();
        sink.record(&rejected(0, RejectReason::TypeMismatch)).await.unwrap();
        sink.record(&rejected(1, RejectReason::RangeViolation)).await.unwrap();
        sink.flush().await.unwrap();

        let file = std::fs::File::open(&path).unwrap();
        let lines: Vec<String> = std::io::BufReader::new(file)
            .lines()
            .map(|l| l.unwrap())
            .collect();
        assert_eq!(lines.len(), 2);

        let first: RejectedRecord = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(first.reason, RejectReason::TypeMismatch);
        assert_eq!(first.record.seq, 0);
    }

    #[tokio::test]
    async fn test_jsonl_sink_is_append_only_across_opens() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("rejects.jsonl");

        {
            let sink = JsonlAuditSink::open(&path).unwrap();
            sink.record(&rejected(0, RejectReason::Malformed)).await.unwrap();
            sink.flush().await.unwrap();
        }
        {
            let sink = JsonlAuditSink::open(&path).unwrap();
            sink.record(&rejected(1, RejectReason::Malformed)).await.unwrap();
            sink.flush().await.unwrap();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}
