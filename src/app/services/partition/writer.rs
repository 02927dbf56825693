//! Batched, idempotent partition writer
//!
//! Buffers clean records per partition and flushes each buffer as one
//! upsert batch. Because the store upserts by `(user_id, order_id)`, a
//! retried batch after a transient failure converges to the same final
//! state; the writer only needs bounded exponential backoff, never
//! compensation logic.

use super::{BatchWriteReport, PartitionStore, partition_for_user};
use crate::app::models::CleanRecord;
use crate::config::RetrySettings;
use crate::{Error, Result};
use std::sync::Arc;
use tracing::{debug, warn};

/// Counters reported back to the cleaning stage on completion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteStats {
    /// Records inserted for the first time
    pub inserted: usize,
    /// Records replacing an existing key (idempotent re-writes)
    pub replaced: usize,
    /// Write-level rejections from the store itself
    pub store_rejected: usize,
    /// Batches flushed
    pub batches: usize,
    /// Transient failures that were retried successfully
    pub retries: usize,
}

impl WriteStats {
    /// Total records the store accepted
    pub fn written(&self) -> usize {
        self.inserted + self.replaced
    }

    fn absorb(&mut self, report: BatchWriteReport) {
        self.inserted += report.inserted;
        self.replaced += report.replaced;
        self.store_rejected += report.rejected;
        self.batches += 1;
    }
}

/// Partition-aware buffered writer over a [`PartitionStore`]
pub struct PartitionWriter {
    store: Arc<dyn PartitionStore>,
    retry: RetrySettings,
    batch_size: usize,
    buffers: Vec<Vec<CleanRecord>>,
    stats: WriteStats,
}

impl PartitionWriter {
    pub fn new(store: Arc<dyn PartitionStore>, batch_size: usize, retry: RetrySettings) -> Self {
        let partitions = store.partition_count();
        Self {
            store,
            retry,
            batch_size,
            buffers: (0..partitions).map(|_| Vec::new()).collect(),
            stats: WriteStats::default(),
        }
    }

    /// Route one record to its partition buffer, flushing when full
    pub async fn push(&mut self, record: CleanRecord) -> Result<()> {
        let partition = partition_for_user(record.user_id, self.buffers.len() as u32);
        let buffer = &mut self.buffers[partition as usize];
        buffer.push(record);

        if buffer.len() >= self.batch_size {
            self.flush_partition(partition).await?;
        }
        Ok(())
    }

    /// Flush remaining buffers and return the write counters
    pub async fn finish(mut self) -> Result<WriteStats> {
        for partition in 0..self.buffers.len() as u32 {
            if !self.buffers[partition as usize].is_empty() {
                self.flush_partition(partition).await?;
            }
        }
        self.store.flush().await?;
        debug!(
            "Writer finished: {} written in {} batches ({} retried)",
            self.stats.written(),
            self.stats.batches,
            self.stats.retries
        );
        Ok(self.stats)
    }

    /// Records currently buffered and not yet written
    pub fn buffered(&self) -> usize {
        self.buffers.iter().map(Vec::len).sum()
    }

    /// Upsert one partition buffer, retrying transient failures with
    /// exponential backoff until the attempt limit is exhausted
    async fn flush_partition(&mut self, partition: u32) -> Result<()> {
        let batch = std::mem::take(&mut self.buffers[partition as usize]);
        if batch.is_empty() {
            return Ok(());
        }

        let mut attempt = 1;
        loop {
            match self.store.upsert_clean_batch(partition, &batch).await {
                Ok(report) => {
                    self.stats.absorb(report);
                    return Ok(());
                }
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(
                        "Transient write failure on partition {} (attempt {}/{}), retrying in {:?}: {}",
                        partition, attempt, self.retry.max_attempts, delay, e
                    );
                    tokio::time::sleep(delay).await;
                    self.stats.retries += 1;
                    attempt += 1;
                }
                Err(e) if e.is_transient() => {
                    // Retry budget exhausted: escalate to a fatal stage error
                    return Err(Error::store_fatal(format!(
                        "Partition {} write failed after {} attempts: {}",
                        partition, attempt, e
                    )));
                }
                Err(e) => return Err(e),
            }
        }
    }
}
