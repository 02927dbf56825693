//! Cleaning stage: validation, deduplication, and routing
//!
//! Consumes the staged raw batches, runs the schema validator over them in a
//! bounded worker pool, and routes the outcomes: accepted records to the
//! partition writer, rejections (with reasons) to the audit sink.
//!
//! Determinism under parallelism: workers validate batches concurrently and
//! tag them with their batch index; a single routing task consumes the
//! batches in index order, so key claims always happen in ascending
//! ingestion sequence and the earliest record for a duplicate key wins no
//! matter how workers were scheduled. Workers keep local rejection tallies
//! that are merged once at stage completion, so no counter is contended
//! across tasks.

pub mod dedup;
pub mod stats;

pub use dedup::{ClaimOutcome, InMemoryKeySet, KeySet};
pub use stats::CleaningStats;

use crate::app::models::{CleanRecord, RawRecord, RejectReason, RejectedRecord};
use crate::app::services::audit::AuditSink;
use crate::app::services::partition::{PartitionStore, PartitionWriter};
use crate::app::services::schema_validator::validate_record;
use crate::config::Config;
use crate::constants::PROGRESS_UPDATE_INTERVAL;
use crate::{Error, Result};
use indicatif::ProgressBar;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// One validated record with its raw original, for routing and audit
struct ValidatedRow {
    raw: RawRecord,
    outcome: std::result::Result<CleanRecord, RejectReason>,
}

/// A worker's local tallies, merged into the stage stats at completion
#[derive(Debug, Default)]
struct WorkerTally {
    batches: usize,
    rejected_by_reason: BTreeMap<RejectReason, usize>,
}

/// Cleaning stage executor
pub struct CleaningStage {
    workers: usize,
    read_batch_size: usize,
    write_batch_size: usize,
    retry: crate::config::RetrySettings,
    cancellation: CancellationToken,
}

impl CleaningStage {
    pub fn new(config: &Config, cancellation: CancellationToken) -> Self {
        Self {
            workers: config.processing.workers,
            read_batch_size: config.source.batch_size,
            write_batch_size: config.store.write_batch_size,
            retry: config.retry.clone(),
            cancellation,
        }
    }

    /// Run the stage over the store's raw staging collection
    ///
    /// Clears the clean collection first (a run's clean dataset fully
    /// replaces the prior one), then validates, deduplicates, and writes.
    pub async fn run(
        &self,
        store: Arc<dyn PartitionStore>,
        audit: Arc<dyn AuditSink>,
        progress: Option<ProgressBar>,
    ) -> Result<CleaningStats> {
        let total = store.raw_count().await?;
        info!(
            "Starting cleaning stage: {} staged records, {} workers",
            total, self.workers
        );

        store.clear_clean().await?;

        let mut stats = CleaningStats::new();
        stats.total_input = total as usize;

        let mut writer = PartitionWriter::new(
            store.clone(),
            self.write_batch_size,
            self.retry.clone(),
        );
        let mut key_set = InMemoryKeySet::new();

        // Workers pull batch offsets from a shared counter and send
        // validated batches tagged with their index
        let next_offset = Arc::new(AtomicU64::new(0));
        let (tx, mut rx) = mpsc::channel::<(u64, Vec<ValidatedRow>)>(self.workers * 2);
        let mut workers: JoinSet<Result<WorkerTally>> = JoinSet::new();

        for worker_id in 0..self.workers {
            let store = store.clone();
            let next_offset = next_offset.clone();
            let tx = tx.clone();
            let cancellation = self.cancellation.clone();
            let batch_size = self.read_batch_size;

            workers.spawn(async move {
                let mut tally = WorkerTally::default();
                debug!("Cleaning worker {} started", worker_id);

                loop {
                    // Stop claiming new batches on cancellation; the batch
                    // in flight has already been sent downstream
                    if cancellation.is_cancelled() {
                        debug!("Cleaning worker {} cancelled", worker_id);
                        break;
                    }

                    let offset = next_offset.fetch_add(batch_size as u64, Ordering::SeqCst);
                    if offset >= total {
                        break;
                    }
                    let batch_index = offset / batch_size as u64;

                    let raw_batch = store.read_raw_batch(offset, batch_size).await?;
                    let validated: Vec<ValidatedRow> = raw_batch
                        .into_iter()
                        .map(|raw| {
                            let outcome = validate_record(&raw);
                            if let Err(reason) = &outcome {
                                *tally.rejected_by_reason.entry(*reason).or_insert(0) += 1;
                            }
                            ValidatedRow { raw, outcome }
                        })
                        .collect();
                    tally.batches += 1;

                    if tx.send((batch_index, validated)).await.is_err() {
                        debug!("Cleaning worker {} channel closed, stopping", worker_id);
                        break;
                    }
                }

                debug!(
                    "Cleaning worker {} finished ({} batches)",
                    worker_id, tally.batches
                );
                Ok(tally)
            });
        }
        drop(tx);

        // Single routing task: consume batches in index order so duplicate
        // resolution is serialized and deterministic
        let mut stash: HashMap<u64, Vec<ValidatedRow>> = HashMap::new();
        let mut next_index = 0u64;
        let mut routed = 0usize;

        while let Some((batch_index, rows)) = rx.recv().await {
            stash.insert(batch_index, rows);
            while let Some(rows) = stash.remove(&next_index) {
                for row in rows {
                    self.route_row(row, &mut key_set, &mut writer, &audit, &mut stats)
                        .await?;
                    routed += 1;
                    if let Some(pb) = &progress {
                        if routed % PROGRESS_UPDATE_INTERVAL == 0 {
                            pb.set_position(routed as u64);
                        }
                    }
                }
                next_index += 1;
            }
        }

        // Merge per-worker tallies (reduce step)
        while let Some(joined) = workers.join_next().await {
            let tally = joined
                .map_err(|e| Error::data_validation(format!("Cleaning worker panicked: {}", e)))??;
            stats.merge_rejections(&tally.rejected_by_reason);
        }

        // In-flight work is complete; flush before deciding terminal state
        stats.distinct_keys = key_set.len();
        stats.write = writer.finish().await?.into();

        if let Some(pb) = &progress {
            pb.set_position(routed as u64);
        }

        if self.cancellation.is_cancelled() && (routed as u64) < total {
            return Err(Error::interrupted(format!(
                "cleaning cancelled after {} of {} records",
                routed, total
            )));
        }

        info!("{}", stats.summary());
        Ok(stats)
    }

    /// Route one validated row: claim its key, then write or audit
    async fn route_row(
        &self,
        row: ValidatedRow,
        key_set: &mut dyn KeySet,
        writer: &mut PartitionWriter,
        audit: &Arc<dyn AuditSink>,
        stats: &mut CleaningStats,
    ) -> Result<()> {
        match row.outcome {
            Ok(clean) => match key_set.claim(clean.key(), clean.seq) {
                ClaimOutcome::Claimed => {
                    writer.push(clean).await?;
                    stats.accepted += 1;
                }
                ClaimOutcome::Duplicate { kept_seq } => {
                    debug!(
                        "Duplicate key ({}, {}) at seq {}, kept seq {}",
                        clean.user_id, clean.order_id, clean.seq, kept_seq
                    );
                    stats.duplicate_count += 1;
                    audit
                        .record(&RejectedRecord::new(RejectReason::DuplicateKey, row.raw))
                        .await?;
                }
            },
            Err(reason) => {
                // Counted by the worker that validated it; only audit here
                audit.record(&RejectedRecord::new(reason, row.raw)).await?;
            }
        }
        Ok(())
    }
}
