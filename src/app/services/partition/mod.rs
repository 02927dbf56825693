//! Partition-aware storage for the order pipeline
//!
//! This module defines the partition routing function, the abstract
//! partitioned-store interface the pipeline writes through, and the batched
//! idempotent writer. The store itself (shard topology, replica sets,
//! cluster bootstrap) is an external collaborator; the pipeline only needs
//! to route each write to the partition the store's distribution scheme
//! expects.

pub mod jsonl_store;
pub mod memory_store;
pub mod writer;

pub use jsonl_store::JsonlStore;
pub use memory_store::MemoryStore;
pub use writer::{PartitionWriter, WriteStats};

use crate::app::models::{CleanRecord, RawRecord};
use crate::Result;
use async_trait::async_trait;

// =============================================================================
// Partition Routing
// =============================================================================

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// FNV-1a hash over the little-endian bytes of a u64
///
/// Stable across platforms and runs, unlike `DefaultHasher`, so partition
/// assignments are reproducible and match what a prior run wrote.
pub fn fnv1a64(value: u64) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for byte in value.to_le_bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Route a user to one of `partition_count` partitions
pub fn partition_for_user(user_id: u64, partition_count: u32) -> u32 {
    debug_assert!(partition_count > 0);
    (fnv1a64(user_id) % partition_count as u64) as u32
}

// =============================================================================
// Store Interface
// =============================================================================

/// Outcome of one clean-batch upsert
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchWriteReport {
    /// Records inserted for the first time
    pub inserted: usize,
    /// Records that replaced an existing record with the same key
    pub replaced: usize,
    /// Records the store itself refused (write-level rejections)
    pub rejected: usize,
}

impl BatchWriteReport {
    /// Total records the store accepted
    pub fn written(&self) -> usize {
        self.inserted + self.replaced
    }
}

/// Abstract partitioned document store
///
/// Three collections: a raw staging collection (append/read in ingestion
/// order), a clean collection keyed on `(user_id, order_id)` and laid out by
/// partition, and named view collections replaced wholesale by the
/// aggregation stage.
#[async_trait]
pub trait PartitionStore: Send + Sync {
    /// Number of partitions this store is laid out for
    fn partition_count(&self) -> u32;

    // --- raw staging collection ---

    /// Append a batch of raw records in ingestion order
    async fn append_raw_batch(&self, records: &[RawRecord]) -> Result<usize>;

    /// Read up to `limit` staged records starting at `offset`
    async fn read_raw_batch(&self, offset: u64, limit: usize) -> Result<Vec<RawRecord>>;

    /// Number of staged raw records
    async fn raw_count(&self) -> Result<u64>;

    /// Drop all staged raw records (start of a fresh ingest)
    async fn clear_raw(&self) -> Result<()>;

    // --- clean partitioned collection ---

    /// Idempotent insert-or-replace of a batch routed to one partition,
    /// keyed on `(user_id, order_id)`
    async fn upsert_clean_batch(
        &self,
        partition: u32,
        records: &[CleanRecord],
    ) -> Result<BatchWriteReport>;

    /// Number of clean records across all partitions
    async fn clean_count(&self) -> Result<u64>;

    /// Full-collection read of the clean dataset (aggregation input)
    async fn read_clean_snapshot(&self) -> Result<Vec<CleanRecord>>;

    /// Drop all clean records (start of a fresh cleaning stage)
    async fn clear_clean(&self) -> Result<()>;

    // --- aggregation views ---

    /// Replace a view collection wholesale; never a merge
    async fn replace_view(&self, view: &str, rows: Vec<serde_json::Value>) -> Result<()>;

    /// Read a view collection back (dashboards, tests)
    async fn read_view(&self, view: &str) -> Result<Vec<serde_json::Value>>;

    /// Persist any buffered state
    async fn flush(&self) -> Result<()>;
}
