//! In-memory partition store
//!
//! Backs tests and local dry runs. Layout mirrors the external document
//! store: a raw staging list, one keyed map per clean partition, and named
//! view collections. Supports injected transient failures so retry paths
//! can be exercised deterministically.

use super::{BatchWriteReport, PartitionStore};
use crate::app::models::{CleanRecord, RawRecord, RecordKey};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

#[derive(Default)]
struct Inner {
    raw: Vec<RawRecord>,
    clean: Vec<BTreeMap<RecordKey, CleanRecord>>,
    views: HashMap<String, Vec<serde_json::Value>>,
    /// Remaining upserts that should fail transiently
    failures_remaining: usize,
}

/// Memory-backed [`PartitionStore`]
pub struct MemoryStore {
    partition_count: u32,
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new(partition_count: u32) -> Self {
        Self {
            partition_count,
            inner: Mutex::new(Inner {
                clean: (0..partition_count).map(|_| BTreeMap::new()).collect(),
                ..Inner::default()
            }),
        }
    }

    /// Make the next `count` clean upserts fail with a transient error
    pub fn fail_next_upserts(&self, count: usize) {
        self.inner.lock().unwrap().failures_remaining = count;
    }

    /// Records currently held in one partition (test inspection)
    pub fn partition_len(&self, partition: u32) -> usize {
        self.inner.lock().unwrap().clean[partition as usize].len()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("partition_count", &self.partition_count)
            .finish()
    }
}

#[async_trait]
impl PartitionStore for MemoryStore {
    fn partition_count(&self) -> u32 {
        self.partition_count
    }

    async fn append_raw_batch(&self, records: &[RawRecord]) -> Result<usize> {
        let mut inner = self.inner.lock().unwrap();
        inner.raw.extend_from_slice(records);
        Ok(records.len())
    }

    async fn read_raw_batch(&self, offset: u64, limit: usize) -> Result<Vec<RawRecord>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .raw
            .iter()
            .skip(offset as usize)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn raw_count(&self) -> Result<u64> {
        Ok(self.inner.lock().unwrap().raw.len() as u64)
    }

    async fn clear_raw(&self) -> Result<()> {
        self.inner.lock().unwrap().raw.clear();
        Ok(())
    }

    async fn upsert_clean_batch(
        &self,
        partition: u32,
        records: &[CleanRecord],
    ) -> Result<BatchWriteReport> {
        if partition >= self.partition_count {
            return Err(Error::store_fatal(format!(
                "Partition {} out of range (store has {})",
                partition, self.partition_count
            )));
        }

        let mut inner = self.inner.lock().unwrap();
        if inner.failures_remaining > 0 {
            inner.failures_remaining -= 1;
            return Err(Error::store_transient(
                "injected transient write failure".to_string(),
            ));
        }

        let mut report = BatchWriteReport::default();
        let map = &mut inner.clean[partition as usize];
        for record in records {
            match map.insert(record.key(), record.clone()) {
                Some(_) => report.replaced += 1,
                None => report.inserted += 1,
            }
        }
        Ok(report)
    }

    async fn clean_count(&self) -> Result<u64> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.clean.iter().map(|m| m.len() as u64).sum())
    }

    async fn read_clean_snapshot(&self) -> Result<Vec<CleanRecord>> {
        let inner = self.inner.lock().unwrap();
        let mut records: Vec<CleanRecord> = inner
            .clean
            .iter()
            .flat_map(|m| m.values().cloned())
            .collect();
        // Snapshot in ingestion order so downstream output is reproducible
        records.sort_by_key(|r| r.seq);
        Ok(records)
    }

    async fn clear_clean(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        for map in &mut inner.clean {
            map.clear();
        }
        Ok(())
    }

    async fn replace_view(&self, view: &str, rows: Vec<serde_json::Value>) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.views.insert(view.to_string(), rows);
        Ok(())
    }

    async fn read_view(&self, view: &str) -> Result<Vec<serde_json::Value>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.views.get(view).cloned().unwrap_or_default())
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record(user_id: u64, order_id: &str, seq: u64) -> CleanRecord {
        CleanRecord {
            user_id,
            order_id: order_id.to_string(),
            product_id: "PROD-1".to_string(),
            product_name: "Widget".to_string(),
            category: "electronics".to_string(),
            price_cents: 1_000,
            quantity: 1,
            order_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            status: crate::app::models::OrderStatus::Completed,
            total_cents: 1_000,
            seq,
        }
    }

    #[tokio::test]
    async fn test_raw_staging_round_trip() {
        let store = MemoryStore::new(2);
        let records = vec![RawRecord::malformed(0, "x"), RawRecord::malformed(1, "y")];
        store.append_raw_batch(&records).await.unwrap();

        assert_eq!(store.raw_count().await.unwrap(), 2);
        let batch = store.read_raw_batch(1, 10).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].seq, 1);

        store.clear_raw().await.unwrap();
        assert_eq!(store.raw_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let store = MemoryStore::new(2);
        let batch = vec![record(1, "ORD-1", 0), record(2, "ORD-2", 1)];

        let first = store.upsert_clean_batch(0, &batch).await.unwrap();
        assert_eq!(first.inserted, 2);
        assert_eq!(first.replaced, 0);

        // Re-writing the same batch replaces in place: no growth, no drift
        let second = store.upsert_clean_batch(0, &batch).await.unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.replaced, 2);
        assert_eq!(store.clean_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_injected_failures_are_transient() {
        let store = MemoryStore::new(1);
        store.fail_next_upserts(2);

        let batch = vec![record(1, "ORD-1", 0)];
        let e1 = store.upsert_clean_batch(0, &batch).await.unwrap_err();
        assert!(e1.is_transient());
        let e2 = store.upsert_clean_batch(0, &batch).await.unwrap_err();
        assert!(e2.is_transient());

        // Third attempt succeeds
        assert!(store.upsert_clean_batch(0, &batch).await.is_ok());
        assert_eq!(store.clean_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_out_of_range_partition_is_fatal() {
        let store = MemoryStore::new(2);
        let err = store
            .upsert_clean_batch(5, &[record(1, "ORD-1", 0)])
            .await
            .unwrap_err();
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_snapshot_is_in_ingestion_order() {
        let store = MemoryStore::new(2);
        store
            .upsert_clean_batch(0, &[record(1, "ORD-B", 5)])
            .await
            .unwrap();
        store
            .upsert_clean_batch(1, &[record(2, "ORD-A", 2)])
            .await
            .unwrap();

        let snapshot = store.read_clean_snapshot().await.unwrap();
        let seqs: Vec<u64> = snapshot.iter().map(|r| r.seq).collect();
        assert_eq!(seqs, vec![2, 5]);
    }

    #[tokio::test]
    async fn test_view_replace_is_total() {
        let store = MemoryStore::new(1);
        store
            .replace_view("aggregated_category", vec![serde_json::json!({"a": 1})])
            .await
            .unwrap();
        store
            .replace_view("aggregated_category", vec![serde_json::json!({"b": 2})])
            .await
            .unwrap();

        let rows = store.read_view("aggregated_category").await.unwrap();
        assert_eq!(rows, vec![serde_json::json!({"b": 2})]);
    }
}
