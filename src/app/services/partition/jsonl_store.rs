//! JSONL file-backed partition store
//!
//! Reference implementation of [`PartitionStore`] over a local directory:
//!
//! ```text
//! <root>/raw_orders.jsonl            raw staging, one record per line
//! <root>/clean_orders/part-00.jsonl  one file per clean partition
//! <root>/views/<name>.jsonl          one file per aggregation view
//! ```
//!
//! State is kept in memory and rewritten per partition on flush, so repeated
//! upserts of the same key stay idempotent on disk. Existing clean
//! partitions are loaded on open, which lets a new run supersede records
//! from a prior one under the same key.

use super::{BatchWriteReport, PartitionStore};
use crate::app::models::{CleanRecord, RawRecord, RecordKey};
use crate::constants::{CLEAN_COLLECTION, RAW_COLLECTION};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

#[derive(Default)]
struct Inner {
    raw: Vec<RawRecord>,
    clean: Vec<BTreeMap<RecordKey, CleanRecord>>,
    views: HashMap<String, Vec<serde_json::Value>>,
    dirty_partitions: HashSet<u32>,
    raw_dirty: bool,
}

/// Directory-backed [`PartitionStore`] with JSONL persistence
pub struct JsonlStore {
    root: PathBuf,
    partition_count: u32,
    inner: Mutex<Inner>,
}

impl JsonlStore {
    /// Open (or create) a store rooted at `root` with a fixed partition layout
    pub fn open(root: impl AsRef<Path>, partition_count: u32) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(CLEAN_COLLECTION))
            .and_then(|_| fs::create_dir_all(root.join("views")))
            .map_err(|e| {
                Error::io(
                    format!("Failed to create store layout under '{}'", root.display()),
                    e,
                )
            })?;

        let mut clean: Vec<BTreeMap<RecordKey, CleanRecord>> =
            (0..partition_count).map(|_| BTreeMap::new()).collect();

        // Reload prior clean partitions so a rerun upserts over them
        let mut loaded = 0usize;
        for partition in 0..partition_count {
            let path = Self::partition_path(&root, partition);
            if !path.exists() {
                continue;
            }
            for record in read_jsonl::<CleanRecord>(&path)? {
                clean[partition as usize].insert(record.key(), record);
                loaded += 1;
            }
        }
        if loaded > 0 {
            info!(
                "Loaded {} existing clean records from '{}'",
                loaded,
                root.display()
            );
        }

        Ok(Self {
            root,
            partition_count,
            inner: Mutex::new(Inner {
                clean,
                ..Inner::default()
            }),
        })
    }

    fn partition_path(root: &Path, partition: u32) -> PathBuf {
        root.join(CLEAN_COLLECTION)
            .join(format!("part-{:02}.jsonl", partition))
    }

    fn raw_path(&self) -> PathBuf {
        self.root.join(format!("{}.jsonl", RAW_COLLECTION))
    }

    fn view_path(&self, view: &str) -> PathBuf {
        self.root.join("views").join(format!("{}.jsonl", view))
    }
}

fn read_jsonl<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = File::open(path)
        .map_err(|e| Error::io(format!("Failed to open '{}'", path.display()), e))?;
    let mut out = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| Error::io(format!("Failed to read '{}'", path.display()), e))?;
        if line.trim().is_empty() {
            continue;
        }
        out.push(serde_json::from_str(&line)?);
    }
    Ok(out)
}

fn write_jsonl<T: serde::Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let file = File::create(path)
        .map_err(|e| Error::io(format!("Failed to create '{}'", path.display()), e))?;
    let mut writer = BufWriter::new(file);
    for row in rows {
        serde_json::to_writer(&mut writer, row)?;
        writer
            .write_all(b"\n")
            .map_err(|e| Error::io(format!("Failed to write '{}'", path.display()), e))?;
    }
    writer
        .flush()
        .map_err(|e| Error::io(format!("Failed to flush '{}'", path.display()), e))
}

#[async_trait]
impl PartitionStore for JsonlStore {
    fn partition_count(&self) -> u32 {
        self.partition_count
    }

    async fn append_raw_batch(&self, records: &[RawRecord]) -> Result<usize> {
        let mut inner = self.inner.lock().unwrap();
        inner.raw.extend_from_slice(records);
        inner.raw_dirty = true;
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
        let mut inner = self.inner.lock().unwrap();
        inner.raw.clear();
        inner.raw_dirty = true;
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
        let mut report = BatchWriteReport::default();
        let map = &mut inner.clean[partition as usize];
        for record in records {
            match map.insert(record.key(), record.clone()) {
                Some(_) => report.replaced += 1,
                None => report.inserted += 1,
            }
        }
        inner.dirty_partitions.insert(partition);
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
        records.sort_by_key(|r| r.seq);
        Ok(records)
    }

    async fn clear_clean(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        for partition in 0..self.partition_count {
            inner.clean[partition as usize].clear();
            inner.dirty_partitions.insert(partition);
        }
        Ok(())
    }

    async fn replace_view(&self, view: &str, rows: Vec<serde_json::Value>) -> Result<()> {
        // Views go straight to disk: a replace must not linger in buffers
        write_jsonl(&self.view_path(view), &rows)?;
        let mut inner = self.inner.lock().unwrap();
        inner.views.insert(view.to_string(), rows);
        Ok(())
    }

    async fn read_view(&self, view: &str) -> Result<Vec<serde_json::Value>> {
        {
            let inner = self.inner.lock().unwrap();
            if let Some(rows) = inner.views.get(view) {
                return Ok(rows.clone());
            }
        }
        let path = self.view_path(view);
        if !path.exists() {
            return Ok(Vec::new());
        }
        read_jsonl(&path)
    }

    async fn flush(&self) -> Result<()> {
        // Collect dirty state under the lock, write files outside of it
        let (raw, partitions): (Option<Vec<RawRecord>>, Vec<(u32, Vec<CleanRecord>)>) = {
            let mut inner = self.inner.lock().unwrap();
            let raw = inner.raw_dirty.then(|| inner.raw.clone());
            inner.raw_dirty = false;
            let dirty: Vec<u32> = inner.dirty_partitions.drain().collect();
            let partitions = dirty
                .into_iter()
                .map(|p| (p, inner.clean[p as usize].values().cloned().collect()))
                .collect();
            (raw, partitions)
        };

        if let Some(raw) = raw {
            write_jsonl(&self.raw_path(), &raw)?;
        }
        for (partition, records) in &partitions {
            write_jsonl(&Self::partition_path(&self.root, *partition), records)?;
            debug!(
                "Flushed partition {} ({} records)",
                partition,
                records.len()
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::models::OrderStatus;
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
            status: OrderStatus::Completed,
            total_cents: 1_000,
            seq,
        }
    }

    #[tokio::test]
    async fn test_flush_and_reload_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();

        {
            let store = JsonlStore::open(dir.path(), 4).unwrap();
            store
                .upsert_clean_batch(1, &[record(1, "ORD-1", 0)])
                .await
                .unwrap();
            store
                .upsert_clean_batch(3, &[record(2, "ORD-2", 1)])
                .await
                .unwrap();
            store.flush().await.unwrap();
        }

        // Reopen: prior clean records are visible and upsertable
        let store = JsonlStore::open(dir.path(), 4).unwrap();
        assert_eq!(store.clean_count().await.unwrap(), 2);

        // Same key replaces, different key inserts
        let report = store
            .upsert_clean_batch(1, &[record(1, "ORD-1", 5)])
            .await
            .unwrap();
        assert_eq!(report.replaced, 1);
        assert_eq!(store.clean_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_view_replace_persists_immediately() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = JsonlStore::open(dir.path(), 1).unwrap();

        store
            .replace_view("aggregated_status", vec![serde_json::json!({"n": 1})])
            .await
            .unwrap();
        assert!(dir.path().join("views/aggregated_status.jsonl").exists());

        store
            .replace_view("aggregated_status", vec![serde_json::json!({"n": 2})])
            .await
            .unwrap();
        let rows = store.read_view("aggregated_status").await.unwrap();
        assert_eq!(rows, vec![serde_json::json!({"n": 2})]);
    }

    #[tokio::test]
    async fn test_raw_staging_survives_flush() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = JsonlStore::open(dir.path(), 1).unwrap();

        let raw = vec![RawRecord::malformed(0, "bad row")];
        store.append_raw_batch(&raw).await.unwrap();
        store.flush().await.unwrap();
        assert!(dir.path().join("raw_orders.jsonl").exists());
    }

    #[tokio::test]
    async fn test_clear_clean_empties_partitions_on_flush() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = JsonlStore::open(dir.path(), 2).unwrap();
        store
            .upsert_clean_batch(0, &[record(1, "ORD-1", 0)])
            .await
            .unwrap();
        store.flush().await.unwrap();

        store.clear_clean().await.unwrap();
        store.flush().await.unwrap();

        let reopened = JsonlStore::open(dir.path(), 2).unwrap();
        assert_eq!(reopened.clean_count().await.unwrap(), 0);
    }
}
