//! Aggregation stage: parallel view computation with full-replace writes
//!
//! Reads the clean dataset once as an immutable snapshot, computes the six
//! views as independent tokio tasks (they share no state and no view depends
//! on another's output), and replaces each destination collection wholesale.
//! A replace is never a merge, so no stale partial aggregate from a prior
//! run can survive a schema or data change.

pub mod views;

pub use views::{
    CategoryRow, MonthRow, OverviewRow, StatusRow, UserRow, WeekdayRow, average_cents, percent_of,
};

use crate::app::models::CleanRecord;
use crate::app::services::partition::PartitionStore;
use crate::constants::views as view_names;
use crate::{Error, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Counters for one aggregation stage execution
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AggregationStats {
    /// Clean records in the snapshot
    pub input_records: usize,
    /// Views written (all or nothing under normal completion)
    pub views_written: usize,
    /// Rows per view collection
    pub rows_per_view: BTreeMap<String, usize>,
}

impl AggregationStats {
    /// Total rows written across all views
    pub fn total_rows(&self) -> usize {
        self.rows_per_view.values().sum()
    }
}

/// Aggregation stage executor
pub struct AggregationStage {
    top_users: usize,
    cancellation: CancellationToken,
}

impl AggregationStage {
    pub fn new(top_users: usize, cancellation: CancellationToken) -> Self {
        Self {
            top_users,
            cancellation,
        }
    }

    /// Compute all views from the clean snapshot and replace the
    /// destination collections
    pub async fn run(&self, store: Arc<dyn PartitionStore>) -> Result<AggregationStats> {
        let snapshot: Arc<Vec<CleanRecord>> = Arc::new(store.read_clean_snapshot().await?);
        info!(
            "Starting aggregation stage over {} clean records",
            snapshot.len()
        );

        let mut stats = AggregationStats {
            input_records: snapshot.len(),
            ..AggregationStats::default()
        };

        // Fan out the independent view computations
        let mut tasks: JoinSet<Result<(&'static str, Vec<serde_json::Value>)>> = JoinSet::new();

        let records = snapshot.clone();
        tasks.spawn(async move { to_rows(view_names::CATEGORY, views::category_view(&records)) });

        let records = snapshot.clone();
        tasks.spawn(async move { to_rows(view_names::MONTH, views::month_view(&records)) });

        let records = snapshot.clone();
        tasks.spawn(async move { to_rows(view_names::STATUS, views::status_view(&records)) });

        let records = snapshot.clone();
        let limit = self.top_users;
        tasks.spawn(async move { to_rows(view_names::USER, views::user_view(&records, limit)) });

        let records = snapshot.clone();
        tasks
            .spawn(async move { to_rows(view_names::DAY_OF_WEEK, views::weekday_view(&records)) });

        let records = snapshot.clone();
        tasks
            .spawn(async move { to_rows(view_names::OVERVIEW, vec![views::overview_view(&records)]) });

        // Collect and write; a full replace per view, checking for
        // cancellation between writes
        let mut computed: Vec<(&'static str, Vec<serde_json::Value>)> = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let view = joined
                .map_err(|e| Error::data_validation(format!("Aggregation task panicked: {}", e)))??;
            computed.push(view);
        }
        // Deterministic write order for logs and tests
        computed.sort_by_key(|(name, _)| *name);

        for (name, rows) in computed {
            if self.cancellation.is_cancelled() {
                return Err(Error::interrupted(format!(
                    "aggregation cancelled before writing '{}'",
                    name
                )));
            }
            debug!("Replacing view '{}' with {} rows", name, rows.len());
            stats.rows_per_view.insert(name.to_string(), rows.len());
            store.replace_view(name, rows).await?;
            stats.views_written += 1;
        }

        info!(
            "Aggregation complete: {} views, {} rows total",
            stats.views_written,
            stats.total_rows()
        );
        Ok(stats)
    }
}

/// Serialize typed view rows into store documents
fn to_rows<T: Serialize>(
    name: &'static str,
    rows: Vec<T>,
) -> Result<(&'static str, Vec<serde_json::Value>)> {
    let documents = rows
        .into_iter()
        .map(|row| serde_json::to_value(row).map_err(Error::from))
        .collect::<Result<Vec<_>>>()?;
    Ok((name, documents))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::models::OrderStatus;
    use crate::app::services::partition::MemoryStore;
    use chrono::NaiveDate;

    fn record(seq: u64, user_id: u64, category: &str, total_cents: i64) -> CleanRecord {
        CleanRecord {
            user_id,
            order_id: format!("ORD-{}", seq),
            product_id: "PROD-1".to_string(),
            product_name: "Widget".to_string(),
            category: category.to_string(),
            price_cents: total_cents,
            quantity: 1,
            order_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            status: OrderStatus::Completed,
            total_cents,
            seq,
        }
    }

    async fn seed(store: &MemoryStore, records: &[CleanRecord]) {
        store.upsert_clean_batch(0, records).await.unwrap();
    }

    #[tokio::test]
    async fn test_all_views_written() {
        let store = Arc::new(MemoryStore::new(1));
        seed(
            &store,
            &[
                record(0, 1, "electronics", 10_000),
                record(1, 2, "clothing", 5_000),
            ],
        )
        .await;

        let stage = AggregationStage::new(100, CancellationToken::new());
        let stats = stage.run(store.clone()).await.unwrap();

        assert_eq!(stats.input_records, 2);
        assert_eq!(stats.views_written, view_names::ALL.len());
        for name in view_names::ALL {
            assert!(
                !store.read_view(name).await.unwrap().is_empty(),
                "view '{}' is empty",
                name
            );
        }
    }

    #[tokio::test]
    async fn test_view_counts_match_accepted_records() {
        let store = Arc::new(MemoryStore::new(1));
        let records: Vec<CleanRecord> = (0..30)
            .map(|i| record(i, i % 5, ["electronics", "sports"][i as usize % 2], 1_000))
            .collect();
        seed(&store, &records).await;

        let stage = AggregationStage::new(100, CancellationToken::new());
        stage.run(store.clone()).await.unwrap();

        let category_total: u64 = store
            .read_view(view_names::CATEGORY)
            .await
            .unwrap()
            .iter()
            .map(|row| row["total_orders"].as_u64().unwrap())
            .sum();
        let status_total: u64 = store
            .read_view(view_names::STATUS)
            .await
            .unwrap()
            .iter()
            .map(|row| row["total_orders"].as_u64().unwrap())
            .sum();

        assert_eq!(category_total, 30);
        assert_eq!(status_total, 30);
    }

    #[tokio::test]
    async fn test_rerun_fully_replaces_views() {
        let store = Arc::new(MemoryStore::new(1));
        seed(
            &store,
            &[
                record(0, 1, "electronics", 1_000),
                record(1, 2, "clothing", 1_000),
                record(2, 3, "sports", 1_000),
            ],
        )
        .await;

        let stage = AggregationStage::new(100, CancellationToken::new());
        stage.run(store.clone()).await.unwrap();
        assert_eq!(store.read_view(view_names::CATEGORY).await.unwrap().len(), 3);

        // Shrink the clean set; stale category rows must disappear
        store.clear_clean().await.unwrap();
        seed(&store, &[record(9, 9, "furniture", 2_000)]).await;
        stage.run(store.clone()).await.unwrap();

        let rows = store.read_view(view_names::CATEGORY).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["category"], "furniture");
    }

    #[tokio::test]
    async fn test_empty_snapshot_writes_empty_views() {
        let store = Arc::new(MemoryStore::new(1));
        let stage = AggregationStage::new(100, CancellationToken::new());
        let stats = stage.run(store.clone()).await.unwrap();

        assert_eq!(stats.input_records, 0);
        assert_eq!(stats.views_written, view_names::ALL.len());
        assert!(store.read_view(view_names::CATEGORY).await.unwrap().is_empty());
        // Overview always carries its single headline row
        assert_eq!(store.read_view(view_names::OVERVIEW).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_stage_reports_interrupted() {
        let store = Arc::new(MemoryStore::new(1));
        seed(&store, &[record(0, 1, "electronics", 1_000)]).await;

        let token = CancellationToken::new();
        token.cancel();
        let stage = AggregationStage::new(100, token);
        let err = stage.run(store).await.unwrap_err();
        assert!(matches!(err, Error::Interrupted { .. }));
    }
}
