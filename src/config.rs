//! Configuration management and validation.
//!
//! Provides the sectioned configuration for a pipeline run: source reading,
//! store layout, processing parallelism, and transient-failure retry policy.

use crate::constants::{
    DEFAULT_PARALLEL_WORKERS, DEFAULT_PARTITION_COUNT, DEFAULT_READ_BATCH_SIZE, DEFAULT_TOP_USERS,
    DEFAULT_WRITE_BATCH_SIZE, MAX_RETRY_ATTEMPTS, RETRY_BASE_DELAY_MS,
};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Source reading settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSettings {
    /// Path to the delimited source file
    pub path: PathBuf,

    /// Records per read batch (bounds reader memory)
    pub batch_size: usize,

    /// Data rows to skip before reading (resume after partial failure)
    pub resume_offset: u64,
}

/// Destination store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Root directory for the file-backed store; `None` selects the
    /// in-memory store
    pub root: Option<PathBuf>,

    /// Number of partitions; must match the store's shard layout
    pub partition_count: u32,

    /// Records per write batch, independent of the read batch size
    pub write_batch_size: usize,

    /// Audit sink path for rejected records; `None` keeps rejections
    /// in memory only
    pub audit_path: Option<PathBuf>,
}

/// Processing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingSettings {
    /// Number of parallel cleaning workers
    pub workers: usize,

    /// Maximum users retained in the user aggregation view
    pub top_users: usize,

    /// Whether to render progress bars
    pub show_progress: bool,
}

/// Retry policy for transient store failures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Maximum write attempts per batch (first try included)
    pub max_attempts: usize,

    /// Base delay before the first retry; doubles per attempt
    pub base_delay_ms: u64,
}

impl RetrySettings {
    /// Backoff delay before retry number `attempt` (1-based)
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let factor = 1u64 << (attempt.saturating_sub(1)).min(16);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }
}

/// Global configuration for a pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub source: SourceSettings,
    pub store: StoreSettings,
    pub processing: ProcessingSettings,
    pub retry: RetrySettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: SourceSettings {
                path: PathBuf::from("data/raw_orders.csv"),
                batch_size: DEFAULT_READ_BATCH_SIZE,
                resume_offset: 0,
            },
            store: StoreSettings {
                root: None,
                partition_count: DEFAULT_PARTITION_COUNT,
                write_batch_size: DEFAULT_WRITE_BATCH_SIZE,
                audit_path: None,
            },
            processing: ProcessingSettings {
                workers: DEFAULT_PARALLEL_WORKERS,
                top_users: DEFAULT_TOP_USERS,
                show_progress: true,
            },
            retry: RetrySettings {
                max_attempts: MAX_RETRY_ATTEMPTS,
                base_delay_ms: RETRY_BASE_DELAY_MS,
            },
        }
    }
}

impl Config {
    /// Create a configuration for a specific source file
    pub fn new(source_path: impl Into<PathBuf>) -> Self {
        let mut config = Self::default();
        config.source.path = source_path.into();
        config
    }

    /// Create configuration with a custom worker count
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.processing.workers = workers;
        self
    }

    /// Create configuration with a custom read batch size
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.source.batch_size = batch_size;
        self
    }

    /// Create configuration with a custom write batch size
    pub fn with_write_batch_size(mut self, batch_size: usize) -> Self {
        self.store.write_batch_size = batch_size;
        self
    }

    /// Create configuration with a custom partition count
    pub fn with_partition_count(mut self, partitions: u32) -> Self {
        self.store.partition_count = partitions;
        self
    }

    /// Create configuration with a file-backed store root
    pub fn with_store_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.store.root = Some(root.into());
        self
    }

    /// Create configuration resuming from a row offset
    pub fn with_resume_offset(mut self, offset: u64) -> Self {
        self.source.resume_offset = offset;
        self
    }

    /// Disable progress bars (quiet operation)
    pub fn without_progress(mut self) -> Self {
        self.processing.show_progress = false;
        self
    }

    /// Validate settings for consistency
    pub fn validate(&self) -> Result<()> {
        if self.source.batch_size == 0 {
            return Err(Error::configuration(
                "Read batch size must be greater than 0".to_string(),
            ));
        }

        if self.store.write_batch_size == 0 {
            return Err(Error::configuration(
                "Write batch size must be greater than 0".to_string(),
            ));
        }

        if self.store.partition_count == 0 {
            return Err(Error::configuration(
                "Partition count must be greater than 0".to_string(),
            ));
        }

        if self.processing.workers == 0 {
            return Err(Error::configuration(
                "Number of workers must be greater than 0".to_string(),
            ));
        }

        if self.processing.workers > 100 {
            return Err(Error::configuration(
                "Number of workers cannot exceed 100".to_string(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(Error::configuration(
                "Retry attempts must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
