//! Cleaning stage statistics
//!
//! Tracks the accepted/rejected split, the rejection breakdown by reason,
//! and the write-level counters reported back by the partition writer.

use crate::app::models::RejectReason;
use crate::app::services::partition::WriteStats;
use serde::Serialize;
use std::collections::BTreeMap;

/// Counters for one cleaning stage execution
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleaningStats {
    /// Raw records consumed from staging
    pub total_input: usize,
    /// Records that passed validation and won their key
    pub accepted: usize,
    /// Records dropped because another record held their key
    pub duplicate_count: usize,
    /// Validation rejections, keyed by reason
    pub rejected_by_reason: BTreeMap<RejectReason, usize>,
    /// Distinct keys seen (equals `accepted` when dedup is consistent)
    pub distinct_keys: usize,
    /// Write counters reported by the partition writer
    pub write: WriteCounters,
}

/// Serializable projection of [`WriteStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteCounters {
    pub inserted: usize,
    pub replaced: usize,
    pub store_rejected: usize,
    pub batches: usize,
    pub retries: usize,
}

impl From<WriteStats> for WriteCounters {
    fn from(stats: WriteStats) -> Self {
        Self {
            inserted: stats.inserted,
            replaced: stats.replaced,
            store_rejected: stats.store_rejected,
            batches: stats.batches,
            retries: stats.retries,
        }
    }
}

impl CleaningStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one validation rejection
    pub fn add_rejection(&mut self, reason: RejectReason) {
        *self.rejected_by_reason.entry(reason).or_insert(0) += 1;
    }

    /// Merge a worker's local tallies (reduce step)
    pub fn merge_rejections(&mut self, other: &BTreeMap<RejectReason, usize>) {
        for (reason, count) in other {
            *self.rejected_by_reason.entry(*reason).or_insert(0) += count;
        }
    }

    /// Total records rejected for any reason, duplicates included
    pub fn total_rejected(&self) -> usize {
        self.rejected_by_reason.values().sum::<usize>() + self.duplicate_count
    }

    /// Rejection rate as a percentage of input
    pub fn rejection_rate(&self) -> f64 {
        if self.total_input == 0 {
            0.0
        } else {
            (self.total_rejected() as f64 / self.total_input as f64) * 100.0
        }
    }

    /// Acceptance rate as a percentage of input
    pub fn acceptance_rate(&self) -> f64 {
        if self.total_input == 0 {
            100.0
        } else {
            (self.accepted as f64 / self.total_input as f64) * 100.0
        }
    }

    /// Internal consistency: every input record is accounted for exactly once
    pub fn is_balanced(&self) -> bool {
        self.accepted + self.total_rejected() == self.total_input
    }

    /// Summary string for logging
    pub fn summary(&self) -> String {
        format!(
            "Cleaning summary: {} -> {} records ({:.1}% accepted) | \
             {} duplicates | {} validation rejects | {} store rejects",
            self.total_input,
            self.accepted,
            self.acceptance_rate(),
            self.duplicate_count,
            self.rejected_by_reason.values().sum::<usize>(),
            self.write.store_rejected
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_stats_are_balanced() {
        let stats = CleaningStats::new();
        assert!(stats.is_balanced());
        assert_eq!(stats.acceptance_rate(), 100.0);
        assert_eq!(stats.rejection_rate(), 0.0);
    }

    #[test]
    fn test_rates_and_balance() {
        let mut stats = CleaningStats::new();
        stats.total_input = 10;
        stats.accepted = 7;
        stats.duplicate_count = 1;
        stats.add_rejection(RejectReason::RangeViolation);
        stats.add_rejection(RejectReason::TypeMismatch);

        assert!(stats.is_balanced());
        assert_eq!(stats.total_rejected(), 3);
        assert!((stats.acceptance_rate() - 70.0).abs() < f64::EPSILON);
        assert!((stats.rejection_rate() - 30.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_merge_rejections() {
        let mut stats = CleaningStats::new();
        stats.add_rejection(RejectReason::TypeMismatch);

        let mut worker = BTreeMap::new();
        worker.insert(RejectReason::TypeMismatch, 2);
        worker.insert(RejectReason::EmptyField, 1);
        stats.merge_rejections(&worker);

        assert_eq!(stats.rejected_by_reason[&RejectReason::TypeMismatch], 3);
        assert_eq!(stats.rejected_by_reason[&RejectReason::EmptyField], 1);
    }

    #[test]
    fn test_summary_mentions_counts() {
        let mut stats = CleaningStats::new();
        stats.total_input = 4;
        stats.accepted = 3;
        stats.duplicate_count = 1;
        let summary = stats.summary();
        assert!(summary.contains("4 -> 3"));
        assert!(summary.contains("1 duplicates"));
    }
}
