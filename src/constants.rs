//! Application constants for the order processor
//!
//! This module contains the schema allow-lists, default processing values,
//! and collection names used throughout the pipeline.

// =============================================================================
// Source Schema
// =============================================================================

/// The nine raw record columns, in canonical source order
pub const ORDER_COLUMNS: &[&str] = &[
    "user_id",
    "order_id",
    "product_id",
    "product_name",
    "category",
    "price",
    "quantity",
    "order_date",
    "status",
];

/// Number of fields a well-framed source row must carry
pub const FIELD_COUNT: usize = 9;

/// Allowed product categories (canonical lower-case form)
pub const CATEGORIES: &[&str] = &["electronics", "clothing", "furniture", "accessories", "sports"];

/// Accepted order date formats, tried in order
pub const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y-%m-%d %H:%M:%S", "%Y/%m/%d"];

/// Fill value for a missing product name (the only optional source field)
pub const UNKNOWN_PRODUCT_NAME: &str = "unknown product";

// =============================================================================
// Store Collections
// =============================================================================

/// Raw staging collection written by the ingest stage
pub const RAW_COLLECTION: &str = "raw_orders";

/// Clean partitioned collection written by the cleaning stage
pub const CLEAN_COLLECTION: &str = "clean_orders";

/// Aggregation view collection names
pub mod views {
    pub const CATEGORY: &str = "aggregated_category";
    pub const MONTH: &str = "aggregated_month";
    pub const STATUS: &str = "aggregated_status";
    pub const USER: &str = "aggregated_user";
    pub const DAY_OF_WEEK: &str = "aggregated_day_of_week";
    pub const OVERVIEW: &str = "aggregated_overview";

    /// All view collections, in the order they are reported
    pub const ALL: &[&str] = &[CATEGORY, MONTH, STATUS, USER, DAY_OF_WEEK, OVERVIEW];
}

// =============================================================================
// Processing Configuration Defaults
// =============================================================================

/// Default number of records per source read batch
pub const DEFAULT_READ_BATCH_SIZE: usize = 10_000;

/// Default number of records per store write batch (independent of reads)
pub const DEFAULT_WRITE_BATCH_SIZE: usize = 5_000;

/// Default number of parallel cleaning workers
pub const DEFAULT_PARALLEL_WORKERS: usize = 4;

/// Default number of store partitions (must match the store's shard layout)
pub const DEFAULT_PARTITION_COUNT: u32 = 8;

/// Maximum number of users kept in the user aggregation view
pub const DEFAULT_TOP_USERS: usize = 1_000;

/// Retry constants for transient store errors
pub const MAX_RETRY_ATTEMPTS: usize = 3;
pub const RETRY_BASE_DELAY_MS: u64 = 100;

/// Progress reporting update interval (number of processed records)
pub const PROGRESS_UPDATE_INTERVAL: usize = 1_000;

// =============================================================================
// Helper Functions
// =============================================================================

/// Check whether a category belongs to the bounded allow-list
/// (case-insensitive, surrounding whitespace ignored)
pub fn is_known_category(raw: &str) -> bool {
    let normalized = raw.trim().to_ascii_lowercase();
    CATEGORIES.contains(&normalized.as_str())
}

/// Parse an order date under the accepted formats, first match wins.
/// Time-of-day components are parsed and discarded.
pub fn parse_order_date(raw: &str) -> Option<chrono::NaiveDate> {
    let trimmed = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|format| chrono::NaiveDate::parse_from_str(trimmed, format).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_categories() {
        assert!(is_known_category("electronics"));
        assert!(is_known_category("Electronics"));
        assert!(is_known_category("  SPORTS  "));
        assert!(!is_known_category("groceries"));
        assert!(!is_known_category(""));
    }

    #[test]
    fn test_parse_order_date_formats() {
        let expected = chrono::NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(parse_order_date("2024-01-15"), Some(expected));
        assert_eq!(parse_order_date("2024-01-15 10:30:00"), Some(expected));
        assert_eq!(parse_order_date("2024/01/15"), Some(expected));
        assert_eq!(parse_order_date(" 2024-01-15 "), Some(expected));
    }

    #[test]
    fn test_parse_order_date_rejects_garbage() {
        assert_eq!(parse_order_date("15/01/2024"), None);
        assert_eq!(parse_order_date("not a date"), None);
        assert_eq!(parse_order_date("2024-13-01"), None);
        assert_eq!(parse_order_date(""), None);
    }

    #[test]
    fn test_column_order_matches_field_count() {
        assert_eq!(ORDER_COLUMNS.len(), FIELD_COUNT);
    }

    #[test]
    fn test_view_names_are_distinct() {
        let mut names: Vec<&str> = views::ALL.to_vec();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), views::ALL.len());
    }
}
