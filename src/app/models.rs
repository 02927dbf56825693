//! Data models for order processing
//!
//! This module contains the core data structures for representing order
//! records as they move through the pipeline: the loosely-typed raw shape
//! read from the source, the strongly-typed clean shape produced by the
//! schema validator, and the rejection taxonomy carried into the audit sink.

use crate::constants::FIELD_COUNT;
use crate::{Error, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

// =============================================================================
// Raw Record Structure
// =============================================================================

/// One unvalidated order row as read from the source
///
/// All nine fields are held as optional strings; type coercion is the schema
/// validator's job, not the reader's. The `seq` number is assigned at read
/// time and fixes the deterministic tie-break for duplicate resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Monotonically increasing ingestion sequence number
    pub seq: u64,

    pub user_id: Option<String>,
    pub order_id: Option<String>,
    pub product_id: Option<String>,
    pub product_name: Option<String>,
    pub category: Option<String>,
    pub price: Option<String>,
    pub quantity: Option<String>,
    pub order_date: Option<String>,
    pub status: Option<String>,

    /// Set when the source row failed framing (wrong arity, unreadable row).
    /// Such records are pre-validation rejections, never reader-fatal errors.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub framing_error: Option<String>,
}

impl RawRecord {
    /// Build a raw record from source fields in canonical column order
    pub fn from_fields(seq: u64, fields: Vec<Option<String>>) -> Result<Self> {
        if fields.len() != FIELD_COUNT {
            return Err(Error::data_validation(format!(
                "Expected {} fields, got {}",
                FIELD_COUNT,
                fields.len()
            )));
        }

        let mut it = fields.into_iter();
        Ok(Self {
            seq,
            user_id: it.next().flatten(),
            order_id: it.next().flatten(),
            product_id: it.next().flatten(),
            product_name: it.next().flatten(),
            category: it.next().flatten(),
            price: it.next().flatten(),
            quantity: it.next().flatten(),
            order_date: it.next().flatten(),
            status: it.next().flatten(),
            framing_error: None,
        })
    }

    /// Build a placeholder record for a row that failed source framing
    pub fn malformed(seq: u64, reason: impl Into<String>) -> Self {
        Self {
            seq,
            user_id: None,
            order_id: None,
            product_id: None,
            product_name: None,
            category: None,
            price: None,
            quantity: None,
            order_date: None,
            status: None,
            framing_error: Some(reason.into()),
        }
    }
}

// =============================================================================
// Clean Record Structure
// =============================================================================

/// Deduplication key: no two clean records may share one
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub user_id: u64,
    pub order_id: String,
}

/// A validated, normalized order record
///
/// Produced by the schema validator from a [`RawRecord`]; every downstream
/// stage operates on this shape only. Money is held as integer cents so
/// revenue sums stay exact at scale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanRecord {
    pub user_id: u64,
    pub order_id: String,
    pub product_id: String,
    pub product_name: String,
    /// Lower-cased, trimmed, member of the bounded category set
    pub category: String,
    /// Unit price in cents
    pub price_cents: i64,
    pub quantity: u32,
    pub order_date: NaiveDate,
    pub status: OrderStatus,
    /// Derived `price_cents * quantity`
    pub total_cents: i64,
    /// Ingestion sequence carried from the raw record
    pub seq: u64,
}

impl CleanRecord {
    /// The record's deduplication/upsert key
    pub fn key(&self) -> RecordKey {
        RecordKey {
            user_id: self.user_id,
            order_id: self.order_id.clone(),
        }
    }

    /// Calendar month key in `YYYY-MM` form
    pub fn month_key(&self) -> String {
        self.order_date.format("%Y-%m").to_string()
    }
}

// =============================================================================
// Order Status Enumeration
// =============================================================================

/// Canonical order status values
///
/// Source feeds carry several synonyms for these; [`OrderStatus::from_str`]
/// accepts the known synonyms case-insensitively and anything else is a
/// domain violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Completed,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    /// Canonical lower-case name
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
        }
    }

    /// All status values in reporting order
    pub fn all_values() -> [OrderStatus; 4] {
        [
            OrderStatus::Completed,
            OrderStatus::Pending,
            OrderStatus::Cancelled,
            OrderStatus::Refunded,
        ]
    }
}

impl FromStr for OrderStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" | "processing" => Ok(OrderStatus::Pending),
            "completed" | "complete" | "done" => Ok(OrderStatus::Completed),
            "cancelled" | "canceled" => Ok(OrderStatus::Cancelled),
            "refunded" | "returned" => Ok(OrderStatus::Refunded),
            other => Err(Error::data_validation(format!(
                "Unknown order status '{}'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Rejection Taxonomy
// =============================================================================

/// Why a record was excluded from the clean dataset
///
/// The first five variants follow the fixed validation rule order; a record
/// is tagged with the first rule it fails. `DuplicateKey` is assigned by the
/// cleaning stage, after validation succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Source row failed framing before validation could run
    Malformed,
    /// A required field is absent
    MissingField,
    /// A numeric or date field failed to parse
    TypeMismatch,
    /// A numeric field is outside its allowed range
    RangeViolation,
    /// Category or status is outside the enumerated allow-list
    DomainViolation,
    /// An identifier field is empty after trimming
    EmptyField,
    /// Another record with the same (user_id, order_id) was kept
    DuplicateKey,
}

impl RejectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RejectReason::Malformed => "malformed",
            RejectReason::MissingField => "missing_field",
            RejectReason::TypeMismatch => "type_mismatch",
            RejectReason::RangeViolation => "range_violation",
            RejectReason::DomainViolation => "domain_violation",
            RejectReason::EmptyField => "empty_field",
            RejectReason::DuplicateKey => "duplicate_key",
        }
    }

    /// Human-readable description for reports
    pub fn description(self) -> &'static str {
        match self {
            RejectReason::Malformed => "row failed source framing",
            RejectReason::MissingField => "required field missing",
            RejectReason::TypeMismatch => "field failed type coercion",
            RejectReason::RangeViolation => "numeric field out of range",
            RejectReason::DomainViolation => "value outside enumerated set",
            RejectReason::EmptyField => "identifier empty after trimming",
            RejectReason::DuplicateKey => "duplicate (user_id, order_id) key",
        }
    }

    /// All reasons in reporting order
    pub fn all_values() -> [RejectReason; 7] {
        [
            RejectReason::Malformed,
            RejectReason::MissingField,
            RejectReason::TypeMismatch,
            RejectReason::RangeViolation,
            RejectReason::DomainViolation,
            RejectReason::EmptyField,
            RejectReason::DuplicateKey,
        ]
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A raw record paired with its rejection reason, as written to the audit sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedRecord {
    pub reason: RejectReason,
    pub record: RawRecord,
}

impl RejectedRecord {
    pub fn new(reason: RejectReason, record: RawRecord) -> Self {
        Self { reason, record }
    }
}

// =============================================================================
// Money Helpers
// =============================================================================

/// Parse a decimal money string into integer cents
///
/// Accepts an optional leading sign, at most two fractional digits, and no
/// exponent or grouping characters. `"999.99"` → `99999`, `"12"` → `1200`,
/// `"12.5"` → `1250`. Returns `None` for anything else.
pub fn parse_money_cents(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };

    let (whole, frac) = match digits.split_once('.') {
        Some((w, f)) => (w, f),
        None => (digits, ""),
    };

    if whole.is_empty() || frac.len() > 2 {
        return None;
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let whole: i64 = whole.parse().ok()?;
    let frac_cents: i64 = match frac.len() {
        0 => 0,
        1 => frac.parse::<i64>().ok()? * 10,
        _ => frac.parse().ok()?,
    };

    let cents = whole.checked_mul(100)?.checked_add(frac_cents)?;
    Some(if negative { -cents } else { cents })
}

/// Format integer cents as a decimal money string
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test data helpers
    fn create_test_raw() -> RawRecord {
        RawRecord::from_fields(
            7,
            vec![
                Some("12345".to_string()),
                Some("ORD-001".to_string()),
                Some("PROD-ABC".to_string()),
                Some("Laptop".to_string()),
                Some("Electronics".to_string()),
                Some("999.99".to_string()),
                Some("1".to_string()),
                Some("2024-01-15".to_string()),
                Some("completed".to_string()),
            ],
        )
        .unwrap()
    }

    fn create_test_clean() -> CleanRecord {
        CleanRecord {
            user_id: 12345,
            order_id: "ORD-001".to_string(),
            product_id: "PROD-ABC".to_string(),
            product_name: "Laptop".to_string(),
            category: "electronics".to_string(),
            price_cents: 99_999,
            quantity: 2,
            order_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            status: OrderStatus::Completed,
            total_cents: 199_998,
            seq: 7,
        }
    }

    mod raw_record_tests {
        use super::*;

        #[test]
        fn test_from_fields_maps_column_order() {
            let raw = create_test_raw();
            assert_eq!(raw.seq, 7);
            assert_eq!(raw.user_id.as_deref(), Some("12345"));
            assert_eq!(raw.order_id.as_deref(), Some("ORD-001"));
            assert_eq!(raw.status.as_deref(), Some("completed"));
            assert!(raw.framing_error.is_none());
        }

        #[test]
        fn test_from_fields_rejects_wrong_arity() {
            let result = RawRecord::from_fields(0, vec![Some("1".to_string()); 5]);
            assert!(result.is_err());
        }

        #[test]
        fn test_malformed_carries_reason() {
            let raw = RawRecord::malformed(3, "row has 4 fields, expected 9");
            assert_eq!(raw.seq, 3);
            assert!(raw.user_id.is_none());
            assert_eq!(
                raw.framing_error.as_deref(),
                Some("row has 4 fields, expected 9")
            );
        }
    }

    mod clean_record_tests {
        use super::*;

        #[test]
        fn test_key() {
            let clean = create_test_clean();
            let key = clean.key();
            assert_eq!(key.user_id, 12345);
            assert_eq!(key.order_id, "ORD-001");
        }

        #[test]
        fn test_month_key() {
            let clean = create_test_clean();
            assert_eq!(clean.month_key(), "2024-01");
        }

        #[test]
        fn test_serde_round_trip() {
            let clean = create_test_clean();
            let json = serde_json::to_string(&clean).unwrap();
            let back: CleanRecord = serde_json::from_str(&json).unwrap();
            assert_eq!(clean, back);
        }
    }

    mod order_status_tests {
        use super::*;

        #[test]
        fn test_canonical_values() {
            assert_eq!(OrderStatus::from_str("pending").unwrap(), OrderStatus::Pending);
            assert_eq!(
                OrderStatus::from_str("completed").unwrap(),
                OrderStatus::Completed
            );
            assert_eq!(
                OrderStatus::from_str("cancelled").unwrap(),
                OrderStatus::Cancelled
            );
            assert_eq!(
                OrderStatus::from_str("refunded").unwrap(),
                OrderStatus::Refunded
            );
        }

        #[test]
        fn test_synonyms_normalize() {
            assert_eq!(OrderStatus::from_str("complete").unwrap(), OrderStatus::Completed);
            assert_eq!(OrderStatus::from_str("done").unwrap(), OrderStatus::Completed);
            assert_eq!(OrderStatus::from_str("processing").unwrap(), OrderStatus::Pending);
            assert_eq!(OrderStatus::from_str("canceled").unwrap(), OrderStatus::Cancelled);
            assert_eq!(OrderStatus::from_str("returned").unwrap(), OrderStatus::Refunded);
        }

        #[test]
        fn test_case_and_whitespace_insensitive() {
            assert_eq!(
                OrderStatus::from_str(" COMPLETED ").unwrap(),
                OrderStatus::Completed
            );
        }

        #[test]
        fn test_unknown_status_is_error() {
            assert!(OrderStatus::from_str("shipped").is_err());
            assert!(OrderStatus::from_str("").is_err());
        }

        #[test]
        fn test_display_matches_serde() {
            let json = serde_json::to_string(&OrderStatus::Refunded).unwrap();
            assert_eq!(json, "\"refunded\"");
            assert_eq!(OrderStatus::Refunded.to_string(), "refunded");
        }
    }

    mod reject_reason_tests {
        use super::*;

        #[test]
        fn test_all_values_complete() {
            assert_eq!(RejectReason::all_values().len(), 7);
        }

        #[test]
        fn test_descriptions_nonempty() {
            for reason in RejectReason::all_values() {
                assert!(!reason.description().is_empty());
                assert!(!reason.as_str().is_empty());
            }
        }

        #[test]
        fn test_serde_snake_case() {
            let json = serde_json::to_string(&RejectReason::RangeViolation).unwrap();
            assert_eq!(json, "\"range_violation\"");
        }
    }

    mod money_tests {
        use super::*;

        #[test]
        fn test_parse_money_cents() {
            assert_eq!(parse_money_cents("999.99"), Some(99_999));
            assert_eq!(parse_money_cents("12"), Some(1_200));
            assert_eq!(parse_money_cents("12.5"), Some(1_250));
            assert_eq!(parse_money_cents("0.01"), Some(1));
            assert_eq!(parse_money_cents("0"), Some(0));
            assert_eq!(parse_money_cents("-5"), Some(-500));
            assert_eq!(parse_money_cents(" 3.99 "), Some(399));
        }

        #[test]
        fn test_parse_money_cents_rejects_invalid() {
            assert_eq!(parse_money_cents(""), None);
            assert_eq!(parse_money_cents("abc"), None);
            assert_eq!(parse_money_cents("1.999"), None);
            assert_eq!(parse_money_cents("1e3"), None);
            assert_eq!(parse_money_cents("1,000"), None);
            assert_eq!(parse_money_cents("."), None);
            assert_eq!(parse_money_cents(".50"), None);
        }

        #[test]
        fn test_format_cents() {
            assert_eq!(format_cents(99_999), "999.99");
            assert_eq!(format_cents(1_250), "12.50");
            assert_eq!(format_cents(1), "0.01");
            assert_eq!(format_cents(0), "0.00");
            assert_eq!(format_cents(-500), "-5.00");
        }
    }
}
