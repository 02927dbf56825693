//! Schema validation for raw order records
//!
//! Pure, deterministic validation with no I/O: given one raw record, produce
//! either a normalized clean record or the specific reason it was rejected.
//! Rules run in a fixed order and the first failure wins, so a record that
//! breaks several rules is always tagged with the earliest one.

use crate::app::models::{CleanRecord, OrderStatus, RawRecord, RejectReason, parse_money_cents};
use crate::constants::{self, UNKNOWN_PRODUCT_NAME};
use std::str::FromStr;

/// Validation outcome: a clean record candidate or a structured rejection
pub type ValidationResult = std::result::Result<CleanRecord, RejectReason>;

/// Validate and normalize one raw record
///
/// Rule order (short-circuit, first failure wins):
/// 1. framing: rows that failed source framing are rejected as `Malformed`
/// 2. presence: all required fields present (`product_name` is filled, not
///    required)
/// 3. type coercion: integers, money, date
/// 4. range: `price >= 0`, `quantity >= 1`, `user_id >= 1`
/// 5. domain: category and status in their allow-lists (case-insensitive)
/// 6. strings: `order_id` / `product_id` non-empty after trimming
pub fn validate_record(raw: &RawRecord) -> ValidationResult {
    if raw.framing_error.is_some() {
        return Err(RejectReason::Malformed);
    }

    // Rule 1: required-field presence
    let user_id_raw = required(&raw.user_id)?;
    let order_id_raw = required(&raw.order_id)?;
    let product_id_raw = required(&raw.product_id)?;
    let category_raw = required(&raw.category)?;
    let price_raw = required(&raw.price)?;
    let quantity_raw = required(&raw.quantity)?;
    let order_date_raw = required(&raw.order_date)?;
    let status_raw = required(&raw.status)?;

    // Rule 2: type coercion
    let user_id: i64 = user_id_raw
        .trim()
        .parse()
        .map_err(|_| RejectReason::TypeMismatch)?;
    let price_cents = parse_money_cents(price_raw).ok_or(RejectReason::TypeMismatch)?;
    let quantity: i64 = quantity_raw
        .trim()
        .parse()
        .map_err(|_| RejectReason::TypeMismatch)?;
    let order_date =
        constants::parse_order_date(order_date_raw).ok_or(RejectReason::TypeMismatch)?;

    // Rule 3: range checks
    if price_cents < 0 {
        return Err(RejectReason::RangeViolation);
    }
    if quantity < 1 || quantity > u32::MAX as i64 {
        return Err(RejectReason::RangeViolation);
    }
    if user_id < 1 {
        return Err(RejectReason::RangeViolation);
    }

    // Rule 4: domain checks
    if !constants::is_known_category(category_raw) {
        return Err(RejectReason::DomainViolation);
    }
    let status = OrderStatus::from_str(status_raw).map_err(|_| RejectReason::DomainViolation)?;

    // Rule 5: string checks
    let order_id = order_id_raw.trim();
    let product_id = product_id_raw.trim();
    if order_id.is_empty() || product_id.is_empty() {
        return Err(RejectReason::EmptyField);
    }

    let quantity = quantity as u32;
    Ok(CleanRecord {
        user_id: user_id as u64,
        order_id: order_id.to_string(),
        product_id: product_id.to_string(),
        product_name: normalize_product_name(raw.product_name.as_deref()),
        category: category_raw.trim().to_ascii_lowercase(),
        price_cents,
        quantity,
        order_date,
        status,
        total_cents: price_cents * quantity as i64,
        seq: raw.seq,
    })
}

/// Rule-1 helper: a field is present when the source supplied it at all.
/// Blank values fall through to the type/string rules so they are tagged
/// with the rule that actually describes the problem.
fn required(field: &Option<String>) -> std::result::Result<&str, RejectReason> {
    field.as_deref().ok_or(RejectReason::MissingField)
}

/// Collapse internal whitespace; a missing name gets the fill value
fn normalize_product_name(name: Option<&str>) -> String {
    match name {
        Some(value) if !value.trim().is_empty() => {
            value.split_whitespace().collect::<Vec<_>>().join(" ")
        }
        _ => UNKNOWN_PRODUCT_NAME.to_string(),
    }
}
