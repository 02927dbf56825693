//! Aggregation view computations
//!
//! Each view is a pure function from the immutable clean snapshot to a
//! sorted row set. Revenue sums run over integer cents with i128
//! accumulators; nothing here touches binary floating point except the
//! presentation-only percentage helper.

use crate::app::models::{CleanRecord, OrderStatus};
use chrono::{Datelike, NaiveDate, Weekday};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

/// Round-half-up average of a cents total over a count
pub fn average_cents(total_cents: i128, count: u64) -> i64 {
    if count == 0 {
        return 0;
    }
    let count = count as i128;
    let half = count / 2;
    let adjusted = if total_cents >= 0 {
        total_cents + half
    } else {
        total_cents - half
    };
    (adjusted / count) as i64
}

/// Presentation-only share percentage, rounded to two decimal places
pub fn percent_of(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    ((part as f64 / whole as f64) * 10_000.0).round() / 100.0
}

/// Accumulator shared by the grouped views
#[derive(Default)]
struct GroupAccumulator {
    orders: u64,
    revenue_cents: i128,
    quantity: u64,
    users: HashSet<u64>,
    categories: HashSet<String>,
    first_date: Option<NaiveDate>,
    last_date: Option<NaiveDate>,
}

impl GroupAccumulator {
    fn add(&mut self, record: &CleanRecord) {
        self.orders += 1;
        self.revenue_cents += record.total_cents as i128;
        self.quantity += record.quantity as u64;
        self.users.insert(record.user_id);
        self.categories.insert(record.category.clone());
        self.first_date = Some(match self.first_date {
            Some(d) => d.min(record.order_date),
            None => record.order_date,
        });
        self.last_date = Some(match self.last_date {
            Some(d) => d.max(record.order_date),
            None => record.order_date,
        });
    }

    fn revenue_i64(&self) -> i64 {
        self.revenue_cents as i64
    }
}

fn group_by<K: Ord, F: Fn(&CleanRecord) -> K>(
    records: &[CleanRecord],
    key: F,
) -> BTreeMap<K, GroupAccumulator> {
    let mut groups: BTreeMap<K, GroupAccumulator> = BTreeMap::new();
    for record in records {
        groups.entry(key(record)).or_default().add(record);
    }
    groups
}

// =============================================================================
// Category View
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryRow {
    pub category: String,
    pub total_orders: u64,
    pub total_revenue_cents: i64,
    pub avg_order_value_cents: i64,
    pub unique_customers: u64,
    pub total_quantity: u64,
}

/// Per-category metrics, sorted by revenue descending
pub fn category_view(records: &[CleanRecord]) -> Vec<CategoryRow> {
    let mut rows: Vec<CategoryRow> = group_by(records, |r| r.category.clone())
        .into_iter()
        .map(|(category, acc)| CategoryRow {
            category,
            total_orders: acc.orders,
            total_revenue_cents: acc.revenue_i64(),
            avg_order_value_cents: average_cents(acc.revenue_cents, acc.orders),
            unique_customers: acc.users.len() as u64,
            total_quantity: acc.quantity,
        })
        .collect();
    rows.sort_by(|a, b| {
        b.total_revenue_cents
            .cmp(&a.total_revenue_cents)
            .then_with(|| a.category.cmp(&b.category))
    });
    rows
}

// =============================================================================
// Time (Month) View
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthRow {
    /// Calendar month key, `YYYY-MM`
    pub month: String,
    pub total_orders: u64,
    pub total_revenue_cents: i64,
    pub unique_customers: u64,
    pub total_quantity: u64,
    /// Revenue change versus the previous month present in the data;
    /// `None` for the first month
    pub revenue_delta_cents: Option<i64>,
}

/// Per-month metrics, sorted by month ascending, with month-over-month delta
pub fn month_view(records: &[CleanRecord]) -> Vec<MonthRow> {
    let groups = group_by(records, |r| r.month_key());

    let mut rows = Vec::with_capacity(groups.len());
    let mut previous_revenue: Option<i64> = None;
    for (month, acc) in groups {
        let revenue = acc.revenue_i64();
        rows.push(MonthRow {
            month,
            total_orders: acc.orders,
            total_revenue_cents: revenue,
            unique_customers: acc.users.len() as u64,
            total_quantity: acc.quantity,
            revenue_delta_cents: previous_revenue.map(|prev| revenue - prev),
        });
        previous_revenue = Some(revenue);
    }
    rows
}

// =============================================================================
// Status View
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusRow {
    pub status: OrderStatus,
    pub total_orders: u64,
    pub total_revenue_cents: i64,
    /// Share of all orders, percentage rounded to 2 dp at presentation
    pub share_percent: f64,
}

/// Per-status metrics, sorted by order count descending
pub fn status_view(records: &[CleanRecord]) -> Vec<StatusRow> {
    let total = records.len() as u64;
    let mut rows: Vec<StatusRow> = group_by(records, |r| r.status)
        .into_iter()
        .map(|(status, acc)| StatusRow {
            status,
            total_orders: acc.orders,
            total_revenue_cents: acc.revenue_i64(),
            share_percent: percent_of(acc.orders, total),
        })
        .collect();
    rows.sort_by(|a, b| {
        b.total_orders
            .cmp(&a.total_orders)
            .then_with(|| a.status.as_str().cmp(b.status.as_str()))
    });
    rows
}

// =============================================================================
// User View
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserRow {
    pub user_id: u64,
    pub total_orders: u64,
    pub lifetime_revenue_cents: i64,
    pub avg_order_value_cents: i64,
    pub first_order_date: NaiveDate,
    pub last_order_date: NaiveDate,
    pub categories_purchased: u64,
}

/// Per-user metrics ranked by lifetime revenue, truncated to the top `limit`
pub fn user_view(records: &[CleanRecord], limit: usize) -> Vec<UserRow> {
    let mut rows: Vec<UserRow> = group_by(records, |r| r.user_id)
        .into_iter()
        .map(|(user_id, acc)| UserRow {
            user_id,
            total_orders: acc.orders,
            lifetime_revenue_cents: acc.revenue_i64(),
            avg_order_value_cents: average_cents(acc.revenue_cents, acc.orders),
            first_order_date: acc.first_date.expect("group is non-empty"),
            last_order_date: acc.last_date.expect("group is non-empty"),
            categories_purchased: acc.categories.len() as u64,
        })
        .collect();
    rows.sort_by(|a, b| {
        b.lifetime_revenue_cents
            .cmp(&a.lifetime_revenue_cents)
            .then_with(|| a.user_id.cmp(&b.user_id))
    });
    rows.truncate(limit);
    rows
}

// =============================================================================
// Day-of-Week View
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeekdayRow {
    pub day_of_week: String,
    pub total_orders: u64,
    pub total_revenue_cents: i64,
    pub unique_customers: u64,
}

fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// Per-weekday metrics in Monday-first calendar order
pub fn weekday_view(records: &[CleanRecord]) -> Vec<WeekdayRow> {
    group_by(records, |r| r.order_date.weekday().num_days_from_monday())
        .into_iter()
        .map(|(day_index, acc)| {
            let weekday = match day_index {
                0 => Weekday::Mon,
                1 => Weekday::Tue,
                2 => Weekday::Wed,
                3 => Weekday::Thu,
                4 => Weekday::Fri,
                5 => Weekday::Sat,
                _ => Weekday::Sun,
            };
            WeekdayRow {
                day_of_week: weekday_name(weekday).to_string(),
                total_orders: acc.orders,
                total_revenue_cents: acc.revenue_i64(),
                unique_customers: acc.users.len() as u64,
            }
        })
        .collect()
}

// =============================================================================
// Overview View
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverviewRow {
    pub total_orders: u64,
    pub total_revenue_cents: i64,
    pub avg_order_value_cents: i64,
    pub unique_customers: u64,
    pub unique_categories: u64,
    pub first_order_date: Option<NaiveDate>,
    pub last_order_date: Option<NaiveDate>,
}

/// Single-row headline totals across the whole clean dataset
pub fn overview_view(records: &[CleanRecord]) -> OverviewRow {
    let mut users: HashSet<u64> = HashSet::new();
    let mut categories: HashSet<&str> = HashSet::new();
    let mut revenue: i128 = 0;
    let mut first: Option<NaiveDate> = None;
    let mut last: Option<NaiveDate> = None;

    for record in records {
        users.insert(record.user_id);
        categories.insert(record.category.as_str());
        revenue += record.total_cents as i128;
        first = Some(first.map_or(record.order_date, |d| d.min(record.order_date)));
        last = Some(last.map_or(record.order_date, |d| d.max(record.order_date)));
    }

    OverviewRow {
        total_orders: records.len() as u64,
        total_revenue_cents: revenue as i64,
        avg_order_value_cents: average_cents(revenue, records.len() as u64),
        unique_customers: users.len() as u64,
        unique_categories: categories.len() as u64,
        first_order_date: first,
        last_order_date: last,
    }
}
