//! Derived dashboard metrics: monthly net flow, cumulative balance trend and
//! the top spending categories.
//!
//! Everything here is a pure function of the entries passed in.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

use crate::domain::{Category, LedgerEntry};

/// Most recent months kept in the trend.
pub const TREND_POINTS: usize = 12;
/// Categories kept in the spending ranking.
pub const TOP_CATEGORIES: usize = 5;

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthBucket {
    /// `YYYY-MM`, which sorts chronologically as a plain string.
    pub key: String,
    pub net_change: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrendPoint {
    pub label: String,
    pub cumulative_balance: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryTotal {
    pub category: Category,
    pub total: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DashboardMetrics {
    pub trend: Vec<TrendPoint>,
    pub top_categories: Vec<CategoryTotal>,
    pub total_income: Decimal,
    pub total_expense: Decimal,
    /// Entries left out of the trend because their date did not parse.
    pub undated: usize,
}

/// Calendar date of an entry in local time, or `None` if the string is not a
/// date we understand.
pub fn entry_local_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Local).date_naive());
    }
    // Flask's JSON encoder emits RFC 2822 ("Sat, 01 Jun 2024 00:00:00 GMT").
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Local).date_naive());
    }
    for fmt in NAIVE_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt.date());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

pub fn month_key(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

/// `2024-01` -> `Th1/24`.
pub fn month_label(key: &str) -> String {
    match NaiveDate::parse_from_str(&format!("{key}-01"), "%Y-%m-%d") {
        Ok(d) => d.format("Th%-m/%y").to_string(),
        Err(_) => key.to_string(),
    }
}

/// Net flow per calendar month, oldest first. Entries with an unparseable
/// date are skipped.
pub fn monthly_buckets(entries: &[LedgerEntry]) -> Vec<MonthBucket> {
    let mut totals: BTreeMap<String, Decimal> = BTreeMap::new();
    for entry in entries {
        let Some(date) = entry_local_date(&entry.date) else {
            log::warn!(
                "skipping entry {} with unparseable date '{}'",
                entry.id,
                entry.date
            );
            continue;
        };
        *totals.entry(month_key(date)).or_default() += entry.signed_amount();
    }

    totals
        .into_iter()
        .map(|(key, net_change)| MonthBucket { key, net_change })
        .collect()
}

/// Running balance over `buckets` (already chronological), keeping the last
/// [`TREND_POINTS`] points. Totals are accumulated over the whole history
/// before truncation.
pub fn cumulative_trend(buckets: &[MonthBucket]) -> Vec<TrendPoint> {
    let mut running = Decimal::ZERO;
    let mut points: Vec<TrendPoint> = buckets
        .iter()
        .map(|b| {
            running += b.net_change;
            TrendPoint {
                label: month_label(&b.key),
                cumulative_balance: running,
            }
        })
        .collect();

    let excess = points.len().saturating_sub(TREND_POINTS);
    points.drain(..excess);
    points
}

/// Expense totals per category, largest first, at most [`TOP_CATEGORIES`].
/// Ties keep the order in which categories were first seen.
pub fn top_spending_categories(entries: &[LedgerEntry]) -> Vec<CategoryTotal> {
    let mut totals: Vec<CategoryTotal> = Vec::new();
    for entry in entries.iter().filter(|e| !e.is_income()) {
        match totals.iter_mut().find(|t| t.category == entry.category) {
            Some(t) => t.total += entry.amount,
            None => totals.push(CategoryTotal {
                category: entry.category,
                total: entry.amount,
            }),
        }
    }

    // `sort_by` is stable.
    totals.sort_by(|a, b| b.total.cmp(&a.total));
    totals.truncate(TOP_CATEGORIES);
    totals
}

pub fn summarize(entries: &[LedgerEntry]) -> DashboardMetrics {
    let buckets = monthly_buckets(entries);
    let (total_income, total_expense) =
        entries
            .iter()
            .fold((Decimal::ZERO, Decimal::ZERO), |(inc, exp), e| {
                if e.is_income() {
                    (inc + e.amount, exp)
                } else {
                    (inc, exp + e.amount)
                }
            });

    DashboardMetrics {
        trend: cumulative_trend(&buckets),
        top_categories: top_spending_categories(entries),
        total_income,
        total_expense,
        undated: entries
            .iter()
            .filter(|e| entry_local_date(&e.date).is_none())
            .count(),
    }
}
