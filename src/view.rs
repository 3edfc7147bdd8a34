//! Display-level helpers: filtering, partitioning, and bar rendering. No
//! aggregation lives here.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::domain::{Bill, Budget, LedgerEntry};

/// Case-insensitive substring match on description or category label.
pub fn search<'a>(entries: &'a [LedgerEntry], term: &str) -> Vec<&'a LedgerEntry> {
    let needle = term.trim().to_lowercase();
    entries
        .iter()
        .filter(|e| {
            needle.is_empty()
                || e.description.to_lowercase().contains(&needle)
                || e.category.label().to_lowercase().contains(&needle)
                || e.category.alias().contains(&needle)
        })
        .collect()
}

/// `(pending, paid)`; overdue bills count as pending.
pub fn partition_bills(bills: &[Bill]) -> (Vec<&Bill>, Vec<&Bill>) {
    let (paid, pending): (Vec<&Bill>, Vec<&Bill>) = bills.iter().partition(|b| b.is_paid());
    (pending, paid)
}

pub fn budget_transactions<'a>(budget: &Budget, entries: &'a [LedgerEntry]) -> Vec<&'a LedgerEntry> {
    entries
        .iter()
        .filter(|e| e.category == budget.category)
        .collect()
}

/// Amount without trailing zeros (`450000`, `12.5`).
pub fn money(amount: Decimal) -> String {
    amount.normalize().to_string()
}

pub fn percent(ratio: Option<Decimal>) -> String {
    match ratio {
        Some(r) => format!("{}%", (r * Decimal::ONE_HUNDRED).round_dp(0)),
        None => "-".to_string(),
    }
}

/// Bar of `width` cells scaled against `max`.
pub fn bar(value: Decimal, max: Decimal, width: usize) -> String {
    if max <= Decimal::ZERO || value <= Decimal::ZERO {
        return String::new();
    }
    let filled = (value / max * Decimal::from(width))
        .round()
        .to_usize()
        .unwrap_or(0)
        .min(width);
    "#".repeat(filled.max(1))
}

pub fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo;
    use crate::domain::{BillStatus, Category};

    #[test]
    fn search_matches_description_and_category() {
        let entries = demo::fallback_transactions();
        assert_eq!(search(&entries, "uniqlo").len(), 1);
        assert_eq!(search(&entries, "ĂN UỐNG").len(), 1);
        assert_eq!(search(&entries, "shopping").len(), 1);
        assert_eq!(search(&entries, "").len(), 2);
        assert!(search(&entries, "xyz").is_empty());
    }

    #[test]
    fn bills_split_into_pending_and_paid() {
        let mut bills = demo::fallback_bills();
        let mut paid = bills[0].clone();
        paid.status = BillStatus::Paid;
        let mut overdue = bills[0].clone();
        overdue.status = BillStatus::Overdue;
        bills.push(paid);
        bills.push(overdue);

        let (pending, paid) = partition_bills(&bills);
        assert_eq!(pending.len(), 2);
        assert_eq!(paid.len(), 1);
    }

    #[test]
    fn budget_detail_filters_by_category() {
        let entries = demo::fallback_transactions();
        let budgets = demo::fallback_budgets();
        let food = budgets
            .iter()
            .find(|b| b.category == Category::Food)
            .expect("food budget");
        assert_eq!(budget_transactions(food, &entries).len(), 1);
    }

    #[test]
    fn bars_and_percentages() {
        assert_eq!(bar(Decimal::from(50), Decimal::from(100), 20), "#".repeat(10));
        assert_eq!(bar(Decimal::from(1), Decimal::from(1000), 20), "#");
        assert_eq!(bar(Decimal::ZERO, Decimal::from(10), 20), "");
        assert_eq!(percent(Some(Decimal::new(95, 2))), "95%");
        assert_eq!(percent(None), "-");
    }
}
