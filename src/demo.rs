//! Canned data shown when the backend is unreachable, plus the simulated
//! ingestion events (payment notifications, e-mailed bills).

use chrono::{DateTime, Datelike, Local};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::{
    Bill, BillStatus, Budget, Category, EntryKind, LedgerEntry, RecordId,
};

pub fn fallback_transactions() -> Vec<LedgerEntry> {
    vec![
        LedgerEntry {
            id: RecordId::Text("1".into()),
            date: "2024-06-01".into(),
            amount: Decimal::from(450_000),
            kind: EntryKind::Expense,
            category: Category::Food,
            description: "Ăn trưa tại Quán Ngon".into(),
            source: "MoMo".into(),
            is_anomaly: false,
            anomaly_reason: None,
        },
        LedgerEntry {
            id: RecordId::Text("2".into()),
            date: "2024-06-02".into(),
            amount: Decimal::from(1_200_000),
            kind: EntryKind::Expense,
            category: Category::Shopping,
            description: "Mua quần áo Uniqlo".into(),
            source: "Thẻ tín dụng".into(),
            is_anomaly: false,
            anomaly_reason: None,
        },
    ]
}

pub fn fallback_budgets() -> Vec<Budget> {
    [
        (Category::Food, 5_000_000, 3_200_000),
        (Category::Transport, 1_500_000, 400_000),
        (Category::Shopping, 3_000_000, 2_850_000),
    ]
    .into_iter()
    .map(|(category, limit, spent)| Budget {
        id: None,
        category,
        limit: Decimal::from(limit),
        spent: Decimal::from(spent),
    })
    .collect()
}

pub fn fallback_bills() -> Vec<Bill> {
    vec![Bill {
        id: RecordId::Text("101".into()),
        name: "Tiền mạng FPT".into(),
        amount: Decimal::from(250_000),
        due_date: "2024-06-20".into(),
        status: BillStatus::Pending,
        is_recurring: true,
    }]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SimulatedSource {
    /// MoMo e-wallet payment notification.
    Momo,
    /// Bank transfer notification.
    Bank,
    /// Utility bill received by e-mail.
    Bill,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SimulatedEvent {
    Transaction(LedgerEntry),
    Bill(Bill),
}

/// Deterministic pseudo-random number in `[0, modulo)` derived from the id.
fn spread(id: Uuid, modulo: u32) -> u32 {
    let b = id.as_bytes();
    u32::from_le_bytes([b[0], b[1], b[2], b[3]]) % modulo
}

fn short_id(id: Uuid) -> String {
    id.simple().to_string()[..9].to_string()
}

pub fn simulate(source: SimulatedSource, id: Uuid, now: DateTime<Local>) -> SimulatedEvent {
    match source {
        SimulatedSource::Momo => SimulatedEvent::Transaction(LedgerEntry {
            id: RecordId::Text(short_id(id)),
            date: now.to_rfc3339(),
            amount: Decimal::from(spread(id, 500_000) + 50_000),
            kind: EntryKind::Expense,
            category: Category::Food,
            description: format!(
                "Thanh toán MoMo tại HIGHLANDS COFFEE #{}",
                spread(id, 1_000)
            ),
            source: "MoMo".into(),
            is_anomaly: false,
            anomaly_reason: None,
        }),
        SimulatedSource::Bank => SimulatedEvent::Transaction(LedgerEntry {
            id: RecordId::Text(short_id(id)),
            date: now.to_rfc3339(),
            amount: Decimal::from(spread(id, 2_000_000) + 100_000),
            kind: EntryKind::Expense,
            category: Category::Shopping,
            description: "GD: 00123-9992 - Chuyển khoản nội bộ VCB".into(),
            source: "Ngân hàng".into(),
            is_anomaly: false,
            anomaly_reason: None,
        }),
        SimulatedSource::Bill => SimulatedEvent::Bill(Bill {
            id: RecordId::Text(short_id(id)),
            name: format!("Hóa đơn Điện tháng {}", now.month()),
            amount: Decimal::from(850_000),
            due_date: now.format("%Y-%m-%d").to_string(),
            status: BillStatus::Pending,
            is_recurring: true,
        }),
    }
}
