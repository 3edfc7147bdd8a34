use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Backend ids are integers (MySQL auto-increment); locally generated ones are strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Text(String),
}

impl Default for RecordId {
    fn default() -> Self {
        RecordId::Text(String::new())
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Int(n) => write!(f, "{n}"),
            RecordId::Text(s) => f.write_str(s),
        }
    }
}

impl FromStr for RecordId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Ok(match s.parse::<i64>() {
            Ok(n) => RecordId::Int(n),
            Err(_) => RecordId::Text(s.to_string()),
        })
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(from = "String", into = "String")]
pub enum Category {
    Food,
    Transport,
    Shopping,
    Utilities,
    Entertainment,
    Housing,
    Investment,
    #[default]
    Other,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Food,
        Category::Transport,
        Category::Shopping,
        Category::Utilities,
        Category::Entertainment,
        Category::Housing,
        Category::Investment,
        Category::Other,
    ];

    /// Wire label used by the backend.
    pub fn label(self) -> &'static str {
        match self {
            Category::Food => "Ăn uống",
            Category::Transport => "Di chuyển",
            Category::Shopping => "Mua sắm",
            Category::Utilities => "Tiện ích",
            Category::Entertainment => "Giải trí",
            Category::Housing => "Nhà ở",
            Category::Investment => "Đầu tư",
            Category::Other => "Khác",
        }
    }

    pub fn alias(self) -> &'static str {
        match self {
            Category::Food => "food",
            Category::Transport => "transport",
            Category::Shopping => "shopping",
            Category::Utilities => "utilities",
            Category::Entertainment => "entertainment",
            Category::Housing => "housing",
            Category::Investment => "investment",
            Category::Other => "other",
        }
    }

    /// Accepts either the wire label or the English alias, case-insensitively.
    pub fn parse(raw: &str) -> Option<Category> {
        let needle = raw.trim().to_lowercase();
        Category::ALL
            .into_iter()
            .find(|c| c.label().to_lowercase() == needle || c.alias() == needle)
    }
}

impl From<String> for Category {
    fn from(value: String) -> Self {
        Category::parse(&value).unwrap_or(Category::Other)
    }
}

impl From<Category> for String {
    fn from(value: Category) -> Self {
        value.label().to_string()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Income,
    #[default]
    Expense,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::Income => f.write_str("income"),
            EntryKind::Expense => f.write_str("expense"),
        }
    }
}

/// Older rows have no `type` (or `null`); those count as expenses.
fn kind_or_expense<'de, D>(deserializer: D) -> Result<EntryKind, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(match raw.as_deref().map(str::trim) {
        Some(s) if s.eq_ignore_ascii_case("income") => EntryKind::Income,
        _ => EntryKind::Expense,
    })
}

/// Columns filled by the ingestion webhook may hold SQL NULL; a null reads as
/// the type's default so one bad row never sinks the whole list.
fn or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    #[serde(default, deserialize_with = "or_default")]
    pub id: RecordId,
    /// ISO-8601 as sent by the backend; parsed lazily so a bad date only drops this entry.
    #[serde(default, deserialize_with = "or_default")]
    pub date: String,
    #[serde(
        default,
        deserialize_with = "or_default",
        serialize_with = "rust_decimal::serde::float::serialize"
    )]
    pub amount: Decimal,
    #[serde(rename = "type", default, deserialize_with = "kind_or_expense")]
    pub kind: EntryKind,
    #[serde(default, deserialize_with = "or_default")]
    pub category: Category,
    #[serde(default, deserialize_with = "or_default")]
    pub description: String,
    #[serde(default, deserialize_with = "or_default")]
    pub source: String,
    #[serde(
        default,
        deserialize_with = "or_default",
        skip_serializing_if = "std::ops::Not::not"
    )]
    pub is_anomaly: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anomaly_reason: Option<String>,
}

impl LedgerEntry {
    pub fn is_income(&self) -> bool {
        self.kind == EntryKind::Income
    }

    pub fn signed_amount(&self) -> Decimal {
        match self.kind {
            EntryKind::Income => self.amount,
            EntryKind::Expense => -self.amount,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NewTransaction {
    pub date: String,
    #[serde(serialize_with = "rust_decimal::serde::float::serialize")]
    pub amount: Decimal,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub category: Category,
    pub description: String,
    pub source: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetStatus {
    Ok,
    Warning,
    Over,
}

impl fmt::Display for BudgetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BudgetStatus::Ok => f.write_str("ok"),
            BudgetStatus::Warning => f.write_str("warning"),
            BudgetStatus::Over => f.write_str("over"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Budget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    #[serde(default, deserialize_with = "or_default")]
    pub category: Category,
    #[serde(
        default,
        alias = "limit_amount",
        deserialize_with = "or_default",
        serialize_with = "rust_decimal::serde::float::serialize"
    )]
    pub limit: Decimal,
    #[serde(
        default,
        deserialize_with = "or_default",
        serialize_with = "rust_decimal::serde::float::serialize"
    )]
    pub spent: Decimal,
}

impl Budget {
    pub fn usage_ratio(&self) -> Option<Decimal> {
        if self.limit.is_zero() {
            None
        } else {
            Some(self.spent / self.limit)
        }
    }

    pub fn status(&self) -> BudgetStatus {
        let Some(ratio) = self.usage_ratio() else {
            return if self.spent.is_zero() {
                BudgetStatus::Ok
            } else {
                BudgetStatus::Over
            };
        };
        if ratio >= Decimal::ONE {
            BudgetStatus::Over
        } else if ratio >= Decimal::new(8, 1) {
            BudgetStatus::Warning
        } else {
            BudgetStatus::Ok
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NewBudget {
    pub category: Category,
    #[serde(serialize_with = "rust_decimal::serde::float::serialize")]
    pub limit: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct BudgetLimitUpdate {
    #[serde(serialize_with = "rust_decimal::serde::float::serialize")]
    pub limit: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BillStatus {
    Paid,
    #[default]
    Pending,
    Overdue,
}

impl BillStatus {
    pub fn label(self) -> &'static str {
        match self {
            BillStatus::Paid => "Đã thanh toán",
            BillStatus::Pending => "Chờ thanh toán",
            BillStatus::Overdue => "Quá hạn",
        }
    }
}

impl From<String> for BillStatus {
    fn from(value: String) -> Self {
        let s = value.trim().to_lowercase();
        if s == BillStatus::Paid.label().to_lowercase() || s == "paid" {
            BillStatus::Paid
        } else if s == BillStatus::Overdue.label().to_lowercase() || s == "overdue" {
            BillStatus::Overdue
        } else {
            BillStatus::Pending
        }
    }
}

impl From<BillStatus> for String {
    fn from(value: BillStatus) -> Self {
        value.label().to_string()
    }
}

impl fmt::Display for BillStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bill {
    #[serde(default, deserialize_with = "or_default")]
    pub id: RecordId,
    #[serde(default, deserialize_with = "or_default")]
    pub name: String,
    #[serde(
        default,
        deserialize_with = "or_default",
        serialize_with = "rust_decimal::serde::float::serialize"
    )]
    pub amount: Decimal,
    #[serde(default, alias = "due_date", deserialize_with = "or_default")]
    pub due_date: String,
    #[serde(default, deserialize_with = "or_default")]
    pub status: BillStatus,
    #[serde(default, alias = "is_recurring", deserialize_with = "flag")]
    pub is_recurring: bool,
}

/// MySQL hands booleans back as TINYINT.
fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Bool(b) => b,
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        serde_json::Value::String(s) => matches!(s.trim(), "1" | "true" | "yes"),
        _ => false,
    })
}

impl Bill {
    pub fn is_paid(&self) -> bool {
        self.status == BillStatus::Paid
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBill {
    pub name: String,
    #[serde(serialize_with = "rust_decimal::serde::float::serialize")]
    pub amount: Decimal,
    pub due_date: String,
    pub status: BillStatus,
    pub is_recurring: bool,
}

/// One finding of the backend anomaly scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub transaction: Option<serde_json::Value>,
}

impl Anomaly {
    pub fn transaction_id(&self) -> Option<RecordId> {
        let id = self.transaction.as_ref()?.get("id")?;
        serde_json::from_value(id.clone()).ok()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnomalyScan {
    #[serde(default)]
    pub anomalies: Vec<Anomaly>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdvisorAnswer {
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub raw: serde_json::Value,
}

/// Whole đồng. `.` or `,` is accepted only as a thousands separator
/// (`1.200.000`, `1,200,000`); anything that looks like a fraction is rejected.
pub fn parse_amount(raw: &str, field: &'static str) -> anyhow::Result<Decimal> {
    let invalid = || {
        anyhow::anyhow!("Invalid {field}: '{raw}' (expected whole đồng, e.g. 1.200.000)")
    };
    let compact: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, '_' | ' '))
        .collect();
    if compact.starts_with('-') {
        anyhow::bail!("Invalid {field}: '{raw}' (must not be negative)");
    }

    let separator = match (compact.contains('.'), compact.contains(',')) {
        (true, true) => return Err(invalid()),
        (true, false) => Some('.'),
        (false, true) => Some(','),
        (false, false) => None,
    };
    let digits = match separator {
        None => compact,
        Some(sep) => {
            let mut groups = compact.split(sep);
            let head = groups.next().unwrap_or_default();
            if head.is_empty() || head.len() > 3 {
                return Err(invalid());
            }
            let mut joined = head.to_string();
            for group in groups {
                if group.len() != 3 {
                    return Err(invalid());
                }
                joined.push_str(group);
            }
            joined
        }
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    digits.parse::<Decimal>().map_err(|_| invalid())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entry_without_type_is_an_expense() {
        let e: LedgerEntry = serde_json::from_value(json!({
            "id": 7,
            "date": "2024-06-01",
            "amount": 450000,
            "category": "Ăn uống",
            "description": "Lunch",
            "source": "MoMo"
        }))
        .expect("decode");
        assert_eq!(e.kind, EntryKind::Expense);
        assert_eq!(e.id, RecordId::Int(7));
        assert_eq!(e.signed_amount(), Decimal::from(-450000));

        let e: LedgerEntry = serde_json::from_value(json!({
            "id": "x", "date": "2024-06-01", "amount": "12.50", "type": null, "category": "Khác"
        }))
        .expect("decode");
        assert_eq!(e.kind, EntryKind::Expense);
        assert_eq!(e.amount, Decimal::new(1250, 2));
    }

    #[test]
    fn unknown_category_maps_to_other() {
        let e: LedgerEntry = serde_json::from_value(json!({
            "date": "2024-06-01", "amount": 1, "type": "income", "category": "Hóa đơn"
        }))
        .expect("decode");
        assert_eq!(e.category, Category::Other);
        assert!(e.is_income());
        assert_eq!(Category::parse("FOOD"), Some(Category::Food));
        assert_eq!(Category::parse("Nhà ở"), Some(Category::Housing));
    }

    #[test]
    fn entry_serializes_with_wire_names() {
        let e = LedgerEntry {
            id: RecordId::Text("1".into()),
            date: "2024-06-01".into(),
            amount: Decimal::from(10),
            kind: EntryKind::Income,
            category: Category::Investment,
            description: "d".into(),
            source: "Ngân hàng".into(),
            is_anomaly: false,
            anomaly_reason: None,
        };
        let v = serde_json::to_value(&e).expect("encode");
        assert_eq!(v["type"], json!("income"));
        assert_eq!(v["category"], json!("Đầu tư"));
        assert_eq!(v["amount"], json!(10.0));
        assert!(v.get("isAnomaly").is_none());
    }

    #[test]
    fn budget_status_thresholds() {
        let mut b = Budget {
            id: None,
            category: Category::Food,
            limit: Decimal::from(100),
            spent: Decimal::from(79),
        };
        assert_eq!(b.status(), BudgetStatus::Ok);
        b.spent = Decimal::from(80);
        assert_eq!(b.status(), BudgetStatus::Warning);
        b.spent = Decimal::from(100);
        assert_eq!(b.status(), BudgetStatus::Over);
    }

    #[test]
    fn bill_status_accepts_labels_and_aliases() {
        let bill: Bill = serde_json::from_value(json!({
            "id": 3, "name": "FPT", "amount": 250000, "due_date": "2024-06-20",
            "status": "Đã thanh toán", "is_recurring": 1
        }))
        .expect("decode");
        assert!(bill.is_paid());
        assert!(bill.is_recurring);
        assert_eq!(bill.due_date, "2024-06-20");
        assert_eq!(BillStatus::from("overdue".to_string()), BillStatus::Overdue);
        assert_eq!(BillStatus::from("whatever".to_string()), BillStatus::Pending);
    }

    #[test]
    fn anomaly_links_to_transaction_id() {
        let scan: AnomalyScan = serde_json::from_value(json!({
            "status": "success",
            "anomalies": [
                {"type": "HIGH_VALUE", "message": "big", "transaction": {"id": 42}},
                {"type": "DUPLICATE", "message": "dup", "details": {}}
            ]
        }))
        .expect("decode");
        assert_eq!(scan.anomalies[0].transaction_id(), Some(RecordId::Int(42)));
        assert_eq!(scan.anomalies[1].transaction_id(), None);
    }

    #[test]
    fn parse_amount_strips_grouping() {
        assert_eq!(
            parse_amount("1.200.000", "amount").expect("amount"),
            Decimal::from(1_200_000)
        );
        assert_eq!(
            parse_amount("1,200,000", "amount").expect("amount"),
            Decimal::from(1_200_000)
        );
        assert_eq!(
            parse_amount(" 450 000 ", "amount").expect("amount"),
            Decimal::from(450_000)
        );
        assert_eq!(parse_amount("250000", "amount").expect("amount"), Decimal::from(250_000));
        assert!(parse_amount("-5", "amount").is_err());
        assert!(parse_amount("abc", "amount").is_err());
    }

    #[test]
    fn parse_amount_rejects_fractions() {
        for raw in ["12.5", "0.5", "1.20", "1.200.00", "1,200.000", ".500", "1.", ""] {
            let err = parse_amount(raw, "amount").expect_err(raw);
            assert!(err.to_string().starts_with("Invalid amount"), "{raw}: {err}");
        }
    }

    #[test]
    fn null_columns_do_not_sink_the_list() {
        let entries: Vec<LedgerEntry> = serde_json::from_value(json!([
            {"id": 1, "date": "2024-06-01", "amount": 450000, "type": "expense",
             "category": "Ăn uống", "description": "Lunch", "source": "MoMo"},
            {"id": 2, "date": "2024-06-02", "amount": null, "type": null,
             "category": null, "description": null, "source": null, "isAnomaly": null}
        ]))
        .expect("decode");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].description, "Lunch");
        let nulls = &entries[1];
        assert_eq!(nulls.amount, Decimal::ZERO);
        assert_eq!(nulls.category, Category::Other);
        assert_eq!(nulls.description, "");
        assert_eq!(nulls.source, "");
        assert!(!nulls.is_anomaly);

        let bills: Vec<Bill> = serde_json::from_value(json!([
            {"id": 3, "name": null, "amount": null, "dueDate": null,
             "status": null, "isRecurring": null}
        ]))
        .expect("decode");
        assert_eq!(bills[0].name, "");
        assert_eq!(bills[0].amount, Decimal::ZERO);
        assert_eq!(bills[0].status, BillStatus::Pending);
        assert!(!bills[0].is_recurring);

        let budgets: Vec<Budget> = serde_json::from_value(json!([
            {"id": 5, "category": null, "limit_amount": null, "spent": null}
        ]))
        .expect("decode");
        assert_eq!(budgets[0].category, Category::Other);
        assert_eq!(budgets[0].limit, Decimal::ZERO);
    }
}
