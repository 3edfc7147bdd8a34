use anyhow::{Context, Result};
use regex::Regex;
use reqwest::blocking::Client;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

use crate::api::{ApiError, error_message};
use crate::domain::{Budget, LedgerEntry};

const ADVICE_CONTEXT: usize = 15;
const ANALYSIS_CONTEXT: usize = 50;

pub const GREETING: &str = "Hello! I am the FinWise financial advisor. I can see your transactions and budgets. What would you like me to look at today?";

#[derive(Debug, Error)]
pub enum AdvisorError {
    #[error("AI service API key is not configured (set FINWISE_AI_API_KEY)")]
    MissingApiKey,

    #[error("a request is already in flight")]
    Busy,

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Something that answers a free-text query given JSON context.
pub trait ChatService {
    fn ask(&self, query: &str, inputs: &Value, user: &str) -> Result<String, AdvisorError>;
}

/// Blocking client for the `/chat-messages` endpoint of the AI service.
pub struct AiClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl AiClient {
    pub fn new(
        base_url: &str,
        api_key: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<Self, AdvisorError> {
        let api_key = api_key
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(AdvisorError::MissingApiKey)?;

        let mut builder = Client::builder();
        if let Some(t) = timeout {
            builder = builder.timeout(t);
        }
        let client = builder.build().map_err(|e| ApiError::Transport {
            url: base_url.to_string(),
            message: format!("failed to build HTTP client: {e}"),
        })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    answer: String,
}

impl ChatService for AiClient {
    fn ask(&self, query: &str, inputs: &Value, user: &str) -> Result<String, AdvisorError> {
        let url = format!("{}/chat-messages", self.base_url);
        log::debug!("POST {url} (user {user})");

        let body = json!({
            "inputs": inputs,
            "query": query,
            "user": user,
            "response_mode": "blocking",
        });
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| ApiError::Transport {
                url: url.clone(),
                message: e.to_string(),
            })?;

        let status = resp.status();
        let text = resp.text().map_err(|e| ApiError::Transport {
            url: url.clone(),
            message: e.to_string(),
        })?;
        if !status.is_success() {
            return Err(ApiError::Status {
                url,
                status: status.as_u16(),
                message: error_message(&text),
            }
            .into());
        }

        let parsed: ChatResponse = serde_json::from_str(&text).map_err(|e| ApiError::Decode {
            url,
            message: e.to_string(),
        })?;
        Ok(parsed.answer)
    }
}

/// An AI answer is prose that may or may not carry a JSON object.
#[derive(Debug, Clone, PartialEq)]
pub enum AiReply {
    Structured(Value),
    Unstructured(String),
}

impl AiReply {
    pub fn classify(text: &str) -> Self {
        match extract_json(text) {
            Some(v) => AiReply::Structured(v),
            None => AiReply::Unstructured(text.to_string()),
        }
    }

    /// Decodes the structured payload into `T`; anything else yields `None`.
    pub fn decode<T: DeserializeOwned>(&self) -> Option<T> {
        match self {
            AiReply::Structured(v) => serde_json::from_value(v.clone()).ok(),
            AiReply::Unstructured(_) => None,
        }
    }

    pub fn decode_or_default<T: DeserializeOwned + Default>(&self) -> T {
        self.decode().unwrap_or_default()
    }
}

fn json_block() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\{.*\}").expect("static regex"))
}

/// Best-effort: the span from the first `{` to the last `}`, else the whole
/// text, parsed as a JSON object.
pub fn extract_json(text: &str) -> Option<Value> {
    let candidate = json_block().find(text).map(|m| m.as_str()).unwrap_or(text);
    match serde_json::from_str::<Value>(candidate.trim()) {
        Ok(v) if v.is_object() => Some(v),
        _ => {
            log::debug!("AI answer carries no JSON object");
            None
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetSuggestion {
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub suggested_limit: Decimal,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BudgetSuggestions {
    #[serde(default)]
    pub suggestions: Vec<BudgetSuggestion>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    #[serde(default)]
    pub month: String,
    #[serde(default)]
    pub projected_expense: Decimal,
    #[serde(default)]
    pub projected_balance: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendingForecast {
    #[serde(default)]
    pub predictions: Vec<Prediction>,
    #[serde(default)]
    pub risk_factors: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub forecast_balance: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedBill {
    pub name: String,
    pub amount: Decimal,
    #[serde(default)]
    pub due_date: String,
    #[serde(default)]
    pub is_recurring: bool,
}

fn head(entries: &[LedgerEntry], n: usize) -> &[LedgerEntry] {
    &entries[..entries.len().min(n)]
}

pub fn financial_advice(
    ai: &impl ChatService,
    user: &str,
    entries: &[LedgerEntry],
    budgets: &[Budget],
) -> Result<String, AdvisorError> {
    let query = format!(
        "Transactions: {}.\nBudget limits: {}.\nGive three short, practical pieces of financial advice.",
        json!(head(entries, ADVICE_CONTEXT)),
        json!(budgets),
    );
    ai.ask(&query, &json!({}), user)
}

pub fn suggest_budgets(
    ai: &impl ChatService,
    user: &str,
    entries: &[LedgerEntry],
    monthly_income: Decimal,
) -> Result<BudgetSuggestions, AdvisorError> {
    let income = if monthly_income > Decimal::ZERO {
        format!("{}K VND", (monthly_income / Decimal::from(1000)).round_dp(0))
    } else {
        "unknown".to_string()
    };
    let compact: Vec<Value> = head(entries, ANALYSIS_CONTEXT)
        .iter()
        .map(|e| json!({ "c": e.category, "a": e.amount, "d": e.date }))
        .collect();
    let query = format!(
        "My total monthly income is {income}.\n\
         Recent spending (at most {ANALYSIS_CONTEXT} transactions): {}.\n\
         Suggest a sensible limit per category so that the total stays below income with at least 20% saved.\n\
         Reply with JSON: {{\"suggestions\": [{{\"category\": \"...\", \"suggestedLimit\": 0, \"reason\": \"...\"}}]}}",
        Value::Array(compact),
    );
    let answer = ai.ask(&query, &json!({}), user)?;
    Ok(AiReply::classify(&answer).decode_or_default())
}

pub fn forecast_spending(
    ai: &impl ChatService,
    user: &str,
    entries: &[LedgerEntry],
) -> Result<SpendingForecast, AdvisorError> {
    let query = format!(
        "Forecast spending for the next 3 months from these transactions (at most {ANALYSIS_CONTEXT}): {}.\n\
         Reply with JSON: {{\"predictions\": [{{\"month\": \"...\", \"projectedExpense\": 0, \"projectedBalance\": 0}}], \"riskFactors\": [], \"recommendations\": [], \"forecastBalance\": 0}}",
        json!(head(entries, ANALYSIS_CONTEXT)),
    );
    let answer = ai.ask(&query, &json!({}), user)?;
    Ok(AiReply::classify(&answer).decode_or_default())
}

pub fn extract_bill(
    ai: &impl ChatService,
    user: &str,
    email_text: &str,
) -> Result<AiReply, AdvisorError> {
    let query = format!(
        "Extract the bill from this text: \"{email_text}\".\n\
         Reply with JSON: {{\"name\": \"...\", \"amount\": 0, \"dueDate\": \"YYYY-MM-DD\", \"isRecurring\": true}}"
    );
    let answer = ai.ask(&query, &json!({}), user)?;
    Ok(AiReply::classify(&answer))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Ai,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// Append-only conversation with the advisor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTranscript {
    messages: Vec<ChatMessage>,
    /// Set only for the duration of one `send`; it guards a single invocation
    /// against re-entry and is never persisted.
    #[serde(skip)]
    in_flight: bool,
}

impl Default for ChatTranscript {
    fn default() -> Self {
        Self {
            messages: vec![ChatMessage {
                role: Role::Ai,
                content: GREETING.to_string(),
            }],
            in_flight: false,
        }
    }
}

impl ChatTranscript {
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Sends `input` with the recent entries and budgets as context. Service
    /// errors become an advisor message rather than an error; blank input is
    /// ignored and returns `Ok(None)`.
    pub fn send(
        &mut self,
        ai: &impl ChatService,
        user: &str,
        input: &str,
        entries: &[LedgerEntry],
        budgets: &[Budget],
    ) -> Result<Option<&ChatMessage>, AdvisorError> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(None);
        }
        if self.in_flight {
            return Err(AdvisorError::Busy);
        }

        self.messages.push(ChatMessage {
            role: Role::User,
            content: input.to_string(),
        });
        self.in_flight = true;

        let inputs = json!({
            "transactions": head(entries, ANALYSIS_CONTEXT),
            "budgets": budgets,
        });
        let content = match ai.ask(input, &inputs, user) {
            Ok(answer) => answer,
            Err(err) => format!("AI advisor error: {err}"),
        };
        self.messages.push(ChatMessage {
            role: Role::Ai,
            content,
        });
        self.in_flight = false;

        Ok(self.messages.last())
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw =
            fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Category, EntryKind, RecordId};
    use std::cell::RefCell;

    struct Scripted {
        reply: Result<String, ()>,
        seen: RefCell<Vec<(String, Value)>>,
    }

    impl Scripted {
        fn answering(text: &str) -> Self {
            Self {
                reply: Ok(text.to_string()),
                seen: RefCell::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                reply: Err(()),
                seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl ChatService for Scripted {
        fn ask(&self, query: &str, inputs: &Value, _user: &str) -> Result<String, AdvisorError> {
            self.seen
                .borrow_mut()
                .push((query.to_string(), inputs.clone()));
            self.reply.clone().map_err(|_| {
                AdvisorError::Api(ApiError::Status {
                    url: "http://ai/chat-messages".into(),
                    status: 401,
                    message: "invalid key".into(),
                })
            })
        }
    }

    fn entries(n: usize) -> Vec<LedgerEntry> {
        (0..n)
            .map(|i| LedgerEntry {
                id: RecordId::Int(i as i64),
                date: "2024-06-01".into(),
                amount: Decimal::from(1000),
                kind: EntryKind::Expense,
                category: Category::Food,
                description: format!("e{i}"),
                source: "MoMo".into(),
                is_anomaly: false,
                anomaly_reason: None,
            })
            .collect()
    }

    #[test]
    fn extracts_json_embedded_in_prose() {
        let text = "Sure! Here it is:\n```json\n{\"suggestions\": [{\"category\": \"Ăn uống\", \"suggestedLimit\": 4000000, \"reason\": \"cut\"}]}\n```\nGood luck.";
        let reply = AiReply::classify(text);
        assert!(matches!(reply, AiReply::Structured(_)));
        let s: BudgetSuggestions = reply.decode_or_default();
        assert_eq!(s.suggestions.len(), 1);
        assert_eq!(s.suggestions[0].suggested_limit, Decimal::from(4_000_000));
    }

    #[test]
    fn plain_or_broken_text_is_unstructured() {
        assert_eq!(
            AiReply::classify("Spend less on coffee."),
            AiReply::Unstructured("Spend less on coffee.".into())
        );
        assert!(extract_json("{ not json }").is_none());
        assert!(extract_json("[1, 2]").is_none());
        let f: SpendingForecast = AiReply::classify("{oops").decode_or_default();
        assert_eq!(f, SpendingForecast::default());
    }

    #[test]
    fn forecast_falls_back_to_empty_structure() {
        let ai = Scripted::answering("I cannot forecast that.");
        let f = forecast_spending(&ai, "u", &entries(3)).expect("no error");
        assert!(f.predictions.is_empty());
        assert_eq!(f.forecast_balance, Decimal::ZERO);
    }

    #[test]
    fn bill_extraction_returns_none_on_prose() {
        let ai = Scripted::answering("No bill found.");
        let reply = extract_bill(&ai, "u", "hello").expect("ok");
        assert_eq!(reply.decode::<ExtractedBill>(), None);

        let ai = Scripted::answering(
            r#"{"name": "FPT Telecom", "amount": 350000, "dueDate": "2024-06-20", "isRecurring": true}"#,
        );
        let bill: ExtractedBill = extract_bill(&ai, "u", "mail")
            .expect("ok")
            .decode()
            .expect("bill");
        assert_eq!(bill.name, "FPT Telecom");
        assert_eq!(bill.amount, Decimal::from(350_000));
    }

    #[test]
    fn advice_sends_at_most_fifteen_entries() {
        let ai = Scripted::answering("1. Save more.");
        let advice = financial_advice(&ai, "u", &entries(40), &[]).expect("advice");
        assert_eq!(advice, "1. Save more.");
        let seen = ai.seen.borrow();
        assert!(seen[0].0.contains("\"e14\""));
        assert!(!seen[0].0.contains("\"e15\""));
    }

    #[test]
    fn chat_appends_and_converts_errors_to_messages() {
        let mut chat = ChatTranscript::default();
        assert_eq!(chat.messages().len(), 1);

        let ai = Scripted::answering("Cut shopping by 10%.");
        let reply = chat
            .send(&ai, "u", "How do I save?", &entries(60), &[])
            .expect("send")
            .expect("reply");
        assert_eq!(reply.role, Role::Ai);
        assert_eq!(chat.messages().len(), 3);
        assert!(!chat.in_flight);
        {
            let seen = ai.seen.borrow();
            let inputs = &seen[0].1;
            assert_eq!(inputs["transactions"].as_array().map(Vec::len), Some(50));
        }

        let failing = Scripted::failing();
        let reply = chat
            .send(&failing, "u", "Again?", &[], &[])
            .expect("send")
            .expect("reply");
        assert!(reply.content.starts_with("AI advisor error"));
        assert_eq!(chat.messages().len(), 5);

        assert!(chat.send(&ai, "u", "   ", &[], &[]).expect("blank").is_none());
        assert_eq!(chat.messages().len(), 5);
    }

    #[test]
    fn busy_transcript_rejects_second_send() {
        let mut chat = ChatTranscript {
            in_flight: true,
            ..ChatTranscript::default()
        };
        let ai = Scripted::answering("x");
        assert!(matches!(
            chat.send(&ai, "u", "hi", &[], &[]),
            Err(AdvisorError::Busy)
        ));
        assert_eq!(chat.messages().len(), 1);
    }

    #[test]
    fn missing_key_is_reported() {
        assert!(matches!(
            AiClient::new("https://ai.local/v1", None, None),
            Err(AdvisorError::MissingApiKey)
        ));
        assert!(matches!(
            AiClient::new("https://ai.local/v1", Some("  "), None),
            Err(AdvisorError::MissingApiKey)
        ));
    }

    #[test]
    fn transcript_persists() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("chat.json");
        let mut chat = ChatTranscript::load(&path).expect("load missing");
        let ai = Scripted::answering("ok");
        chat.send(&ai, "u", "hi", &[], &[]).expect("send");
        chat.save(&path).expect("save");
        assert_eq!(ChatTranscript::load(&path).expect("load"), chat);
    }
}
