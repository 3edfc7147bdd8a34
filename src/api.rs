use reqwest::Method;
use reqwest::blocking::{Client, Response};
use rust_decimal::Decimal;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;

use crate::domain::{
    AdvisorAnswer, Anomaly, AnomalyScan, Bill, Budget, BudgetLimitUpdate, LedgerEntry, NewBill,
    NewBudget, NewTransaction, RecordId,
};

const USER_AGENT: &str = concat!("finwise/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("{url} returned HTTP {status}: {message}")]
    Status {
        url: String,
        status: u16,
        message: String,
    },

    #[error("invalid response from {url}: {message}")]
    Decode { url: String, message: String },
}

/// The REST surface of the FinWise backend.
pub trait Backend: Sync {
    fn transactions(&self) -> Result<Vec<LedgerEntry>, ApiError>;
    fn budgets(&self) -> Result<Vec<Budget>, ApiError>;
    fn bills(&self) -> Result<Vec<Bill>, ApiError>;

    fn create_transaction(&self, tx: &NewTransaction) -> Result<(), ApiError>;
    fn create_budget(&self, budget: &NewBudget) -> Result<(), ApiError>;
    fn update_budget_limit(&self, id: &RecordId, limit: Decimal) -> Result<(), ApiError>;
    fn create_bill(&self, bill: &NewBill) -> Result<(), ApiError>;
    fn pay_bill(&self, id: &RecordId) -> Result<(), ApiError>;

    fn scan_anomalies(&self) -> Result<Vec<Anomaly>, ApiError>;
    fn forecast(&self) -> Result<serde_json::Value, ApiError>;
    fn risk_assessment(&self) -> Result<serde_json::Value, ApiError>;
    fn ask_advisor(&self, question: &str, user_id: &str) -> Result<AdvisorAnswer, ApiError>;
}

pub struct HttpBackend {
    client: Client,
    base: String,
}

impl HttpBackend {
    pub fn new(base: &str, timeout: Option<Duration>) -> Result<Self, ApiError> {
        let mut builder = Client::builder().user_agent(USER_AGENT);
        if let Some(t) = timeout {
            builder = builder.timeout(t);
        }
        let client = builder.build().map_err(|e| ApiError::Transport {
            url: base.to_string(),
            message: format!("failed to build HTTP client: {e}"),
        })?;
        Ok(Self {
            client,
            base: base.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }

    fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<(String, Response), ApiError> {
        let url = self.url(path);
        log::debug!("{method} {url}");

        let mut req = self
            .client
            .request(method, &url)
            .header("Accept", "application/json");
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req.send().map_err(|e| ApiError::Transport {
            url: url.clone(),
            message: e.to_string(),
        })?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().unwrap_or_default();
            return Err(ApiError::Status {
                url,
                status,
                message: error_message(&text),
            });
        }
        Ok((url, resp))
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let (url, resp) = self.send::<()>(Method::GET, path, None)?;
        decode(&url, resp)
    }

    fn write<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<(), ApiError> {
        self.send(method, path, body).map(|_| ())
    }
}

fn decode<T: DeserializeOwned>(url: &str, resp: Response) -> Result<T, ApiError> {
    let text = resp.text().map_err(|e| ApiError::Transport {
        url: url.to_string(),
        message: e.to_string(),
    })?;
    serde_json::from_str(&text).map_err(|e| ApiError::Decode {
        url: url.to_string(),
        message: e.to_string(),
    })
}

/// Pulls `message` / `error` out of a JSON error body, else returns the body itself.
pub fn error_message(body: &str) -> String {
    let body = body.trim();
    if let Ok(v) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["message", "error"] {
            if let Some(s) = v.get(key).and_then(|m| m.as_str()) {
                return s.to_string();
            }
        }
    }
    if body.is_empty() {
        "(empty body)".to_string()
    } else {
        body.chars().take(200).collect()
    }
}

impl Backend for HttpBackend {
    fn transactions(&self) -> Result<Vec<LedgerEntry>, ApiError> {
        self.get_json("transactions")
    }

    fn budgets(&self) -> Result<Vec<Budget>, ApiError> {
        self.get_json("budgets")
    }

    fn bills(&self) -> Result<Vec<Bill>, ApiError> {
        self.get_json("bills")
    }

    fn create_transaction(&self, tx: &NewTransaction) -> Result<(), ApiError> {
        self.write(Method::POST, "transactions", Some(tx))
    }

    fn create_budget(&self, budget: &NewBudget) -> Result<(), ApiError> {
        self.write(Method::POST, "budgets", Some(budget))
    }

    fn update_budget_limit(&self, id: &RecordId, limit: Decimal) -> Result<(), ApiError> {
        self.write(
            Method::PUT,
            &format!("budgets/{id}"),
            Some(&BudgetLimitUpdate { limit }),
        )
    }

    fn create_bill(&self, bill: &NewBill) -> Result<(), ApiError> {
        self.write(Method::POST, "bills", Some(bill))
    }

    fn pay_bill(&self, id: &RecordId) -> Result<(), ApiError> {
        self.write::<()>(Method::POST, &format!("bills/{id}/pay"), None)
    }

    fn scan_anomalies(&self) -> Result<Vec<Anomaly>, ApiError> {
        let scan: AnomalyScan = self.get_json("scan-anomalies")?;
        Ok(scan.anomalies)
    }

    fn forecast(&self) -> Result<serde_json::Value, ApiError> {
        self.get_json("forecast")
    }

    fn risk_assessment(&self) -> Result<serde_json::Value, ApiError> {
        self.get_json("risk-assessment")
    }

    fn ask_advisor(&self, question: &str, user_id: &str) -> Result<AdvisorAnswer, ApiError> {
        let body = serde_json::json!({ "question": question, "user_id": user_id });
        let (url, resp) = self.send(Method::POST, "ai/advisor", Some(&body))?;
        decode(&url, resp)
    }
}
