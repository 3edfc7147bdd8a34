//! Session-scoped owner of transactions, budgets and bills.
//!
//! Reads: the three collections are fetched together. If the transactions read
//! fails, every collection is replaced by demo data (unless the fallback is
//! disabled). Otherwise budgets and bills are only replaced when their own read
//! succeeded.
//!
//! Writes: the request is sent once; on success the full read is repeated, on
//! failure the state is left untouched and the error is returned.

use rust_decimal::Decimal;
use std::thread;
use thiserror::Error;

use crate::activity::ActivityLog;
use crate::api::{ApiError, Backend};
use crate::demo::{self, SimulatedEvent};
use crate::domain::{Anomaly, Bill, Budget, LedgerEntry, NewBill, NewBudget, NewTransaction, RecordId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackPolicy {
    /// Install demo data when the backend is unreachable.
    Demo,
    /// Treat an unreachable backend as an error.
    Strict,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DashboardState {
    pub transactions: Vec<LedgerEntry>,
    pub budgets: Vec<Budget>,
    pub bills: Vec<Bill>,
}

#[derive(Debug)]
pub enum SyncOutcome {
    Live {
        budgets_applied: bool,
        bills_applied: bool,
    },
    /// Demo data is showing; `reason` is why the primary read failed.
    Fallback { reason: ApiError },
    /// A write went through but the refetch after it failed; the previous
    /// state is still showing.
    Stale { reason: ApiError },
}

impl SyncOutcome {
    pub fn is_live(&self) -> bool {
        matches!(self, SyncOutcome::Live { .. })
    }
}

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("backend unavailable and demo fallback is disabled: {0}")]
    Offline(#[source] ApiError),

    #[error("{action} failed: {source}")]
    Write {
        action: &'static str,
        #[source]
        source: ApiError,
    },
}

pub struct Coordinator<B> {
    backend: B,
    policy: FallbackPolicy,
    state: DashboardState,
    log: ActivityLog,
}

fn joined<T>(
    handle: thread::ScopedJoinHandle<'_, Result<T, ApiError>>,
    what: &str,
) -> Result<T, ApiError> {
    handle.join().unwrap_or_else(|_| {
        Err(ApiError::Transport {
            url: what.to_string(),
            message: "request worker panicked".to_string(),
        })
    })
}

impl<B: Backend> Coordinator<B> {
    pub fn new(backend: B, policy: FallbackPolicy, log: ActivityLog) -> Self {
        Self {
            backend,
            policy,
            state: DashboardState::default(),
            log,
        }
    }

    pub fn state(&self) -> &DashboardState {
        &self.state
    }

    pub fn log(&self) -> &ActivityLog {
        &self.log
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn refresh(&mut self) -> Result<SyncOutcome, CoordinatorError> {
        self.log.push("Connecting to backend...");

        let backend = &self.backend;
        let (transactions, budgets, bills) = thread::scope(|s| {
            let budgets = s.spawn(|| backend.budgets());
            let bills = s.spawn(|| backend.bills());
            let transactions = backend.transactions();
            (
                transactions,
                joined(budgets, "budgets"),
                joined(bills, "bills"),
            )
        });

        let transactions = match transactions {
            Ok(t) => t,
            Err(err) => return self.apply_fallback(err),
        };

        self.state.transactions = transactions;
        let budgets_applied = match budgets {
            Ok(b) => {
                self.state.budgets = b;
                true
            }
            Err(err) => {
                log::warn!("keeping previous budgets: {err}");
                false
            }
        };
        let bills_applied = match bills {
            Ok(b) => {
                self.state.bills = b;
                true
            }
            Err(err) => {
                log::warn!("keeping previous bills: {err}");
                false
            }
        };

        log::info!(
            "synced {} transactions (budgets: {budgets_applied}, bills: {bills_applied})",
            self.state.transactions.len()
        );
        self.log.push("Backend sync succeeded.");
        Ok(SyncOutcome::Live {
            budgets_applied,
            bills_applied,
        })
    }

    fn apply_fallback(&mut self, err: ApiError) -> Result<SyncOutcome, CoordinatorError> {
        match self.policy {
            FallbackPolicy::Demo => {
                log::warn!("backend unreachable, using demo data: {err}");
                self.log.push("Backend offline - using local demo data.");
                self.state = DashboardState {
                    transactions: demo::fallback_transactions(),
                    budgets: demo::fallback_budgets(),
                    bills: demo::fallback_bills(),
                };
                Ok(SyncOutcome::Fallback { reason: err })
            }
            FallbackPolicy::Strict => {
                self.log.push(format!("Backend sync failed: {err}"));
                Err(CoordinatorError::Offline(err))
            }
        }
    }

    fn write(
        &mut self,
        action: &'static str,
        call: impl FnOnce(&B) -> Result<(), ApiError>,
    ) -> Result<SyncOutcome, CoordinatorError> {
        self.log.push(format!("{action}..."));
        match call(&self.backend) {
            Ok(()) => {
                self.log.push(format!("{action}: done."));
                match self.refresh() {
                    Err(CoordinatorError::Offline(reason)) => Ok(SyncOutcome::Stale { reason }),
                    other => other,
                }
            }
            Err(source) => {
                self.log.push(format!("{action}: FAILED ({source})"));
                Err(CoordinatorError::Write { action, source })
            }
        }
    }

    pub fn add_transaction(&mut self, tx: &NewTransaction) -> Result<SyncOutcome, CoordinatorError> {
        self.write("Saving transaction", |b| b.create_transaction(tx))
    }

    pub fn add_budget(&mut self, budget: &NewBudget) -> Result<SyncOutcome, CoordinatorError> {
        self.write("Creating budget", |b| b.create_budget(budget))
    }

    pub fn set_budget_limit(
        &mut self,
        id: &RecordId,
        limit: Decimal,
    ) -> Result<SyncOutcome, CoordinatorError> {
        self.write("Updating budget limit", |b| b.update_budget_limit(id, limit))
    }

    pub fn add_bill(&mut self, bill: &NewBill) -> Result<SyncOutcome, CoordinatorError> {
        self.write("Saving bill", |b| b.create_bill(bill))
    }

    pub fn pay_bill(&mut self, id: &RecordId) -> Result<SyncOutcome, CoordinatorError> {
        self.write("Paying bill", |b| b.pay_bill(id))
    }

    /// Prepends a locally generated record; nothing is sent to the backend.
    pub fn inject(&mut self, event: SimulatedEvent) {
        match event {
            SimulatedEvent::Transaction(entry) => {
                self.log
                    .push(format!("Simulating incoming {} notification...", entry.source));
                self.log.push(format!(
                    "Simulated {} transaction stored: {}",
                    entry.source, entry.description
                ));
                self.state.transactions.insert(0, entry);
            }
            SimulatedEvent::Bill(bill) => {
                self.log.push("Simulating incoming bill e-mail...");
                self.log.push(format!("Simulated bill detected: {}", bill.name));
                self.state.bills.insert(0, bill);
            }
        }
    }

    /// Runs the backend anomaly scan and flags matching transactions. A failed
    /// scan is logged and yields no findings.
    pub fn scan_anomalies(&mut self) -> Vec<Anomaly> {
        if self.state.transactions.is_empty() {
            return Vec::new();
        }
        self.log.push("Starting security scan...");

        let anomalies = match self.backend.scan_anomalies() {
            Ok(a) => a,
            Err(err) => {
                log::warn!("anomaly scan failed: {err}");
                self.log.push("ERROR: anomaly scan service unreachable.");
                return Vec::new();
            }
        };

        for entry in &mut self.state.transactions {
            let hit = anomalies
                .iter()
                .find(|a| a.transaction_id().as_ref() == Some(&entry.id));
            match hit {
                Some(a) => {
                    self.log
                        .push(format!("WARNING: anomaly detected at '{}'", entry.description));
                    entry.is_anomaly = true;
                    entry.anomaly_reason = Some(a.message.clone());
                }
                None => {
                    entry.is_anomaly = false;
                    entry.anomaly_reason = None;
                }
            }
        }
        self.log.push("Security scan complete.");
        anomalies
    }
}
