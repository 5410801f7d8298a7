//! Interface to the persistent leave ledger: balances plus an append-only
//! approval history.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Approver, LeaveRequest, RequestId, UserId};

/// Opaque reference to a requester's balance row.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LedgerRow(pub i64);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerAccount {
    pub user_id: UserId,
    pub display_name: String,
    pub balance: Decimal,
}

/// One fully approved request, as appended to the history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub submitted_at: DateTime<Utc>,
    pub requester_id: UserId,
    pub requester_name: String,
    pub requester_handle: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub hours_breakdown: Vec<Decimal>,
    pub total_hours: Decimal,
    pub remarks: String,
    pub request_id: RequestId,
    pub supervisor: Option<String>,
    pub operations: String,
}

impl HistoryRecord {
    pub fn for_approval(request: &LeaveRequest, operations: &Approver) -> Self {
        Self {
            submitted_at: request.submitted_at,
            requester_id: request.requester.id,
            requester_name: request.requester.display_name.clone(),
            requester_handle: request.requester.handle.clone(),
            start_date: request.start_date(),
            end_date: request.end_date(),
            hours_breakdown: request.hours.values(),
            total_hours: request.total_hours(),
            remarks: request.remarks.clone(),
            request_id: request.id.clone(),
            supervisor: request.supervisor_name().map(str::to_owned),
            operations: operations.display_name.clone(),
        }
    }

    /// Comma-joined per-day hours in calendar order, e.g. `8,4,8`.
    pub fn breakdown_label(&self) -> String {
        self.hours_breakdown.iter().map(Decimal::to_string).collect::<Vec<_>>().join(",")
    }

    pub fn month_key(&self) -> String {
        self.submitted_at.format("%Y-%m").to_string()
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
    #[error("ledger row {0:?} does not exist")]
    MissingRow(LedgerRow),
    #[error("ledger data could not be decoded: {0}")]
    Decode(String),
}

#[async_trait]
pub trait Ledger: Send + Sync {
    async fn find_row_by_identity(&self, user_id: UserId) -> Result<Option<LedgerRow>, LedgerError>;

    async fn read_balance(&self, row: &LedgerRow) -> Result<Decimal, LedgerError>;

    async fn write_balance(&self, row: &LedgerRow, balance: Decimal) -> Result<(), LedgerError>;

    async fn append_history_record(&self, record: HistoryRecord) -> Result<(), LedgerError>;

    async fn read_all_history_records(&self) -> Result<Vec<HistoryRecord>, LedgerError>;

    /// Writes the new balance and appends the history record as one unit.
    ///
    /// The default runs the two writes in sequence; if the append fails the
    /// balance has already moved. Ledgers with transactions override this.
    async fn settle(
        &self,
        row: &LedgerRow,
        balance: Decimal,
        record: HistoryRecord,
    ) -> Result<(), LedgerError> {
        self.write_balance(row, balance).await?;
        self.append_history_record(record).await
    }
}

#[derive(Default)]
pub struct InMemoryLedger {
    state: Mutex<InMemoryLedgerState>,
}

#[derive(Default)]
struct InMemoryLedgerState {
    accounts: Vec<LedgerAccount>,
    history: Vec<HistoryRecord>,
    unavailable: bool,
}

impl InMemoryLedger {
    pub fn with_accounts(accounts: Vec<LedgerAccount>) -> Self {
        Self { state: Mutex::new(InMemoryLedgerState { accounts, ..InMemoryLedgerState::default() }) }
    }

    /// Makes every subsequent call fail with [`LedgerError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.with_state(|state| state.unavailable = unavailable);
    }

    pub fn balance_of(&self, user_id: UserId) -> Option<Decimal> {
        self.with_state(|state| {
            state.accounts.iter().find(|account| account.user_id == user_id).map(|a| a.balance)
        })
    }

    pub fn history(&self) -> Vec<HistoryRecord> {
        self.with_state(|state| state.history.clone())
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut InMemoryLedgerState) -> T) -> T {
        match self.state.lock() {
            Ok(mut state) => f(&mut state),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    fn with_available_state<T>(
        &self,
        f: impl FnOnce(&mut InMemoryLedgerState) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        self.with_state(|state| {
            if state.unavailable {
                return Err(LedgerError::Unavailable("in-memory ledger switched off".to_owned()));
            }
            f(state)
        })
    }
}

fn account_index(row: &LedgerRow, len: usize) -> Result<usize, LedgerError> {
    usize::try_from(row.0).ok().filter(|idx| *idx < len).ok_or_else(|| LedgerError::MissingRow(row.clone()))
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn find_row_by_identity(&self, user_id: UserId) -> Result<Option<LedgerRow>, LedgerError> {
        self.with_available_state(|state| {
            Ok(state
                .accounts
                .iter()
                .position(|account| account.user_id == user_id)
                .and_then(|idx| i64::try_from(idx).ok())
                .map(LedgerRow))
        })
    }

    async fn read_balance(&self, row: &LedgerRow) -> Result<Decimal, LedgerError> {
        self.with_available_state(|state| {
            let idx = account_index(row, state.accounts.len())?;
            Ok(state.accounts[idx].balance)
        })
    }

    async fn write_balance(&self, row: &LedgerRow, balance: Decimal) -> Result<(), LedgerError> {
        self.with_available_state(|state| {
            let idx = account_index(row, state.accounts.len())?;
            state.accounts[idx].balance = balance;
            Ok(())
        })
    }

    async fn append_history_record(&self, record: HistoryRecord) -> Result<(), LedgerError> {
        self.with_available_state(|state| {
            state.history.push(record);
            Ok(())
        })
    }

    async fn read_all_history_records(&self) -> Result<Vec<HistoryRecord>, LedgerError> {
        self.with_available_state(|state| Ok(state.history.clone()))
    }
}
