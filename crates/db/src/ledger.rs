//! SQLite-backed leave ledger.
//!
//! Balances and hour values are stored as decimal text so they round-trip
//! exactly. `settle` writes the balance and appends the history row inside a
//! single transaction.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use leaveflow_core::domain::{RequestId, UserId};
use leaveflow_core::ledger::{HistoryRecord, Ledger, LedgerAccount, LedgerError, LedgerRow};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, Transaction};
use tracing::debug;

use crate::DbPool;

const HISTORY_COLUMNS: &str = "submitted_at, requester_id, requester_name, requester_handle,
     start_date, end_date, hours_breakdown, total_hours, remarks, request_id,
     supervisor_name, operations_name";

#[derive(Clone)]
pub struct SqlLedger {
    pool: DbPool,
}

impl SqlLedger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Creates the account or replaces its name and balance.
    pub async fn upsert_account(&self, account: &LedgerAccount) -> Result<LedgerRow, LedgerError> {
        let row = sqlx::query(
            "INSERT INTO leave_balance (user_id, display_name, balance_hours, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
                 display_name = excluded.display_name,
                 balance_hours = excluded.balance_hours,
                 updated_at = excluded.updated_at
             RETURNING id",
        )
        .bind(account.user_id.0)
        .bind(&account.display_name)
        .bind(account.balance.to_string())
        .bind(Utc::now().to_rfc3339())
        .fetch_one(&self.pool)
        .await
        .map_err(unavailable)?;

        Ok(LedgerRow(row.try_get("id").map_err(decode)?))
    }

    pub async fn list_accounts(&self) -> Result<Vec<LedgerAccount>, LedgerError> {
        let rows = sqlx::query(
            "SELECT user_id, display_name, balance_hours FROM leave_balance ORDER BY user_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;

        rows.iter()
            .map(|row| {
                Ok(LedgerAccount {
                    user_id: UserId(row.try_get("user_id").map_err(decode)?),
                    display_name: row.try_get("display_name").map_err(decode)?,
                    balance: parse_decimal(&row.try_get::<String, _>("balance_hours").map_err(decode)?)?,
                })
            })
            .collect()
    }

    async fn write_balance_in(
        tx: &mut Transaction<'_, Sqlite>,
        row: &LedgerRow,
        balance: Decimal,
    ) -> Result<(), LedgerError> {
        let updated = sqlx::query(
            "UPDATE leave_balance SET balance_hours = ?, updated_at = ? WHERE id = ?",
        )
        .bind(balance.to_string())
        .bind(Utc::now().to_rfc3339())
        .bind(row.0)
        .execute(&mut **tx)
        .await
        .map_err(unavailable)?;

        if updated.rows_affected() == 0 {
            return Err(LedgerError::MissingRow(row.clone()));
        }
        Ok(())
    }

    async fn append_history_in(
        tx: &mut Transaction<'_, Sqlite>,
        record: &HistoryRecord,
    ) -> Result<(), LedgerError> {
        sqlx::query(&format!(
            "INSERT INTO leave_history ({HISTORY_COLUMNS}, recorded_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(record.submitted_at.to_rfc3339())
        .bind(record.requester_id.0)
        .bind(&record.requester_name)
        .bind(&record.requester_handle)
        .bind(record.start_date.format("%Y-%m-%d").to_string())
        .bind(record.end_date.format("%Y-%m-%d").to_string())
        .bind(record.breakdown_label())
        .bind(record.total_hours.to_string())
        .bind(&record.remarks)
        .bind(record.request_id.as_str())
        .bind(&record.supervisor)
        .bind(&record.operations)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut **tx)
        .await
        .map_err(unavailable)?;
        Ok(())
    }
}

fn unavailable(error: sqlx::Error) -> LedgerError {
    LedgerError::Unavailable(error.to_string())
}

fn decode(error: sqlx::Error) -> LedgerError {
    LedgerError::Decode(error.to_string())
}

fn parse_decimal(raw: &str) -> Result<Decimal, LedgerError> {
    Decimal::from_str(raw.trim())
        .map_err(|error| LedgerError::Decode(format!("`{raw}` is not a decimal: {error}")))
}

fn parse_date(raw: &str) -> Result<NaiveDate, LedgerError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|error| LedgerError::Decode(format!("`{raw}` is not a date: {error}")))
}

fn history_from_row(row: &SqliteRow) -> Result<HistoryRecord, LedgerError> {
    let submitted_at: String = row.try_get("submitted_at").map_err(decode)?;
    let submitted_at = DateTime::parse_from_rfc3339(&submitted_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| LedgerError::Decode(format!("`{submitted_at}`: {error}")))?;
    let breakdown: String = row.try_get("hours_breakdown").map_err(decode)?;
    let hours_breakdown = breakdown
        .split(',')
        .filter(|token| !token.trim().is_empty())
        .map(parse_decimal)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(HistoryRecord {
        submitted_at,
        requester_id: UserId(row.try_get("requester_id").map_err(decode)?),
        requester_name: row.try_get("requester_name").map_err(decode)?,
        requester_handle: row.try_get("requester_handle").map_err(decode)?,
        start_date: parse_date(&row.try_get::<String, _>("start_date").map_err(decode)?)?,
        end_date: parse_date(&row.try_get::<String, _>("end_date").map_err(decode)?)?,
        hours_breakdown,
        total_hours: parse_decimal(&row.try_get::<String, _>("total_hours").map_err(decode)?)?,
        remarks: row.try_get("remarks").map_err(decode)?,
        request_id: RequestId(row.try_get("request_id").map_err(decode)?),
        supervisor: row.try_get("supervisor_name").map_err(decode)?,
        operations: row.try_get("operations_name").map_err(decode)?,
    })
}

#[async_trait]
impl Ledger for SqlLedger {
    async fn find_row_by_identity(&self, user_id: UserId) -> Result<Option<LedgerRow>, LedgerError> {
        let id: Option<i64> = sqlx::query_scalar("SELECT id FROM leave_balance WHERE user_id = ?")
            .bind(user_id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(id.map(LedgerRow))
    }

    async fn read_balance(&self, row: &LedgerRow) -> Result<Decimal, LedgerError> {
        let raw: Option<String> =
            sqlx::query_scalar("SELECT balance_hours FROM leave_balance WHERE id = ?")
                .bind(row.0)
                .fetch_optional(&self.pool)
                .await
                .map_err(unavailable)?;
        let raw = raw.ok_or_else(|| LedgerError::MissingRow(row.clone()))?;
        parse_decimal(&raw)
    }

    async fn write_balance(&self, row: &LedgerRow, balance: Decimal) -> Result<(), LedgerError> {
        let mut tx = self.pool.begin().await.map_err(unavailable)?;
        Self::write_balance_in(&mut tx, row, balance).await?;
        tx.commit().await.map_err(unavailable)
    }

    async fn append_history_record(&self, record: HistoryRecord) -> Result<(), LedgerError> {
        let mut tx = self.pool.begin().await.map_err(unavailable)?;
        Self::append_history_in(&mut tx, &record).await?;
        tx.commit().await.map_err(unavailable)
    }

    async fn read_all_history_records(&self) -> Result<Vec<HistoryRecord>, LedgerError> {
        let rows = sqlx::query(&format!(
            "SELECT {HISTORY_COLUMNS} FROM leave_history ORDER BY id ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;

        rows.iter().map(history_from_row).collect()
    }

    async fn settle(
        &self,
        row: &LedgerRow,
        balance: Decimal,
        record: HistoryRecord,
    ) -> Result<(), LedgerError> {
        let mut tx = self.pool.begin().await.map_err(unavailable)?;
        Self::write_balance_in(&mut tx, row, balance).await?;
        Self::append_history_in(&mut tx, &record).await?;
        tx.commit().await.map_err(unavailable)?;

        debug!(
            event_name = "ledger.settled",
            request_id = %record.request_id,
            user_id = record.requester_id.0,
            balance = %balance,
            "balance written and history appended"
        );
        Ok(())
    }
}
