//! Requester-facing balance report: current balance plus the leave approved
//! during the current calendar month (UTC).

use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;

use crate::domain::UserId;
use crate::ledger::{HistoryRecord, Ledger, LedgerError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BalanceReport {
    pub user_id: UserId,
    pub balance: Decimal,
    pub month: String,
    pub records: Vec<HistoryRecord>,
}

impl BalanceReport {
    /// `Ok(None)` when the user has no ledger row.
    pub async fn load(
        ledger: &dyn Ledger,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Option<Self>, LedgerError> {
        let Some(row) = ledger.find_row_by_identity(user_id).await? else {
            return Ok(None);
        };
        let balance = ledger.read_balance(&row).await?;
        let records = ledger
            .read_all_history_records()
            .await?
            .into_iter()
            .filter(|record| {
                record.requester_id == user_id
                    && record.submitted_at.year() == now.year()
                    && record.submitted_at.month() == now.month()
            })
            .collect();

        Ok(Some(Self { user_id, balance, month: now.format("%Y-%m").to_string(), records }))
    }

    pub fn hours_taken(&self) -> Decimal {
        self.records.iter().map(|record| record.total_hours).sum()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::BalanceReport;
    use crate::domain::{RequestId, UserId};
    use crate::ledger::{HistoryRecord, InMemoryLedger, Ledger, LedgerAccount};

    fn record(requester: i64, month: u32, total: i64) -> HistoryRecord {
        let date = NaiveDate::from_ymd_opt(2025, month, 3).expect("date");
        HistoryRecord {
            submitted_at: Utc.with_ymd_and_hms(2025, month, 1, 8, 0, 0).unwrap(),
            requester_id: UserId(requester),
            requester_name: "Ana Lima".to_owned(),
            requester_handle: None,
            start_date: date,
            end_date: date,
            hours_breakdown: vec![Decimal::from(total)],
            total_hours: Decimal::from(total),
            remarks: "NIL".to_owned(),
            request_id: RequestId(format!("REQ_{requester}_{month}")),
            supervisor: None,
            operations: "Olga Ops".to_owned(),
        }
    }

    #[tokio::test]
    async fn report_keeps_only_this_months_records_for_the_user() {
        let ledger = InMemoryLedger::with_accounts(vec![LedgerAccount {
            user_id: UserId(42),
            display_name: "Ana Lima".to_owned(),
            balance: Decimal::from(96),
        }]);
        for entry in [record(42, 2, 8), record(42, 1, 4), record(77, 2, 6), record(42, 2, 3)] {
            ledger.append_history_record(entry).await.expect("append");
        }
        let now = Utc.with_ymd_and_hms(2025, 2, 20, 12, 0, 0).unwrap();

        let report = BalanceReport::load(&ledger, UserId(42), now)
            .await
            .expect("ledger reachable")
            .expect("user has a row");

        assert_eq!(report.balance, Decimal::from(96));
        assert_eq!(report.month, "2025-02");
        assert_eq!(report.records.len(), 2);
        assert_eq!(report.hours_taken(), Decimal::from(11));
    }

    #[tokio::test]
    async fn unknown_user_has_no_report() {
        let ledger = InMemoryLedger::default();
        let now = Utc.with_ymd_and_hms(2025, 2, 20, 12, 0, 0).unwrap();

        assert_eq!(BalanceReport::load(&ledger, UserId(1), now).await, Ok(None));
    }
}
