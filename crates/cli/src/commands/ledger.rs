use leaveflow_core::domain::UserId;
use leaveflow_core::ledger::LedgerAccount;
use leaveflow_db::SqlLedger;
use rust_decimal::Decimal;
use serde_json::json;

use crate::commands::{with_ledger, CommandResult};

pub fn set_balance(user_id: i64, hours: Decimal, name: &str) -> CommandResult {
    let name = name.trim();
    if name.is_empty() {
        return CommandResult::failure(
            "ledger set-balance",
            "invalid_argument",
            "--name must not be empty",
            2,
        );
    }
    if hours.is_sign_negative() {
        return CommandResult::failure(
            "ledger set-balance",
            "invalid_argument",
            format!("balance must not be negative, got {hours}"),
            2,
        );
    }

    let account =
        LedgerAccount { user_id: UserId(user_id), display_name: name.to_owned(), balance: hours };
    let result = with_ledger(|pool| async move {
        SqlLedger::new(pool)
            .upsert_account(&account)
            .await
            .map(|row| (row, account))
            .map_err(|error| ("ledger", error.to_string(), 5u8))
    });

    match result {
        Ok((row, account)) => CommandResult::success_with_data(
            "ledger set-balance",
            format!("balance for {} set to {} hours", account.user_id, account.balance),
            Some(json!({
                "row": row.0,
                "user_id": account.user_id.0,
                "display_name": account.display_name,
                "balance_hours": account.balance.to_string(),
            })),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("ledger set-balance", error_class, message, exit_code)
        }
    }
}

pub fn list() -> CommandResult {
    let result = with_ledger(|pool| async move {
        SqlLedger::new(pool).list_accounts().await.map_err(|error| ("ledger", error.to_string(), 5u8))
    });

    match result {
        Ok(accounts) => {
            let rows = accounts
                .iter()
                .map(|account| {
                    json!({
                        "user_id": account.user_id.0,
                        "display_name": account.display_name,
                        "balance_hours": account.balance.to_string(),
                    })
                })
                .collect::<Vec<_>>();
            CommandResult::success_with_data(
                "ledger list",
                format!("{} balance row(s)", rows.len()),
                Some(json!(rows)),
            )
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("ledger list", error_class, message, exit_code)
        }
    }
}
