use leaveflow_db::migrations;

use crate::commands::{with_ledger, CommandResult};

pub fn run() -> CommandResult {
    let result = with_ledger(|pool| async move {
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;
        migrations::applied_versions(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))
    });

    match result {
        Ok(versions) => CommandResult::success(
            "migrate",
            format!("applied pending migrations; schema versions: {versions:?}"),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("migrate", error_class, message, exit_code)
        }
    }
}
