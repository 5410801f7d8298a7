pub mod config;
pub mod doctor;
pub mod ledger;
pub mod migrate;

use std::future::Future;

use leaveflow_core::config::{AppConfig, LoadOptions};
use leaveflow_db::{connect_with_config, DbPool};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with_data(command, message, None)
    }

    pub fn success_with_data(
        command: &str,
        message: impl Into<String>,
        data: Option<Value>,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

/// A failed step: error class, message, exit code.
pub(crate) type StepFailure = (&'static str, String, u8);

/// Loads the ledger section of the config, connects to the ledger, and runs
/// `body` on a fresh current-thread runtime. Bot settings are not required.
/// Config problems exit with 2, runtime setup with 3, connectivity with 4.
pub(crate) fn with_ledger<F, Fut, T>(body: F) -> Result<T, StepFailure>
where
    F: FnOnce(DbPool) -> Fut,
    Fut: Future<Output = Result<T, StepFailure>>,
{
    let config = AppConfig::load_for_ledger(LoadOptions::default()).map_err(|error| {
        ("config_validation", format!("configuration issue: {error}"), 2u8)
    })?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|error| ("runtime_init", format!("failed to initialize async runtime: {error}"), 3u8))?;

    runtime.block_on(async {
        let pool = connect_with_config(&config.ledger)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        let result = body(pool.clone()).await;
        pool.close().await;
        result
    })
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}
