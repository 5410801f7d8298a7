mod bootstrap;

use anyhow::Result;
use leaveflow_core::config::{AppConfig, LoadOptions, LogFormat, LoggingConfig};
use tracing::Level;

fn init_logging(logging: &LoggingConfig) {
    let log_level = logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match logging.format {
        LogFormat::Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        LogFormat::Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            // Nothing is configured yet, so report through the default subscriber.
            init_logging(&AppConfig::default().logging);
            tracing::error!(
                event_name = "system.config.invalid",
                correlation_id = "bootstrap",
                error = %error,
                "configuration could not be loaded"
            );
            return Err(error.into());
        }
    };
    init_logging(&config.logging);

    let app = bootstrap::bootstrap_with_config(config).await?;
    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        supervisor_chat_id = app.config.telegram.supervisor_chat_id,
        operations_chat_id = app.config.telegram.operations_chat_id,
        "leaveflow-server started"
    );

    let outcome = tokio::select! {
        result = app.poller.run() => result.map_err(anyhow::Error::from),
        signal = tokio::signal::ctrl_c() => signal.map_err(anyhow::Error::from),
    };

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "leaveflow-server stopping"
    );
    app.db_pool.close().await;
    outcome
}
