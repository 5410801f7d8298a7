use std::sync::Arc;

use leaveflow_chat::transport::ChatTransport;
use leaveflow_chat::{
    bot_dispatcher_for, ChatId, ChatNotifier, LeaveBot, ReconnectPolicy, TelegramClient,
    TransportError, UpdatePoller,
};
use leaveflow_core::approvals::{ApprovalEngine, ApprovalPolicy};
use leaveflow_core::audit::{AuditSink, TracingAuditSink};
use leaveflow_core::config::{AppConfig, ConfigError, LoadOptions};
use leaveflow_core::flows::ConversationService;
use leaveflow_core::ledger::Ledger;
use leaveflow_core::notify::Notifier;
use leaveflow_core::store::{DraftStore, PendingRequests};
use leaveflow_db::{connect_with_config, migrations, DbPool, SqlLedger};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub poller: UpdatePoller,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("ledger database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("ledger migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("chat transport setup failed: {0}")]
    Transport(#[source] TransportError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool =
        connect_with_config(&config.ledger).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "ledger database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "ledger migrations applied"
    );

    let telegram =
        Arc::new(TelegramClient::new(&config.telegram).map_err(BootstrapError::Transport)?);
    let bot_username = match config.telegram.bot_username.clone() {
        Some(username) => Some(username),
        None => telegram.bot_username().await.map_err(BootstrapError::Transport)?,
    };
    info!(
        event_name = "system.bootstrap.bot_identity",
        correlation_id = "bootstrap",
        bot_username = bot_username.as_deref().unwrap_or("unknown"),
        "bot identity resolved"
    );
    let transport: Arc<dyn ChatTransport> = telegram.clone();
    let ledger: Arc<dyn Ledger> = Arc::new(SqlLedger::new(db_pool.clone()));
    let audit: Arc<dyn AuditSink> = Arc::new(TracingAuditSink);
    let notifier: Arc<dyn Notifier> = Arc::new(ChatNotifier::new(
        transport.clone(),
        ChatId(config.telegram.supervisor_chat_id),
        ChatId(config.telegram.operations_chat_id),
    ));

    let pending = Arc::new(PendingRequests::default());
    let conversations = Arc::new(ConversationService::new(
        Arc::new(DraftStore::default()),
        pending.clone(),
        notifier.clone(),
        audit.clone(),
    ));
    let policy = ApprovalPolicy {
        require_supervisor_approval: config.approvals.require_supervisor_approval,
    };
    let approvals = Arc::new(ApprovalEngine::new(pending, ledger.clone(), notifier, audit, policy));

    let bot = LeaveBot::new(conversations, approvals, ledger, transport.clone());
    let poller = UpdatePoller::new(
        telegram,
        transport,
        bot_dispatcher_for(bot, bot_username),
        ReconnectPolicy::default(),
    );
    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        require_supervisor_approval = policy.require_supervisor_approval,
        "leave bot wired"
    );

    Ok(Application { config, db_pool, poller })
}
