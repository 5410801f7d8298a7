use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use leaveflow_core::config::{AppConfig, LoadOptions, DEFAULT_CONFIG_FILE};
use secrecy::ExposeSecret;
use toml::Value;

struct Field {
    key: &'static str,
    env_keys: &'static [&'static str],
    value: String,
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let fields = [
        Field {
            key: "telegram.bot_token",
            env_keys: &["LEAVEFLOW_TELEGRAM_BOT_TOKEN"],
            value: redact_token(config.telegram.bot_token.expose_secret()),
        },
        Field {
            key: "telegram.bot_username",
            env_keys: &["LEAVEFLOW_TELEGRAM_BOT_USERNAME"],
            value: config
                .telegram
                .bot_username
                .clone()
                .unwrap_or_else(|| "<from getMe>".to_string()),
        },
        Field {
            key: "telegram.supervisor_chat_id",
            env_keys: &["LEAVEFLOW_TELEGRAM_SUPERVISOR_CHAT_ID"],
            value: config.telegram.supervisor_chat_id.to_string(),
        },
        Field {
            key: "telegram.operations_chat_id",
            env_keys: &["LEAVEFLOW_TELEGRAM_OPERATIONS_CHAT_ID"],
            value: config.telegram.operations_chat_id.to_string(),
        },
        Field {
            key: "telegram.api_base_url",
            env_keys: &["LEAVEFLOW_TELEGRAM_API_BASE_URL"],
            value: config.telegram.api_base_url.clone(),
        },
        Field {
            key: "telegram.poll_timeout_secs",
            env_keys: &["LEAVEFLOW_TELEGRAM_POLL_TIMEOUT_SECS"],
            value: config.telegram.poll_timeout_secs.to_string(),
        },
        Field {
            key: "ledger.url",
            env_keys: &["LEAVEFLOW_LEDGER_URL"],
            value: config.ledger.url.clone(),
        },
        Field {
            key: "ledger.max_connections",
            env_keys: &["LEAVEFLOW_LEDGER_MAX_CONNECTIONS"],
            value: config.ledger.max_connections.to_string(),
        },
        Field {
            key: "ledger.timeout_secs",
            env_keys: &["LEAVEFLOW_LEDGER_TIMEOUT_SECS"],
            value: config.ledger.timeout_secs.to_string(),
        },
        Field {
            key: "approvals.require_supervisor_approval",
            env_keys: &["LEAVEFLOW_APPROVALS_REQUIRE_SUPERVISOR_APPROVAL"],
            value: config.approvals.require_supervisor_approval.to_string(),
        },
        Field {
            key: "logging.level",
            env_keys: &["LEAVEFLOW_LOGGING_LEVEL", "LEAVEFLOW_LOG_LEVEL"],
            value: config.logging.level.clone(),
        },
        Field {
            key: "logging.format",
            env_keys: &["LEAVEFLOW_LOGGING_FORMAT", "LEAVEFLOW_LOG_FORMAT"],
            value: format!("{:?}", config.logging.format),
        },
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(fields.iter().map(|field| {
        render_line(
            field.key,
            &field.value,
            field_source(
                field.key,
                field.env_keys,
                config_file_doc.as_ref(),
                config_file_path.as_deref(),
            ),
        )
    }));

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from("config").join(DEFAULT_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps the public bot id, hides the secret half.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((bot_id, _)) = trimmed.split_once(':') {
        return format!("{bot_id}:***");
    }

    "<redacted>".to_string()
}
