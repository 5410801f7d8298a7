use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "leaveflow.toml";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub telegram: TelegramConfig,
    pub ledger: LedgerConfig,
    pub approvals: ApprovalsConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    pub supervisor_chat_id: i64,
    pub operations_chat_id: i64,
    pub api_base_url: String,
    pub poll_timeout_secs: u64,
    /// Username without the leading `@`; resolved through `getMe` when unset.
    pub bot_username: Option<String>,
}

#[derive(Clone, Debug)]
pub struct LedgerConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ApprovalsConfig {
    pub require_supervisor_approval: bool,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub ledger_url: Option<String>,
    pub log_level: Option<String>,
    pub bot_token: Option<String>,
    pub bot_username: Option<String>,
    pub supervisor_chat_id: Option<i64>,
    pub operations_chat_id: Option<i64>,
    pub require_supervisor_approval: Option<bool>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            telegram: TelegramConfig {
                bot_token: String::new().into(),
                supervisor_chat_id: 0,
                operations_chat_id: 0,
                api_base_url: "https://api.telegram.org".to_string(),
                poll_timeout_secs: 30,
                bot_username: None,
            },
            ledger: LedgerConfig {
                url: "sqlite://leaveflow.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            approvals: ApprovalsConfig::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let config = Self::assemble(options)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration for commands that only touch the ledger. Telegram
    /// settings are read but not required.
    pub fn load_for_ledger(options: LoadOptions) -> Result<Self, ConfigError> {
        let config = Self::assemble(options)?;
        validate_ledger(&config.ledger)?;
        validate_logging(&config.logging)?;
        Ok(config)
    }

    fn assemble(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.telegram.bot_username = normalize_username(config.telegram.bot_username.take());

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(telegram) = patch.telegram {
            if let Some(bot_token) = telegram.bot_token {
                self.telegram.bot_token = bot_token.into();
            }
            if let Some(chat_id) = telegram.supervisor_chat_id {
                self.telegram.supervisor_chat_id = chat_id;
            }
            if let Some(chat_id) = telegram.operations_chat_id {
                self.telegram.operations_chat_id = chat_id;
            }
            if let Some(api_base_url) = telegram.api_base_url {
                self.telegram.api_base_url = api_base_url;
            }
            if let Some(poll_timeout_secs) = telegram.poll_timeout_secs {
                self.telegram.poll_timeout_secs = poll_timeout_secs;
            }
            if let Some(bot_username) = telegram.bot_username {
                self.telegram.bot_username = Some(bot_username);
            }
        }

        if let Some(ledger) = patch.ledger {
            if let Some(url) = ledger.url {
                self.ledger.url = url;
            }
            if let Some(max_connections) = ledger.max_connections {
                self.ledger.max_connections = max_connections;
            }
            if let Some(timeout_secs) = ledger.timeout_secs {
                self.ledger.timeout_secs = timeout_secs;
            }
        }

        if let Some(approvals) = patch.approvals {
            if let Some(required) = approvals.require_supervisor_approval {
                self.approvals.require_supervisor_approval = required;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("LEAVEFLOW_TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = value.into();
        }
        if let Some(value) = read_env("LEAVEFLOW_TELEGRAM_SUPERVISOR_CHAT_ID") {
            self.telegram.supervisor_chat_id =
                parse_i64("LEAVEFLOW_TELEGRAM_SUPERVISOR_CHAT_ID", &value)?;
        }
        if let Some(value) = read_env("LEAVEFLOW_TELEGRAM_OPERATIONS_CHAT_ID") {
            self.telegram.operations_chat_id =
                parse_i64("LEAVEFLOW_TELEGRAM_OPERATIONS_CHAT_ID", &value)?;
        }
        if let Some(value) = read_env("LEAVEFLOW_TELEGRAM_API_BASE_URL") {
            self.telegram.api_base_url = value;
        }
        if let Some(value) = read_env("LEAVEFLOW_TELEGRAM_POLL_TIMEOUT_SECS") {
            self.telegram.poll_timeout_secs =
                parse_u64("LEAVEFLOW_TELEGRAM_POLL_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("LEAVEFLOW_TELEGRAM_BOT_USERNAME") {
            self.telegram.bot_username = Some(value);
        }

        if let Some(value) = read_env("LEAVEFLOW_LEDGER_URL") {
            self.ledger.url = value;
        }
        if let Some(value) = read_env("LEAVEFLOW_LEDGER_MAX_CONNECTIONS") {
            self.ledger.max_connections = parse_u32("LEAVEFLOW_LEDGER_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("LEAVEFLOW_LEDGER_TIMEOUT_SECS") {
            self.ledger.timeout_secs = parse_u64("LEAVEFLOW_LEDGER_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("LEAVEFLOW_APPROVALS_REQUIRE_SUPERVISOR_APPROVAL") {
            self.approvals.require_supervisor_approval =
                parse_bool("LEAVEFLOW_APPROVALS_REQUIRE_SUPERVISOR_APPROVAL", &value)?;
        }

        let log_level =
            read_env("LEAVEFLOW_LOGGING_LEVEL").or_else(|| read_env("LEAVEFLOW_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("LEAVEFLOW_LOGGING_FORMAT").or_else(|| read_env("LEAVEFLOW_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(ledger_url) = overrides.ledger_url {
            self.ledger.url = ledger_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(bot_token) = overrides.bot_token {
            self.telegram.bot_token = bot_token.into();
        }
        if let Some(bot_username) = overrides.bot_username {
            self.telegram.bot_username = Some(bot_username);
        }
        if let Some(chat_id) = overrides.supervisor_chat_id {
            self.telegram.supervisor_chat_id = chat_id;
        }
        if let Some(chat_id) = overrides.operations_chat_id {
            self.telegram.operations_chat_id = chat_id;
        }
        if let Some(required) = overrides.require_supervisor_approval {
            self.approvals.require_supervisor_approval = required;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_telegram(&self.telegram)?;
        validate_ledger(&self.ledger)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from("config").join(DEFAULT_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_telegram(telegram: &TelegramConfig) -> Result<(), ConfigError> {
    let token = telegram.bot_token.expose_secret();
    if token.is_empty() {
        return Err(ConfigError::Validation(
            "telegram.bot_token is required. Create a bot with @BotFather to obtain one"
                .to_string(),
        ));
    }
    let well_formed = token.split_once(':').is_some_and(|(bot_id, secret)| {
        !bot_id.is_empty() && bot_id.bytes().all(|b| b.is_ascii_digit()) && !secret.is_empty()
    });
    if !well_formed {
        return Err(ConfigError::Validation(
            "telegram.bot_token must look like `<bot id>:<secret>`".to_string(),
        ));
    }

    if telegram.supervisor_chat_id == 0 {
        return Err(ConfigError::Validation(
            "telegram.supervisor_chat_id is required".to_string(),
        ));
    }
    if telegram.operations_chat_id == 0 {
        return Err(ConfigError::Validation(
            "telegram.operations_chat_id is required".to_string(),
        ));
    }
    if telegram.supervisor_chat_id == telegram.operations_chat_id {
        return Err(ConfigError::Validation(
            "telegram.supervisor_chat_id and telegram.operations_chat_id must differ".to_string(),
        ));
    }

    let base_url = telegram.api_base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "telegram.api_base_url must start with http:// or https://".to_string(),
        ));
    }

    if telegram.poll_timeout_secs == 0 || telegram.poll_timeout_secs > 50 {
        return Err(ConfigError::Validation(
            "telegram.poll_timeout_secs must be in range 1..=50".to_string(),
        ));
    }

    Ok(())
}

fn validate_ledger(ledger: &LedgerConfig) -> Result<(), ConfigError> {
    let url = ledger.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "ledger.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if ledger.max_connections == 0 {
        return Err(ConfigError::Validation(
            "ledger.max_connections must be greater than zero".to_string(),
        ));
    }

    if ledger.timeout_secs == 0 || ledger.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "ledger.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn normalize_username(username: Option<String>) -> Option<String> {
    username
        .map(|name| name.trim().trim_start_matches('@').to_string())
        .filter(|name| !name.is_empty())
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_i64(key: &str, value: &str) -> Result<i64, ConfigError> {
    value.trim().parse::<i64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    telegram: Option<TelegramPatch>,
    ledger: Option<LedgerPatch>,
    approvals: Option<ApprovalsPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct TelegramPatch {
    bot_token: Option<String>,
    supervisor_chat_id: Option<i64>,
    operations_chat_id: Option<i64>,
    api_base_url: Option<String>,
    poll_timeout_secs: Option<u64>,
    bot_username: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LedgerPatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ApprovalsPatch {
    require_supervisor_approval: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    const TELEGRAM_VARS: [&str; 3] = [
        "LEAVEFLOW_TELEGRAM_BOT_TOKEN",
        "LEAVEFLOW_TELEGRAM_SUPERVISOR_CHAT_ID",
        "LEAVEFLOW_TELEGRAM_OPERATIONS_CHAT_ID",
    ];

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn set_valid_telegram_env() {
        env::set_var("LEAVEFLOW_TELEGRAM_BOT_TOKEN", "123456:secret-from-env");
        env::set_var("LEAVEFLOW_TELEGRAM_SUPERVISOR_CHAT_ID", "-1001");
        env::set_var("LEAVEFLOW_TELEGRAM_OPERATIONS_CHAT_ID", "-1002");
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_LEAVEFLOW_BOT_TOKEN", "987:interpolated");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("leaveflow.toml");
            fs::write(
                &path,
                r#"
[telegram]
bot_token = "${TEST_LEAVEFLOW_BOT_TOKEN}"
supervisor_chat_id = -100
operations_chat_id = -200

[approvals]
require_supervisor_approval = true
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.telegram.bot_token.expose_secret() == "987:interpolated",
                "bot token should be interpolated from environment",
            )?;
            ensure(config.telegram.supervisor_chat_id == -100, "supervisor chat from file")?;
            ensure(
                config.approvals.require_supervisor_approval,
                "approval ordering switch should be read from file",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_LEAVEFLOW_BOT_TOKEN"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_valid_telegram_env();
        env::set_var("LEAVEFLOW_LOG_LEVEL", "warn");
        env::set_var("LEAVEFLOW_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Json),
                "json logging format should be set from env var",
            )?;
            ensure(
                !config.approvals.require_supervisor_approval,
                "approval ordering is permissive by default",
            )?;
            Ok(())
        })();

        clear_vars(&TELEGRAM_VARS);
        clear_vars(&["LEAVEFLOW_LOG_LEVEL", "LEAVEFLOW_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("LEAVEFLOW_LEDGER_URL", "sqlite://from-env.db");
        env::set_var("LEAVEFLOW_TELEGRAM_BOT_TOKEN", "111:from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("leaveflow.toml");
            fs::write(
                &path,
                r#"
[telegram]
bot_token = "222:from-file"
supervisor_chat_id = 10
operations_chat_id = 20

[ledger]
url = "sqlite://from-file.db"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    ledger_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    operations_chat_id: Some(30),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.ledger.url == "sqlite://from-override.db",
                "override ledger url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.telegram.bot_token.expose_secret() == "111:from-env",
                "env bot token should win over file and defaults",
            )?;
            ensure(config.telegram.supervisor_chat_id == 10, "file chat id kept without env")?;
            ensure(config.telegram.operations_chat_id == 30, "override chat id should win")?;
            Ok(())
        })();

        clear_vars(&["LEAVEFLOW_LEDGER_URL", "LEAVEFLOW_TELEGRAM_BOT_TOKEN"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_valid_telegram_env();
        env::set_var("LEAVEFLOW_TELEGRAM_BOT_TOKEN", "not-a-bot-token");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("telegram.bot_token")
            );
            ensure(has_message, "validation failure should mention telegram.bot_token")
        })();

        clear_vars(&TELEGRAM_VARS);
        result
    }

    #[test]
    fn ledger_only_load_skips_telegram_requirements() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        clear_vars(&TELEGRAM_VARS);
        env::set_var("LEAVEFLOW_LEDGER_URL", "sqlite://ledger-only.db");

        let result = (|| -> Result<(), String> {
            ensure(
                AppConfig::load(LoadOptions::default()).is_err(),
                "full load still requires the bot token",
            )?;
            let config = AppConfig::load_for_ledger(LoadOptions::default())
                .map_err(|err| format!("ledger-only load failed: {err}"))?;
            ensure(config.ledger.url == "sqlite://ledger-only.db", "ledger url from env")?;

            env::set_var("LEAVEFLOW_LEDGER_URL", "postgres://elsewhere");
            ensure(
                AppConfig::load_for_ledger(LoadOptions::default()).is_err(),
                "ledger section is still validated",
            )
        })();

        clear_vars(&["LEAVEFLOW_LEDGER_URL"]);
        result
    }

    #[test]
    fn bot_username_is_stored_without_at_sign() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_valid_telegram_env();
        env::set_var("LEAVEFLOW_TELEGRAM_BOT_USERNAME", "@leave_bot");

        let result = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))
            .and_then(|config| {
                ensure(
                    config.telegram.bot_username.as_deref() == Some("leave_bot"),
                    "leading @ should be stripped",
                )
            });

        clear_vars(&TELEGRAM_VARS);
        clear_vars(&["LEAVEFLOW_TELEGRAM_BOT_USERNAME"]);
        result
    }

    #[test]
    fn approver_chats_must_be_distinct() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_valid_telegram_env();
        env::set_var("LEAVEFLOW_TELEGRAM_OPERATIONS_CHAT_ID", "-1001");

        let result = match AppConfig::load(LoadOptions::default()) {
            Err(ConfigError::Validation(message)) if message.contains("must differ") => Ok(()),
            Err(other) => Err(format!("unexpected error: {other}")),
            Ok(_) => Err("identical approver chats should be rejected".to_string()),
        };

        clear_vars(&TELEGRAM_VARS);
        result
    }

    #[test]
    fn malformed_numeric_env_is_reported_with_key() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_valid_telegram_env();
        env::set_var("LEAVEFLOW_TELEGRAM_SUPERVISOR_CHAT_ID", "ops-room");

        let result = match AppConfig::load(LoadOptions::default()) {
            Err(ConfigError::InvalidEnvOverride { key, .. })
                if key == "LEAVEFLOW_TELEGRAM_SUPERVISOR_CHAT_ID" =>
            {
                Ok(())
            }
            Err(other) => Err(format!("unexpected error: {other}")),
            Ok(_) => Err("non-numeric chat id should be rejected".to_string()),
        };

        clear_vars(&TELEGRAM_VARS);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_valid_telegram_env();

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(
                !debug.contains("secret-from-env"),
                "debug output should not contain the bot token",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&TELEGRAM_VARS);
        result
    }
}
