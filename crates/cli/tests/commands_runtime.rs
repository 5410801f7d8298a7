use std::env;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use leaveflow_cli::commands::{config, doctor, ledger, migrate};
use rust_decimal::Decimal;
use serde_json::Value;

const VALID_TELEGRAM: [(&str, &str); 3] = [
    ("LEAVEFLOW_TELEGRAM_BOT_TOKEN", "123456:cli-test-token"),
    ("LEAVEFLOW_TELEGRAM_SUPERVISOR_CHAT_ID", "-1001"),
    ("LEAVEFLOW_TELEGRAM_OPERATIONS_CHAT_ID", "-1002"),
];

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&valid_env("sqlite::memory:"), || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_for_non_sqlite_ledger() {
    with_env(&valid_env("postgres://localhost/leave"), || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn ledger_commands_run_without_bot_settings() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = sqlite_url(&dir.path().join("ops.db"));

    with_env(&[("LEAVEFLOW_LEDGER_URL", url.as_str())], || {
        let migrated = migrate::run();
        assert_eq!(migrated.exit_code, 0, "{}", migrated.output);

        let provisioned = ledger::set_balance(42, Decimal::from(120), "Ana Lima");
        assert_eq!(provisioned.exit_code, 0, "{}", provisioned.output);
        assert_eq!(parse_payload(&ledger::list().output)["data"][0]["balance_hours"], "120");
    });
}

#[test]
fn set_balance_provisions_and_overwrites_rows() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = sqlite_url(&dir.path().join("ledger.db"));

    with_env(&valid_env(&url), || {
        assert_eq!(migrate::run().exit_code, 0);

        let created = ledger::set_balance(42, Decimal::from(120), "Ana Lima");
        assert_eq!(created.exit_code, 0, "{}", created.output);
        let payload = parse_payload(&created.output);
        assert_eq!(payload["data"]["balance_hours"], "120");

        let updated = ledger::set_balance(42, Decimal::new(965, 1), "Ana Lima");
        assert_eq!(updated.exit_code, 0, "{}", updated.output);

        let listed = parse_payload(&ledger::list().output);
        assert_eq!(listed["status"], "ok");
        let rows = listed["data"].as_array().expect("rows");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["display_name"], "Ana Lima");
        assert_eq!(rows[0]["balance_hours"], "96.5");
    });
}

#[test]
fn set_balance_rejects_negative_hours_and_blank_names() {
    with_env(&valid_env("sqlite::memory:"), || {
        let negative = ledger::set_balance(42, Decimal::from(-1), "Ana Lima");
        assert_eq!(negative.exit_code, 2);
        assert_eq!(parse_payload(&negative.output)["error_class"], "invalid_argument");

        let unnamed = ledger::set_balance(42, Decimal::from(8), "   ");
        assert_eq!(unnamed.exit_code, 2);
    });
}

#[test]
fn set_balance_without_schema_reports_ledger_failure() {
    with_env(&valid_env("sqlite::memory:"), || {
        let result = ledger::set_balance(42, Decimal::from(8), "Ana Lima");
        assert_eq!(result.exit_code, 5);
        assert_eq!(parse_payload(&result.output)["error_class"], "ledger");
    });
}

#[test]
fn doctor_flags_missing_migrations_then_passes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = sqlite_url(&dir.path().join("doctor.db"));

    with_env(&valid_env(&url), || {
        let before = doctor::run(true);
        assert_eq!(before.exit_code, 1);
        let report = parse_payload(&before.output);
        assert_eq!(report["overall_status"], "fail");
        assert_eq!(report["checks"][2]["name"], "ledger_readiness");
        assert_eq!(report["checks"][2]["status"], "fail");

        assert_eq!(migrate::run().exit_code, 0);

        let after = doctor::run(false);
        assert_eq!(after.exit_code, 0, "{}", after.output);
        assert!(after.output.starts_with("doctor: all readiness checks passed"));
    });
}

#[test]
fn doctor_skips_dependent_checks_when_config_fails() {
    with_env::<&str>(&[], || {
        let result = doctor::run(true);
        let report = parse_payload(&result.output);

        assert_eq!(report["checks"][0]["status"], "fail");
        assert_eq!(report["checks"][1]["status"], "skipped");
        assert_eq!(report["checks"][2]["status"], "skipped");
    });
}

#[test]
fn config_output_redacts_bot_secret() {
    with_env(&valid_env("sqlite::memory:"), || {
        let output = config::run();

        assert!(output.contains("- telegram.bot_token = 123456:*** (source: env (LEAVEFLOW_TELEGRAM_BOT_TOKEN))"));
        assert!(!output.contains("cli-test-token"));
        assert!(output.contains("- approvals.require_supervisor_approval = false (source: default)"));
        assert!(output.contains("- telegram.bot_username = <from getMe> (source: default)"));
    });
}

fn valid_env(ledger_url: &str) -> Vec<(&'static str, String)> {
    let mut vars = VALID_TELEGRAM
        .iter()
        .map(|(key, value)| (*key, (*value).to_string()))
        .collect::<Vec<_>>();
    vars.push(("LEAVEFLOW_LEDGER_URL", ledger_url.to_string()));
    vars
}

fn sqlite_url(path: &Path) -> String {
    format!("sqlite://{}", path.display())
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env<V: AsRef<str>>(vars: &[(&str, V)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard = ENV_LOCK.get_or_init(|| Mutex::new(())).lock().unwrap_or_else(|p| p.into_inner());

    let keys = [
        "LEAVEFLOW_TELEGRAM_BOT_TOKEN",
        "LEAVEFLOW_TELEGRAM_BOT_USERNAME",
        "LEAVEFLOW_TELEGRAM_SUPERVISOR_CHAT_ID",
        "LEAVEFLOW_TELEGRAM_OPERATIONS_CHAT_ID",
        "LEAVEFLOW_TELEGRAM_API_BASE_URL",
        "LEAVEFLOW_TELEGRAM_POLL_TIMEOUT_SECS",
        "LEAVEFLOW_LEDGER_URL",
        "LEAVEFLOW_LEDGER_MAX_CONNECTIONS",
        "LEAVEFLOW_LEDGER_TIMEOUT_SECS",
        "LEAVEFLOW_APPROVALS_REQUIRE_SUPERVISOR_APPROVAL",
        "LEAVEFLOW_LOGGING_LEVEL",
        "LEAVEFLOW_LOGGING_FORMAT",
        "LEAVEFLOW_LOG_LEVEL",
        "LEAVEFLOW_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value.as_ref());
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
