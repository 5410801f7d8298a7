use leaveflow_core::config::{AppConfig, LoadOptions};
use leaveflow_db::connect_with_config;
use leaveflow_db::migrations::{self, MIGRATOR};
use serde::Serialize;

use crate::commands::CommandResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_chat_routing(&config));
            checks.push(check_ledger(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["chat_routing", "ledger_readiness"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_chat_routing(config: &AppConfig) -> DoctorCheck {
    DoctorCheck {
        name: "chat_routing",
        status: CheckStatus::Pass,
        details: format!(
            "supervisor chat {}, operations chat {}, polling {} with {}s timeout",
            config.telegram.supervisor_chat_id,
            config.telegram.operations_chat_id,
            config.telegram.api_base_url,
            config.telegram.poll_timeout_secs
        ),
    }
}

/// Connects and compares applied schema versions with the embedded migrations.
fn check_ledger(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "ledger_readiness",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.ledger)
            .await
            .map_err(|error| format!("failed to connect to ledger: {error}"))?;
        let applied = migrations::applied_versions(&pool)
            .await
            .map_err(|error| format!("failed to read schema versions: {error}"));
        pool.close().await;
        applied
    });

    let expected =
        MIGRATOR.iter().filter(|migration| migration.migration_type.is_up_migration()).count();
    match result {
        Ok(applied) if applied.len() >= expected => DoctorCheck {
            name: "ledger_readiness",
            status: CheckStatus::Pass,
            details: format!("connected using `{}`, schema current", config.ledger.url),
        },
        Ok(applied) => DoctorCheck {
            name: "ledger_readiness",
            status: CheckStatus::Fail,
            details: format!(
                "connected using `{}` but {} of {expected} migrations applied; run `leaveflow migrate`",
                config.ledger.url,
                applied.len()
            ),
        },
        Err(error) => {
            DoctorCheck { name: "ledger_readiness", status: CheckStatus::Fail, details: error }
        }
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
