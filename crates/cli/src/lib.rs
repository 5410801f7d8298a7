pub mod commands;

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "leaveflow",
    about = "Leaveflow operator CLI",
    long_about = "Check runtime readiness, apply ledger migrations, inspect configuration, and provision leave balances.",
    after_help = "Examples:\n  leaveflow doctor --json\n  leaveflow migrate\n  leaveflow ledger set-balance 123456789 120 --name \"Ana Lima\""
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending ledger migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, bot credential shape, and ledger connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(subcommand, about = "Manage leave balance rows in the ledger")]
    Ledger(LedgerCommand),
}

#[derive(Debug, Subcommand)]
enum LedgerCommand {
    #[command(about = "Create a balance row or overwrite an existing one")]
    SetBalance {
        #[arg(help = "Numeric chat user id of the employee")]
        user_id: i64,
        #[arg(help = "Balance in hours, e.g. 120 or 96.5")]
        hours: Decimal,
        #[arg(long, help = "Display name stored with the balance row")]
        name: String,
    },
    #[command(about = "List every balance row")]
    List,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Ledger(LedgerCommand::SetBalance { user_id, hours, name }) => {
            commands::ledger::set_balance(user_id, hours, &name)
        }
        Command::Ledger(LedgerCommand::List) => commands::ledger::list(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
