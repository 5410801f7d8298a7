pub mod connection;
pub mod ledger;
pub mod migrations;

pub use connection::{connect, connect_with_config, connect_with_settings, DbPool};
pub use ledger::SqlLedger;
