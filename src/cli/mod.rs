//! Terminal commands. Each opens the configured database, runs one engine
//! operation, and prints a human-readable report.

pub mod doctor;
pub mod inspect;
pub mod maintenance;
pub mod reconcile;
pub mod score;
pub mod stats;

use anyhow::Result;
use rusqlite::Connection;

use rapport::config::RapportConfig;

/// Open the database named by the config.
fn open(config: &RapportConfig) -> Result<Connection> {
    rapport::db::open_database(config.resolved_db_path())
}
