//! CLI `reconcile` command — merge an identity into an account.

use anyhow::{Context, Result};

use rapport::config::RapportConfig;
use rapport::identity::{AccountKey, Identity, UuidAccountKeys};
use rapport::memory::reconcile::TableOutcome;

pub fn reconcile(config: &RapportConfig, source: &str, target: &str, character: &str) -> Result<()> {
    let source = Identity::classify(source, &UuidAccountKeys).context("invalid source identity")?;
    let target = AccountKey::parse(target, &UuidAccountKeys).context("invalid target account")?;

    let conn = super::open(config)?;
    let report = rapport::memory::reconcile::reconcile(&conn, &source, &target, character);

    let kind = if source.is_anonymous() { "anonymous" } else { "account" };
    println!("Reconcile {} ({kind}) -> {} [{}]", source.as_str(), target, character);
    println!("{}", "=".repeat(50));
    for t in &report.tables {
        match &t.outcome {
            TableOutcome::Transferred { rows } => println!("  {:<20} {rows} row(s)", t.table),
            TableOutcome::Skipped { reason } => println!("  {:<20} skipped: {reason}", t.table),
            TableOutcome::Failed { error } => println!("  {:<20} FAILED: {error}", t.table),
        }
    }
    println!();
    println!("Total transferred:   {}", report.rows_transferred());

    let failed = report.failures().count();
    anyhow::ensure!(failed == 0, "{failed} table(s) failed to transfer");
    Ok(())
}
