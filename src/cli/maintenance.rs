//! CLI maintenance commands: `decay` and `summarize` for the nightly batch jobs.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};

use rapport::config::RapportConfig;
use rapport::memory::{maintenance, summarizer};

/// Run a decay and prune pass for every user.
pub fn decay(config: &RapportConfig) -> Result<()> {
    let mut conn = super::open(config)?;

    println!("Applying salience decay...");
    let report = maintenance::run_decay_batch(&mut conn, &config.decay)?;

    println!("  Users scanned:     {}", report.users_scanned);
    println!("  Already run today: {}", report.users_skipped);
    println!("  Episodes decayed:  {}", report.episodes_updated);
    println!("  Episodes pruned:   {}", report.episodes_pruned);
    println!("  Markers expired:   {}", report.markers_pruned);

    if !report.failures.is_empty() {
        println!();
        println!("Failed users:");
        for failure in &report.failures {
            println!("  {:<38} {}", failure.user_id, failure.error);
        }
    }

    Ok(())
}

/// Summarize every active pair's interactions since `since`.
pub fn summarize(config: &RapportConfig, since: Option<&str>) -> Result<()> {
    let since = match since {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .with_context(|| format!("invalid --since timestamp: {raw}"))?
            .with_timezone(&Utc),
        None => Utc::now() - Duration::hours(config.summarizer.lookback_hours),
    };

    let mut conn = super::open(config)?;

    println!("Summarizing interactions since {}...", since.to_rfc3339());
    let report = summarizer::run_summarizer(&mut conn, &config.summarizer, since)?;

    println!("  Pairs scanned:        {}", report.pairs_scanned);
    println!("  Episodes created:     {}", report.episodes_created);
    println!("  Already summarized:   {}", report.already_processed);
    println!("  Too few interactions: {}", report.too_few_interactions);
    if report.failures > 0 {
        println!("  Failures:             {} (see log)", report.failures);
    }

    Ok(())
}
