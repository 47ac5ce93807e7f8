use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;

use super::episodes::episodes_for_user;
use super::store::write_audit_log;
use crate::config::DecayConfig;
use crate::db::{to_sql_time, write_transaction};
use crate::memory::types::clamp_salience;

// ── Result types ─────────────────────────────────────────────────────────────

#[derive(Debug, Default, Serialize)]
pub struct DecayReport {
    pub user_id: String,
    /// `true` when this user was already decayed today and nothing was written.
    pub skipped: bool,
    pub scanned: usize,
    pub updated: usize,
    pub pruned: usize,
}

#[derive(Debug, Default, Serialize)]
pub struct DecayBatchReport {
    pub users_scanned: usize,
    pub users_skipped: usize,
    pub episodes_updated: usize,
    pub episodes_pruned: usize,
    /// Expired summarizer and decay day markers deleted after the passes.
    pub markers_pruned: usize,
    pub failures: Vec<UserFailure>,
}

#[derive(Debug, Serialize)]
pub struct UserFailure {
    pub user_id: String,
    pub error: String,
}

// ── Decay model ──────────────────────────────────────────────────────────────

/// Whole days since the last reference, never less than one.
pub fn elapsed_days(last_referenced_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - last_referenced_at).num_days().max(1)
}

/// `salience × factor^days + weight × ln(1 + reference_count)`, clamped to `[0, 1]`.
pub fn decayed_salience(salience: f64, reference_count: u32, days: i64, config: &DecayConfig) -> f64 {
    let days = days.max(1);
    let retained = salience * config.daily_factor.powi(days.min(i32::MAX as i64) as i32);
    let reinforcement = config.reinforcement_weight * (reference_count as f64).ln_1p();
    clamp_salience(retained + reinforcement)
}

// ── Passes ───────────────────────────────────────────────────────────────────

/// Decay and prune every episode owned by `user_id`.
///
/// Runs in one transaction. A second pass on the same UTC day is a no-op.
pub fn run_decay_pass(conn: &mut Connection, config: &DecayConfig, user_id: &str) -> Result<DecayReport> {
    run_decay_pass_at(conn, config, user_id, Utc::now())
}

pub fn run_decay_pass_at(
    conn: &mut Connection,
    config: &DecayConfig,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<DecayReport> {
    let day = now.date_naive().to_string();
    let now_str = to_sql_time(now);
    let mut report = DecayReport {
        user_id: user_id.to_string(),
        ..DecayReport::default()
    };

    let tx = conn.transaction()?;

    let claimed = tx.execute(
        "INSERT OR IGNORE INTO decay_runs (user_id, day, created_at) VALUES (?1, ?2, ?3)",
        params![user_id, day, now_str],
    )?;
    if claimed == 0 {
        tracing::debug!(user_id, %day, "decay already ran today");
        report.skipped = true;
        return Ok(report);
    }

    let episodes = episodes_for_user(&tx, user_id)?;
    report.scanned = episodes.len();

    for episode in &episodes {
        let days = elapsed_days(episode.last_referenced_at, now);
        let next = decayed_salience(episode.salience, episode.reference_count, days, config);
        // Small changes are not worth a write
        if (next - episode.salience).abs() > config.write_threshold {
            tx.execute(
                "UPDATE episodic_memories SET salience = ?1 WHERE id = ?2",
                params![next, episode.id],
            )?;
            report.updated += 1;
        }
    }

    let cutoff = now - chrono::Duration::days(config.prune_after_days);
    report.pruned = tx.execute(
        "DELETE FROM episodic_memories \
         WHERE user_id = ?1 AND salience < ?2 AND last_referenced_at < ?3",
        params![user_id, config.prune_salience_floor, to_sql_time(cutoff)],
    )?;

    tx.execute(
        "UPDATE decay_runs SET updated = ?1, pruned = ?2 WHERE user_id = ?3 AND day = ?4",
        params![report.updated as i64, report.pruned as i64, user_id, day],
    )?;

    if report.updated > 0 {
        write_audit_log(
            &tx,
            "decay",
            user_id,
            Some(&serde_json::json!({
                "factor": config.daily_factor,
                "scanned": report.scanned,
                "updated": report.updated,
            })),
        )?;
    }
    if report.pruned > 0 {
        write_audit_log(
            &tx,
            "prune",
            user_id,
            Some(&serde_json::json!({
                "floor": config.prune_salience_floor,
                "after_days": config.prune_after_days,
                "deleted": report.pruned,
            })),
        )?;
    }

    tx.commit()?;

    tracing::debug!(
        user_id,
        scanned = report.scanned,
        updated = report.updated,
        pruned = report.pruned,
        "decay pass complete"
    );
    Ok(report)
}

/// Run a decay pass for every user that owns episodes.
///
/// A user whose pass fails is logged and recorded; the remaining users are
/// still processed and the failed user's transaction is rolled back.
pub fn run_decay_batch(conn: &mut Connection, config: &DecayConfig) -> Result<DecayBatchReport> {
    run_decay_batch_at(conn, config, Utc::now())
}

pub fn run_decay_batch_at(
    conn: &mut Connection,
    config: &DecayConfig,
    now: DateTime<Utc>,
) -> Result<DecayBatchReport> {
    let users: Vec<String> = {
        let mut stmt =
            conn.prepare("SELECT DISTINCT user_id FROM episodic_memories ORDER BY user_id")?;
        let collected = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        collected
    };

    let mut batch = DecayBatchReport {
        users_scanned: users.len(),
        ..DecayBatchReport::default()
    };

    for user_id in users {
        match run_decay_pass_at(conn, config, &user_id, now) {
            Ok(report) if report.skipped => batch.users_skipped += 1,
            Ok(report) => {
                batch.episodes_updated += report.updated;
                batch.episodes_pruned += report.pruned;
            }
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "decay pass failed for user");
                batch.failures.push(UserFailure {
                    user_id,
                    error: e.to_string(),
                });
            }
        }
    }

    match prune_markers(conn, config.marker_retention_days, now) {
        Ok(removed) => batch.markers_pruned = removed,
        Err(e) => tracing::warn!(error = %e, "marker cleanup failed"),
    }

    tracing::info!(
        users = batch.users_scanned,
        updated = batch.episodes_updated,
        pruned = batch.episodes_pruned,
        failures = batch.failures.len(),
        "decay batch complete"
    );
    Ok(batch)
}

/// Delete `episode_markers` and `decay_runs` rows for days older than
/// `retention_days` (at least one, so today's markers always survive).
/// Returns the number of rows removed.
pub fn prune_markers(conn: &Connection, retention_days: i64, now: DateTime<Utc>) -> Result<usize> {
    let cutoff = (now - chrono::Duration::days(retention_days.max(1)))
        .date_naive()
        .to_string();

    let tx = write_transaction(conn)?;
    let summarized = tx.execute("DELETE FROM episode_markers WHERE day < ?1", params![cutoff])?;
    let decayed = tx.execute("DELETE FROM decay_runs WHERE day < ?1", params![cutoff])?;
    tx.commit()?;

    if summarized + decayed > 0 {
        tracing::debug!(summarized, decayed, %cutoff, "expired day markers removed");
    }
    Ok(summarized + decayed)
}
