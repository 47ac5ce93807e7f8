//! Daily episode summarizer.
//!
//! Turns a window of interaction records into a single [`EpisodicMemory`]
//! with a heuristic one-line summary and a topic-weighted salience. Each
//! (user, character, day) yields at most one episode: the processed-marker
//! row in `episode_markers` is inserted in the same transaction as the
//! episode, so a rerun for the same day finds the marker and writes nothing.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;
use std::collections::BTreeSet;

use super::store::{interactions_between, pair_subject, write_audit_log};
use crate::config::SummarizerConfig;
use crate::db::to_sql_time;
use crate::memory::types::{clamp_salience, EpisodicMemory, Interaction, Role};

const BASE_SALIENCE: f64 = 0.3;
const PER_INTERACTION: f64 = 0.02;
const INTERACTION_CAP: f64 = 0.3;

/// Topic bonuses added to the base salience.
const TOPIC_WEIGHTS: &[(&str, f64)] = &[
    ("relationship", 0.2),
    ("intimate", 0.2),
    ("emotions", 0.15),
    ("family", 0.1),
];

/// Summary phrases in priority order.
const TOPIC_SUMMARIES: &[(&str, &str)] = &[
    ("work", "Talked about work and career"),
    ("relationship", "Talked about our relationship"),
    ("emotions", "Shared feelings and emotions"),
    ("hobbies", "Chatted about hobbies and interests"),
];

const FALLBACK_SUMMARY: &str = "Had a meaningful conversation";
const LONG_QUALIFIER: &str = " (long conversation)";

#[derive(Debug, Default, Serialize)]
pub struct SummarizeReport {
    pub pairs_scanned: usize,
    pub episodes_created: usize,
    /// Pairs whose day already had an episode.
    pub already_processed: usize,
    /// Pairs below the minimum interaction count.
    pub too_few_interactions: usize,
    pub failures: usize,
}

/// Salience of an episode built from `interaction_count` records tagged with `topics`.
pub fn compute_salience(interaction_count: usize, topics: &BTreeSet<String>) -> f64 {
    let volume = (interaction_count as f64 * PER_INTERACTION).min(INTERACTION_CAP);
    let topical: f64 = TOPIC_WEIGHTS
        .iter()
        .filter(|(topic, _)| topics.contains(*topic))
        .map(|(_, weight)| weight)
        .sum();
    clamp_salience(BASE_SALIENCE + volume + topical)
}

/// One-line summary chosen by topic priority.
pub fn summarize_topics(
    topics: &BTreeSet<String>,
    user_message_count: usize,
    long_threshold: usize,
) -> String {
    let mut summary = TOPIC_SUMMARIES
        .iter()
        .find(|(topic, _)| topics.contains(*topic))
        .map(|(_, text)| text.to_string())
        .unwrap_or_else(|| FALLBACK_SUMMARY.to_string());
    if user_message_count > long_threshold {
        summary.push_str(LONG_QUALIFIER);
    }
    summary
}

fn topic_union(records: &[Interaction]) -> BTreeSet<String> {
    records
        .iter()
        .flat_map(|r| r.topics.iter())
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Summarize the pair's interactions in the day-long window starting at
/// `since` into one episode.
///
/// Returns `None` when there are too few records or the day (UTC date of
/// `since`) has already been summarized.
pub fn summarize_day(
    conn: &mut Connection,
    config: &SummarizerConfig,
    user_id: &str,
    character_key: &str,
    since: DateTime<Utc>,
) -> Result<Option<EpisodicMemory>> {
    summarize_day_at(conn, config, user_id, character_key, since, Utc::now())
}

pub(crate) fn summarize_day_at(
    conn: &mut Connection,
    config: &SummarizerConfig,
    user_id: &str,
    character_key: &str,
    since: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<Option<EpisodicMemory>> {
    let records = interactions_between(conn, user_id, character_key, since, window_end(since))?;
    if records.len() < config.min_interactions.max(2) {
        tracing::debug!(user_id, character_key, count = records.len(), "too few interactions to summarize");
        return Ok(None);
    }

    let topics = topic_union(&records);
    let user_messages = records.iter().filter(|r| r.role == Role::User).count();
    let summary = summarize_topics(&topics, user_messages, config.long_conversation_messages);
    let salience = compute_salience(records.len(), &topics);
    let day = since.date_naive().to_string();

    let episode = EpisodicMemory {
        id: uuid::Uuid::now_v7().to_string(),
        user_id: user_id.to_string(),
        character_key: character_key.to_string(),
        summary,
        topics,
        salience,
        created_at: now,
        last_referenced_at: now,
        reference_count: 0,
    };

    let tx = conn.transaction()?;

    let claimed = tx.execute(
        "INSERT OR IGNORE INTO episode_markers (user_id, character_key, day, episode_id, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![user_id, character_key, day, episode.id, to_sql_time(now)],
    )?;
    if claimed == 0 {
        tracing::debug!(user_id, character_key, %day, "day already summarized");
        return Ok(None);
    }

    super::episodes::insert_episode(&tx, &episode)?;
    write_audit_log(
        &tx,
        "summarize",
        &pair_subject(user_id, character_key),
        Some(&serde_json::json!({
            "episode_id": episode.id,
            "day": day,
            "interactions": records.len(),
            "salience": salience,
        })),
    )?;
    tx.commit()?;

    tracing::info!(
        user_id,
        character_key,
        episode_id = %episode.id,
        salience,
        "episode created"
    );
    Ok(Some(episode))
}

/// Summarize every pair with interactions in the window starting at `since`.
/// A failing pair is logged and counted; the batch continues.
pub fn run_summarizer(
    conn: &mut Connection,
    config: &SummarizerConfig,
    since: DateTime<Utc>,
) -> Result<SummarizeReport> {
    let pairs = active_pairs(conn, since)?;
    let now = Utc::now();
    let mut report = SummarizeReport {
        pairs_scanned: pairs.len(),
        ..SummarizeReport::default()
    };

    for (user_id, character_key) in &pairs {
        match summarize_pair(conn, config, user_id, character_key, since, now) {
            Ok((_, Some(_))) => report.episodes_created += 1,
            Ok((true, None)) => report.already_processed += 1,
            Ok((false, None)) => report.too_few_interactions += 1,
            Err(e) => {
                tracing::warn!(user_id = %user_id, character_key = %character_key, error = %e, "summarizer failed for pair");
                report.failures += 1;
            }
        }
    }

    tracing::info!(
        pairs = report.pairs_scanned,
        created = report.episodes_created,
        failures = report.failures,
        "summarizer batch complete"
    );
    Ok(report)
}

/// Whether the pair's day was already summarized, then the summarize attempt.
fn summarize_pair(
    conn: &mut Connection,
    config: &SummarizerConfig,
    user_id: &str,
    character_key: &str,
    since: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(bool, Option<EpisodicMemory>)> {
    let already = marker_exists(conn, user_id, character_key, since)?;
    let episode = summarize_day_at(conn, config, user_id, character_key, since, now)?;
    Ok((already, episode))
}

/// End of the window that starts at `since`: one day later, matching the
/// per-day marker key.
fn window_end(since: DateTime<Utc>) -> DateTime<Utc> {
    since + Duration::days(1)
}

/// Distinct (user, character) pairs with interactions in the window.
fn active_pairs(conn: &Connection, since: DateTime<Utc>) -> Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT user_id, character_key FROM interactions \
         WHERE created_at >= ?1 AND created_at < ?2 ORDER BY user_id, character_key",
    )?;
    let pairs = stmt
        .query_map(params![to_sql_time(since), to_sql_time(window_end(since))], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(pairs)
}

fn marker_exists(
    conn: &Connection,
    user_id: &str,
    character_key: &str,
    since: DateTime<Utc>,
) -> Result<bool> {
    let exists = conn.query_row(
        "SELECT COUNT(*) > 0 FROM episode_markers WHERE user_id = ?1 AND character_key = ?2 AND day = ?3",
        params![user_id, character_key, since.date_naive().to_string()],
        |row| row.get(0),
    )?;
    Ok(exists)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::memory::store::record_interaction;
    use chrono::{Duration, TimeZone};

    fn test_db() -> Connection {
        db::open_memory_database().unwrap()
    }

    fn day_start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 10, 0, 0, 0).unwrap()
    }

    fn add(conn: &Connection, user: &str, role: Role, topics: &[&str], minutes: i64) {
        let topics: Vec<String> = topics.iter().map(|t| t.to_string()).collect();
        record_interaction(
            conn,
            user,
            "luna",
            role,
            "message",
            &topics,
            None,
            day_start() + Duration::minutes(minutes),
        )
        .unwrap();
    }

    fn topics(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn salience_formula() {
        assert!((compute_salience(3, &topics(&[])) - 0.36).abs() < 1e-9);
        assert!((compute_salience(3, &topics(&["relationship"])) - 0.56).abs() < 1e-9);
        // volume term caps at 0.3
        assert!((compute_salience(100, &topics(&[])) - 0.6).abs() < 1e-9);
        // every bonus at once clamps to 1
        let all = topics(&["relationship", "intimate", "emotions", "family"]);
        assert_eq!(compute_salience(50, &all), 1.0);
    }

    #[test]
    fn summary_priority_and_long_qualifier() {
        assert_eq!(
            summarize_topics(&topics(&["hobbies", "work"]), 2, 5),
            "Talked about work and career"
        );
        assert_eq!(
            summarize_topics(&topics(&["emotions", "hobbies"]), 2, 5),
            "Shared feelings and emotions"
        );
        assert_eq!(summarize_topics(&topics(&["weather"]), 5, 5), FALLBACK_SUMMARY);
        assert_eq!(
            summarize_topics(&topics(&[]), 6, 5),
            "Had a meaningful conversation (long conversation)"
        );
    }

    #[test]
    fn single_interaction_produces_nothing() {
        let mut conn = test_db();
        add(&conn, "u1", Role::User, &["relationship"], 1);

        let out = summarize_day(&mut conn, &SummarizerConfig::default(), "u1", "luna", day_start()).unwrap();
        assert!(out.is_none());
    }

    #[test]
    fn three_interactions_with_relationship_topic() {
        let mut conn = test_db();
        add(&conn, "u1", Role::User, &["relationship"], 1);
        add(&conn, "u1", Role::Assistant, &[], 2);
        add(&conn, "u1", Role::User, &["work"], 3);

        let episode = summarize_day(&mut conn, &SummarizerConfig::default(), "u1", "luna", day_start())
            .unwrap()
            .expect("episode");

        assert!(episode.salience >= 0.56 - 1e-9);
        assert_eq!(episode.summary, "Talked about work and career");
        assert!(episode.topics.contains("relationship"));
        assert_eq!(episode.reference_count, 0);

        let stored: f64 = conn
            .query_row("SELECT salience FROM episodic_memories WHERE id = ?1", [&episode.id], |row| row.get(0))
            .unwrap();
        assert_eq!(stored, episode.salience);
    }

    #[test]
    fn rerun_same_day_is_a_no_op() {
        let mut conn = test_db();
        add(&conn, "u1", Role::User, &[], 1);
        add(&conn, "u1", Role::Assistant, &[], 2);

        let config = SummarizerConfig::default();
        assert!(summarize_day(&mut conn, &config, "u1", "luna", day_start()).unwrap().is_some());
        assert!(summarize_day(&mut conn, &config, "u1", "luna", day_start()).unwrap().is_none());

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM episodic_memories", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn batch_reports_each_pair() {
        let mut conn = test_db();
        add(&conn, "u1", Role::User, &[], 1);
        add(&conn, "u1", Role::Assistant, &[], 2);
        add(&conn, "u2", Role::User, &[], 1);

        let config = SummarizerConfig::default();
        let report = run_summarizer(&mut conn, &config, day_start()).unwrap();
        assert_eq!(report.pairs_scanned, 2);
        assert_eq!(report.episodes_created, 1);
        assert_eq!(report.too_few_interactions, 1);
        assert_eq!(report.failures, 0);

        let again = run_summarizer(&mut conn, &config, day_start()).unwrap();
        assert_eq!(again.episodes_created, 0);
        assert_eq!(again.already_processed, 1);
    }

    #[test]
    fn backfill_ignores_later_days() {
        let mut conn = test_db();
        let config = SummarizerConfig::default();
        add(&conn, "u1", Role::User, &["work"], 60);
        add(&conn, "u1", Role::Assistant, &[], 61);
        // next day: two more messages that belong to their own episode
        add(&conn, "u1", Role::User, &["family"], 24 * 60 + 10);
        add(&conn, "u1", Role::Assistant, &[], 24 * 60 + 11);

        let first = summarize_day(&mut conn, &config, "u1", "luna", day_start()).unwrap().unwrap();
        assert!(!first.topics.contains("family"));
        assert!((first.salience - 0.34).abs() < 1e-9);

        let second = summarize_day(&mut conn, &config, "u1", "luna", day_start() + Duration::days(1))
            .unwrap()
            .unwrap();
        assert!(!second.topics.contains("work"));
    }

    #[test]
    fn batch_isolates_failing_pair() {
        let mut conn = test_db();
        let config = SummarizerConfig::default();
        add(&conn, "u1", Role::User, &[], 1);
        add(&conn, "u1", Role::Assistant, &[], 2);
        add(&conn, "u2", Role::User, &[], 1);
        add(&conn, "u2", Role::Assistant, &[], 2);
        // sorts inside the window but cannot be parsed
        conn.execute(
            "UPDATE interactions SET created_at = '2026-07-10Tbroken' WHERE user_id = 'u2' AND role = 'assistant'",
            [],
        )
        .unwrap();

        let report = run_summarizer(&mut conn, &config, day_start()).unwrap();
        assert_eq!(report.pairs_scanned, 2);
        assert_eq!(report.episodes_created, 1);
        assert_eq!(report.failures, 1);
        assert!(!marker_exists(&conn, "u2", "luna", day_start()).unwrap());

        conn.execute(
            "UPDATE interactions SET created_at = ?1 WHERE created_at = '2026-07-10Tbroken'",
            [to_sql_time(day_start() + Duration::minutes(2))],
        )
        .unwrap();
        let retry = run_summarizer(&mut conn, &config, day_start()).unwrap();
        assert_eq!(retry.episodes_created, 1);
        assert_eq!(retry.already_processed, 1);
        assert_eq!(retry.failures, 0);
    }
}
