//! Emotional state updater.
//!
//! Every write is a single `INSERT ... ON CONFLICT DO UPDATE ... RETURNING`
//! statement: a missing row is seeded from the character's baseline, an
//! existing row has each component added and clamped to `[0, 100]` by SQLite
//! itself. Two writers on the same key therefore never lose an update, and no
//! caller ever reads the vector before writing it.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use super::store::{pair_subject, write_audit_log};
use crate::config::CharacterTable;
use crate::db::{parse_sql_time, to_sql_time, write_transaction};
use crate::memory::types::{EmotionalDelta, EmotionalState, EmotionalVector};

/// Visit counters after [`record_conversation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VisitCounters {
    pub total_conversations: u32,
    pub streak_days: u32,
}

/// NaN components count as no change.
fn component(value: Option<f64>) -> f64 {
    value.filter(|v| !v.is_nan()).unwrap_or(0.0)
}

/// Add `delta` to the pair's emotional vector and return the stored result.
///
/// Out-of-range deltas are absorbed by clamping; they are never an error.
/// The upsert and its audit row commit together: an `Err` means nothing was
/// stored, so the caller may retry.
pub fn apply_delta(
    conn: &Connection,
    characters: &CharacterTable,
    user_id: &str,
    character_key: &str,
    delta: &EmotionalDelta,
) -> Result<EmotionalVector> {
    let tx = write_transaction(conn)?;
    let vector = add_delta(&tx, characters, user_id, character_key, delta)?;
    tx.commit()?;

    tracing::debug!(user_id, character_key, ?vector, "emotional delta applied");
    Ok(vector)
}

/// Upsert plus `delta` audit row, without transaction control. Callers that
/// need to add their own rows atomically run this inside their transaction.
pub(crate) fn add_delta(
    conn: &Connection,
    characters: &CharacterTable,
    user_id: &str,
    character_key: &str,
    delta: &EmotionalDelta,
) -> Result<EmotionalVector> {
    let sanitized = EmotionalDelta {
        affection: Some(component(delta.affection)),
        trust: Some(component(delta.trust)),
        jealousy: Some(component(delta.jealousy)),
        playfulness: Some(component(delta.playfulness)),
        clinginess: Some(component(delta.clinginess)),
    };
    let seeded = characters
        .baseline(character_key)
        .clamped()
        .apply(&sanitized);
    let now = to_sql_time(Utc::now());

    let vector = conn.query_row(
        "INSERT INTO emotional_state \
             (user_id, character_key, affection, trust, jealousy, playfulness, clinginess, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8) \
         ON CONFLICT(user_id, character_key) DO UPDATE SET \
             affection = MAX(0.0, MIN(100.0, affection + ?9)), \
             trust = MAX(0.0, MIN(100.0, trust + ?10)), \
             jealousy = MAX(0.0, MIN(100.0, jealousy + ?11)), \
             playfulness = MAX(0.0, MIN(100.0, playfulness + ?12)), \
             clinginess = MAX(0.0, MIN(100.0, clinginess + ?13)), \
             updated_at = ?8 \
         RETURNING affection, trust, jealousy, playfulness, clinginess",
        params![
            user_id,
            character_key,
            seeded.affection,
            seeded.trust,
            seeded.jealousy,
            seeded.playfulness,
            seeded.clinginess,
            now,
            component(delta.affection),
            component(delta.trust),
            component(delta.jealousy),
            component(delta.playfulness),
            component(delta.clinginess),
        ],
        read_vector,
    )?;

    write_audit_log(
        conn,
        "delta",
        &pair_subject(user_id, character_key),
        Some(&serde_json::to_value(delta)?),
    )?;
    Ok(vector)
}

/// Count a conversation and maintain the daily visit streak.
///
/// Same UTC day keeps the streak, the following day extends it, any longer
/// gap restarts it at 1.
pub fn record_conversation(
    conn: &Connection,
    characters: &CharacterTable,
    user_id: &str,
    character_key: &str,
    at: DateTime<Utc>,
) -> Result<VisitCounters> {
    let baseline = characters.baseline(character_key).clamped();
    let at = to_sql_time(at);

    let tx = write_transaction(conn)?;
    let counters = tx.query_row(
        "INSERT INTO emotional_state \
             (user_id, character_key, affection, trust, jealousy, playfulness, clinginess, \
              total_conversations, streak_days, last_visit_at, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, 1, ?8, ?8, ?8) \
         ON CONFLICT(user_id, character_key) DO UPDATE SET \
             total_conversations = total_conversations + 1, \
             streak_days = CASE \
                 WHEN last_visit_at IS NULL THEN 1 \
                 WHEN date(last_visit_at) = date(?8) THEN MAX(streak_days, 1) \
                 WHEN date(last_visit_at) = date(?8, '-1 day') THEN streak_days + 1 \
                 ELSE 1 END, \
             last_visit_at = ?8, \
             updated_at = ?8 \
         RETURNING total_conversations, streak_days",
        params![
            user_id,
            character_key,
            baseline.affection,
            baseline.trust,
            baseline.jealousy,
            baseline.playfulness,
            baseline.clinginess,
            at,
        ],
        |row| {
            Ok(VisitCounters {
                total_conversations: row.get(0)?,
                streak_days: row.get(1)?,
            })
        },
    )?;

    write_audit_log(
        &tx,
        "conversation",
        &pair_subject(user_id, character_key),
        Some(&serde_json::to_value(counters)?),
    )?;
    tx.commit()?;

    Ok(counters)
}

/// Raise the conversation counter to an externally authoritative count.
/// The stored value never goes down.
pub fn sync_conversation_count(
    conn: &Connection,
    characters: &CharacterTable,
    user_id: &str,
    character_key: &str,
    authoritative: u32,
) -> Result<u32> {
    let baseline = characters.baseline(character_key).clamped();
    let now = to_sql_time(Utc::now());

    let total = conn.query_row(
        "INSERT INTO emotional_state \
             (user_id, character_key, affection, trust, jealousy, playfulness, clinginess, \
              total_conversations, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9) \
         ON CONFLICT(user_id, character_key) DO UPDATE SET \
             total_conversations = MAX(total_conversations, ?8), \
             updated_at = ?9 \
         RETURNING total_conversations",
        params![
            user_id,
            character_key,
            baseline.affection,
            baseline.trust,
            baseline.jealousy,
            baseline.playfulness,
            baseline.clinginess,
            authoritative,
            now,
        ],
        |row| row.get(0),
    )?;

    Ok(total)
}

/// Fetch the stored state for a pair, if any.
pub fn get_state(
    conn: &Connection,
    user_id: &str,
    character_key: &str,
) -> Result<Option<EmotionalState>> {
    let state = conn
        .query_row(
            "SELECT user_id, character_key, affection, trust, jealousy, playfulness, clinginess, \
                    total_conversations, streak_days, last_visit_at, metadata, created_at, updated_at \
             FROM emotional_state WHERE user_id = ?1 AND character_key = ?2",
            params![user_id, character_key],
            |row| {
                let last_visit: Option<String> = row.get(9)?;
                let metadata: Option<String> = row.get(10)?;
                let created_at: String = row.get(11)?;
                let updated_at: String = row.get(12)?;
                Ok(EmotionalState {
                    user_id: row.get(0)?,
                    character_key: row.get(1)?,
                    vector: EmotionalVector {
                        affection: row.get(2)?,
                        trust: row.get(3)?,
                        jealousy: row.get(4)?,
                        playfulness: row.get(5)?,
                        clinginess: row.get(6)?,
                    },
                    total_conversations: row.get(7)?,
                    streak_days: row.get(8)?,
                    last_visit_at: last_visit.as_deref().map(parse_sql_time).transpose()?,
                    metadata: metadata.as_deref().and_then(|raw| {
                        parse_metadata(raw, user_id, character_key)
                    }),
                    created_at: parse_sql_time(&created_at)?,
                    updated_at: parse_sql_time(&updated_at)?,
                })
            },
        )
        .optional()?;
    Ok(state)
}

/// Replace the pair's free-form metadata. Returns `false` when the pair has
/// no state row yet.
pub fn set_metadata(
    conn: &Connection,
    user_id: &str,
    character_key: &str,
    metadata: &serde_json::Value,
) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE emotional_state SET metadata = ?1, updated_at = ?2 \
         WHERE user_id = ?3 AND character_key = ?4",
        params![metadata.to_string(), to_sql_time(Utc::now()), user_id, character_key],
    )?;
    Ok(updated > 0)
}

fn parse_metadata(raw: &str, user_id: &str, character_key: &str) -> Option<serde_json::Value> {
    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(user_id, character_key, error = %e, "ignoring malformed emotional_state metadata");
            None
        }
    }
}

/// The pair's vector and conversation count, falling back to the character
/// baseline with zero conversations when no row exists.
pub fn current_vector(
    conn: &Connection,
    characters: &CharacterTable,
    user_id: &str,
    character_key: &str,
) -> Result<(EmotionalVector, u32)> {
    Ok(match get_state(conn, user_id, character_key)? {
        Some(state) => (state.vector, state.total_conversations),
        None => (characters.baseline(character_key).clamped(), 0),
    })
}

fn read_vector(row: &rusqlite::Row<'_>) -> rusqlite::Result<EmotionalVector> {
    Ok(EmotionalVector {
        affection: row.get(0)?,
        trust: row.get(1)?,
        jealousy: row.get(2)?,
        playfulness: row.get(3)?,
        clinginess: row.get(4)?,
    })
}
