//! Episode rows, reference events, and recall triggers.
//!
//! A *reference event* is any recall of an episode: it increments
//! `reference_count` and moves `last_referenced_at` forward, which both slows
//! decay and postpones pruning. Triggers are phrases linked to an episode;
//! [`fire_triggers`] turns a phrase appearing in a new message into a
//! reference event.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeSet;

use super::store::write_audit_log;
use crate::db::{parse_sql_time, to_sql_time, write_transaction};
use crate::memory::types::{clamp_salience, EpisodicMemory};

const EPISODE_COLUMNS: &str = "id, user_id, character_key, summary, topics, salience, \
                               created_at, last_referenced_at, reference_count";

/// Insert a fully formed episode row.
pub fn insert_episode(conn: &Connection, episode: &EpisodicMemory) -> Result<()> {
    let topics = serde_json::to_string(&episode.topics)?;
    conn.execute(
        "INSERT INTO episodic_memories \
             (id, user_id, character_key, summary, topics, salience, created_at, last_referenced_at, reference_count) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            episode.id,
            episode.user_id,
            episode.character_key,
            episode.summary,
            topics,
            clamp_salience(episode.salience),
            to_sql_time(episode.created_at),
            to_sql_time(episode.last_referenced_at),
            episode.reference_count,
        ],
    )?;
    Ok(())
}

pub fn get_episode(conn: &Connection, id: &str) -> Result<Option<EpisodicMemory>> {
    let episode = conn
        .query_row(
            &format!("SELECT {EPISODE_COLUMNS} FROM episodic_memories WHERE id = ?1"),
            params![id],
            read_episode,
        )
        .optional()?;
    Ok(episode)
}

/// Episodes for a pair, most salient first, then most recently referenced.
pub fn list_episodes(
    conn: &Connection,
    user_id: &str,
    character_key: &str,
    limit: usize,
) -> Result<Vec<EpisodicMemory>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {EPISODE_COLUMNS} FROM episodic_memories \
         WHERE user_id = ?1 AND character_key = ?2 \
         ORDER BY salience DESC, last_referenced_at DESC \
         LIMIT ?3"
    ))?;
    let episodes = stmt
        .query_map(params![user_id, character_key, limit as i64], read_episode)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(episodes)
}

/// Every episode owned by `user_id`, across characters.
pub(crate) fn episodes_for_user(conn: &Connection, user_id: &str) -> Result<Vec<EpisodicMemory>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {EPISODE_COLUMNS} FROM episodic_memories WHERE user_id = ?1 ORDER BY id"
    ))?;
    let episodes = stmt
        .query_map(params![user_id], read_episode)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(episodes)
}

/// Record a reference event on each episode. Returns how many rows matched.
/// All bumps and the audit row commit together.
pub fn mark_referenced(conn: &Connection, episode_ids: &[String], at: DateTime<Utc>) -> Result<usize> {
    let at = to_sql_time(at);
    let tx = write_transaction(conn)?;
    let mut touched = 0;
    for id in episode_ids {
        touched += tx.execute(
            "UPDATE episodic_memories \
             SET reference_count = reference_count + 1, last_referenced_at = MAX(last_referenced_at, ?1) \
             WHERE id = ?2",
            params![at, id],
        )?;
    }
    if touched > 0 {
        write_audit_log(
            &tx,
            "reference",
            &format!("batch:{touched}"),
            Some(&serde_json::json!({ "episode_ids": episode_ids })),
        )?;
    }
    tx.commit()?;
    Ok(touched)
}

/// Link a recall phrase to one of the pair's episodes. Returns the trigger id.
pub fn add_trigger(
    conn: &Connection,
    user_id: &str,
    character_key: &str,
    phrase: &str,
    episode_id: &str,
) -> Result<String> {
    let phrase = phrase.trim().to_lowercase();
    if phrase.is_empty() {
        bail!("trigger phrase must not be empty");
    }

    let owned: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM episodic_memories WHERE id = ?1 AND user_id = ?2 AND character_key = ?3",
        params![episode_id, user_id, character_key],
        |row| row.get(0),
    )?;
    if !owned {
        bail!("episode not found for {user_id}/{character_key}: {episode_id}");
    }

    let id = uuid::Uuid::now_v7().to_string();
    conn.execute(
        "INSERT INTO memory_triggers (id, user_id, character_key, phrase, episode_id, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![id, user_id, character_key, phrase, episode_id, to_sql_time(Utc::now())],
    )?;
    Ok(id)
}

/// Mark every episode whose trigger phrase occurs in `message` as referenced.
/// Returns the recalled episode ids.
pub fn fire_triggers(
    conn: &Connection,
    user_id: &str,
    character_key: &str,
    message: &str,
    at: DateTime<Utc>,
) -> Result<Vec<String>> {
    let haystack = message.to_lowercase();
    let triggers: Vec<(String, String)> = {
        let mut stmt = conn.prepare(
            "SELECT phrase, episode_id FROM memory_triggers WHERE user_id = ?1 AND character_key = ?2",
        )?;
        let rows = stmt
            .query_map(params![user_id, character_key], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        rows
    };

    let recalled: BTreeSet<String> = triggers
        .into_iter()
        .filter(|(phrase, _)| haystack.contains(phrase.as_str()))
        .map(|(_, episode_id)| episode_id)
        .collect();
    let recalled: Vec<String> = recalled.into_iter().collect();

    if !recalled.is_empty() {
        mark_referenced(conn, &recalled, at)?;
        tracing::debug!(user_id, character_key, count = recalled.len(), "triggers fired");
    }
    Ok(recalled)
}

fn read_episode(row: &rusqlite::Row<'_>) -> rusqlite::Result<EpisodicMemory> {
    let topics: String = row.get(4)?;
    let created_at: String = row.get(6)?;
    let last_referenced_at: String = row.get(7)?;
    Ok(EpisodicMemory {
        id: row.get(0)?,
        user_id: row.get(1)?,
        character_key: row.get(2)?,
        summary: row.get(3)?,
        topics: serde_json::from_str(&topics).unwrap_or_default(),
        salience: row.get(5)?,
        created_at: parse_sql_time(&created_at)?,
        last_referenced_at: parse_sql_time(&last_referenced_at)?,
        reference_count: row.get(8)?,
    })
}
