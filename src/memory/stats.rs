use anyhow::Result;
use rusqlite::{params, Connection};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::memory::reconcile::RECONCILED_TABLES;

/// Response from engine_stats.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub rows_by_table: BTreeMap<String, u64>,
    pub distinct_users: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_salience: Option<f64>,
    /// Episodes currently under the pruning salience floor.
    pub episodes_below_floor: u64,
    pub db_size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_episode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newest_episode: Option<String>,
}

/// Compute engine statistics.
///
/// `db_path` is used for file size calculation; pass None for in-memory databases.
pub fn engine_stats(
    conn: &Connection,
    salience_floor: f64,
    db_path: Option<&Path>,
) -> Result<StatsResponse> {
    let mut rows_by_table = BTreeMap::new();
    for table in RECONCILED_TABLES {
        rows_by_table.insert(table.name.to_string(), count_rows(conn, table.name)?);
    }

    let distinct_users: i64 = conn.query_row(
        "SELECT COUNT(DISTINCT user_id) FROM emotional_state",
        [],
        |row| row.get(0),
    )?;
    let (mean_salience, oldest, newest) = episode_summary(conn)?;
    let below_floor: i64 = conn.query_row(
        "SELECT COUNT(*) FROM episodic_memories WHERE salience < ?1",
        params![salience_floor],
        |row| row.get(0),
    )?;

    let db_size_bytes = db_path
        .and_then(|p| std::fs::metadata(p).ok())
        .map(|m| m.len())
        .unwrap_or(0);

    Ok(StatsResponse {
        rows_by_table,
        distinct_users: distinct_users as u64,
        mean_salience,
        episodes_below_floor: below_floor as u64,
        db_size_bytes,
        oldest_episode: oldest,
        newest_episode: newest,
    })
}

fn count_rows(conn: &Connection, table: &str) -> Result<u64> {
    let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
    Ok(count as u64)
}

/// Mean salience plus oldest and newest episode timestamps.
fn episode_summary(conn: &Connection) -> Result<(Option<f64>, Option<String>, Option<String>)> {
    let summary = conn.query_row(
        "SELECT AVG(salience), MIN(created_at), MAX(created_at) FROM episodic_memories",
        [],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CharacterTable;
    use crate::db;
    use crate::memory::emotion::apply_delta;
    use crate::memory::episodes::insert_episode;
    use crate::memory::types::{EmotionalDelta, EpisodicMemory};
    use chrono::Utc;

    fn insert(conn: &Connection, id: &str, salience: f64) {
        let now = Utc::now();
        insert_episode(
            conn,
            &EpisodicMemory {
                id: id.to_string(),
                user_id: "u1".into(),
                character_key: "luna".into(),
                summary: "Had a meaningful conversation".into(),
                topics: Default::default(),
                salience,
                created_at: now,
                last_referenced_at: now,
                reference_count: 0,
            },
        )
        .unwrap();
    }

    #[test]
    fn test_empty_db_stats() {
        let conn = db::open_memory_database().unwrap();
        let stats = engine_stats(&conn, 0.05, None).unwrap();
        assert_eq!(stats.distinct_users, 0);
        assert_eq!(stats.rows_by_table["episodic_memories"], 0);
        assert_eq!(stats.rows_by_table.len(), RECONCILED_TABLES.len());
        assert!(stats.mean_salience.is_none());
        assert!(stats.oldest_episode.is_none());
    }

    #[test]
    fn test_stats_counts_and_salience() {
        let conn = db::open_memory_database().unwrap();
        insert(&conn, "a", 0.02);
        insert(&conn, "b", 0.5);
        apply_delta(&conn, &CharacterTable::default(), "u1", "luna", &EmotionalDelta::default()).unwrap();
        apply_delta(&conn, &CharacterTable::default(), "u2", "luna", &EmotionalDelta::default()).unwrap();

        let stats = engine_stats(&conn, 0.05, None).unwrap();
        assert_eq!(stats.rows_by_table["episodic_memories"], 2);
        assert_eq!(stats.rows_by_table["emotional_state"], 2);
        assert_eq!(stats.distinct_users, 2);
        assert_eq!(stats.episodes_below_floor, 1);
        assert!((stats.mean_salience.unwrap() - 0.26).abs() < 1e-9);
        assert!(stats.newest_episode.is_some());
    }
}
