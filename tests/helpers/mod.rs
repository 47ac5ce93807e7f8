#![allow(dead_code)]

use chrono::{DateTime, Utc};
use rapport::db;
use rapport::memory::episodes::insert_episode;
use rapport::memory::store::record_interaction;
use rapport::memory::types::{EpisodicMemory, Role};
use rusqlite::{params, Connection};

/// Account keys accepted by `UuidAccountKeys`.
pub const ACCOUNT_A: &str = "0190f0a4-7c1e-7a55-9a11-3f6a2b8c9d01";
pub const ACCOUNT_B: &str = "0190f0a4-7c1e-7a55-9a11-3f6a2b8c9d02";

/// Open a fresh in-memory database with schema and migrations applied.
pub fn test_db() -> Connection {
    db::open_memory_database().unwrap()
}

/// Insert an episode directly. Returns its id.
pub fn insert_test_episode(
    conn: &Connection,
    user_id: &str,
    character_key: &str,
    salience: f64,
    reference_count: u32,
    last_referenced_at: DateTime<Utc>,
) -> String {
    let id = uuid::Uuid::now_v7().to_string();
    insert_episode(
        conn,
        &EpisodicMemory {
            id: id.clone(),
            user_id: user_id.to_string(),
            character_key: character_key.to_string(),
            summary: "Had a meaningful conversation".to_string(),
            topics: Default::default(),
            salience,
            created_at: last_referenced_at,
            last_referenced_at,
            reference_count,
        },
    )
    .unwrap();
    id
}

/// Append a user message tagged with `topics`.
pub fn say(conn: &Connection, user_id: &str, character_key: &str, topics: &[&str], at: DateTime<Utc>) {
    let topics: Vec<String> = topics.iter().map(|t| t.to_string()).collect();
    record_interaction(conn, user_id, character_key, Role::User, "hello", &topics, None, at).unwrap();
}

pub fn salience_of(conn: &Connection, id: &str) -> Option<f64> {
    conn.query_row(
        "SELECT salience FROM episodic_memories WHERE id = ?1",
        [id],
        |row| row.get(0),
    )
    .ok()
}

pub fn count_rows(conn: &Connection, table: &str, user_id: &str) -> i64 {
    conn.query_row(
        &format!("SELECT COUNT(*) FROM {table} WHERE user_id = ?1"),
        params![user_id],
        |row| row.get(0),
    )
    .unwrap()
}
