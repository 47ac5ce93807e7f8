//! Shared write path — the interaction log, usage counters, legacy notes, and
//! the audit log.
//!
//! The chat service appends to `interactions` through [`record_interaction`] and
//! bumps `daily_usage` with [`increment_daily_usage`]; the summarizer reads the
//! log back through [`interactions_between`]. Every engine mutation leaves a row
//! in `engine_log` via [`write_audit_log`].

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::db::{parse_sql_time, to_sql_time};
use crate::memory::types::{Interaction, Role};

/// Append one message to the interaction log. Returns the row id.
pub fn record_interaction(
    conn: &Connection,
    user_id: &str,
    character_key: &str,
    role: Role,
    content: &str,
    topics: &[String],
    emotional_tone: Option<&str>,
    created_at: DateTime<Utc>,
) -> Result<i64> {
    let topics_json = serde_json::to_string(topics)?;
    conn.execute(
        "INSERT INTO interactions (user_id, character_key, role, content, topics, emotional_tone, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            user_id,
            character_key,
            role.as_str(),
            content,
            topics_json,
            emotional_tone,
            to_sql_time(created_at),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Interactions for one pair with `created_at >= since`, oldest first.
pub fn interactions_since(
    conn: &Connection,
    user_id: &str,
    character_key: &str,
    since: DateTime<Utc>,
) -> Result<Vec<Interaction>> {
    query_interactions(conn, user_id, character_key, since, None)
}

/// Interactions for one pair in the half-open window `[start, end)`, oldest first.
pub fn interactions_between(
    conn: &Connection,
    user_id: &str,
    character_key: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<Interaction>> {
    query_interactions(conn, user_id, character_key, start, Some(end))
}

fn query_interactions(
    conn: &Connection,
    user_id: &str,
    character_key: &str,
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
) -> Result<Vec<Interaction>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, character_key, role, content, topics, emotional_tone, created_at \
         FROM interactions \
         WHERE user_id = ?1 AND character_key = ?2 AND created_at >= ?3 \
           AND (?4 IS NULL OR created_at < ?4) \
         ORDER BY created_at, id",
    )?;

    let rows = stmt
        .query_map(
            params![user_id, character_key, to_sql_time(start), end.map(to_sql_time)],
            |row| {
                let role: String = row.get(3)?;
                let topics: String = row.get(5)?;
                let created_at: String = row.get(7)?;
                Ok(Interaction {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    character_key: row.get(2)?,
                    // the CHECK constraint limits role to known values
                    role: role.parse().unwrap_or(Role::User),
                    content: row.get(4)?,
                    topics: serde_json::from_str(&topics).unwrap_or_else(|e| {
                        tracing::warn!(user_id, character_key, error = %e, "ignoring malformed interaction topics");
                        Vec::new()
                    }),
                    emotional_tone: row.get(6)?,
                    created_at: parse_sql_time(&created_at)?,
                })
            },
        )?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Bump the message counter for `(user, character, day of at)`. Returns the new count.
pub fn increment_daily_usage(
    conn: &Connection,
    user_id: &str,
    character_key: &str,
    at: DateTime<Utc>,
) -> Result<u32> {
    let day = at.date_naive().to_string();
    let count: u32 = conn.query_row(
        "INSERT INTO daily_usage (user_id, character_key, day, message_count) VALUES (?1, ?2, ?3, 1) \
         ON CONFLICT(user_id, character_key, day) DO UPDATE SET message_count = message_count + 1 \
         RETURNING message_count",
        params![user_id, character_key, day],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Store a free-text note in the legacy memory table. Returns its id.
pub fn append_legacy_memory(
    conn: &Connection,
    user_id: &str,
    character_key: &str,
    content: &str,
) -> Result<String> {
    let id = uuid::Uuid::now_v7().to_string();
    conn.execute(
        "INSERT INTO legacy_memories (id, user_id, character_key, content, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id, user_id, character_key, content, to_sql_time(Utc::now())],
    )?;
    Ok(id)
}

/// Write an entry to the engine_log audit table.
pub(crate) fn write_audit_log(
    conn: &Connection,
    operation: &str,
    subject: &str,
    details: Option<&serde_json::Value>,
) -> Result<()> {
    let now = to_sql_time(Utc::now());
    let details_json = details.map(|d| d.to_string());
    conn.execute(
        "INSERT INTO engine_log (operation, subject, details, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![operation, subject, details_json, now],
    )?;
    Ok(())
}

/// Audit subject for a user-character pair.
pub(crate) fn pair_subject(user_id: &str, character_key: &str) -> String {
    format!("{user_id}/{character_key}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use chrono::{Duration, TimeZone};

    fn test_db() -> Connection {
        db::open_memory_database().unwrap()
    }

    #[test]
    fn interactions_since_filters_and_orders() {
        let conn = test_db();
        let base = Utc.with_ymd_and_hms(2026, 5, 4, 8, 0, 0).unwrap();
        let tags = vec!["work".to_string()];

        record_interaction(&conn, "u1", "luna", Role::User, "old", &[], None, base - Duration::days(2)).unwrap();
        record_interaction(&conn, "u1", "luna", Role::Assistant, "second", &[], Some("warm"), base + Duration::minutes(5)).unwrap();
        record_interaction(&conn, "u1", "luna", Role::User, "first", &tags, None, base).unwrap();
        record_interaction(&conn, "u1", "aria", Role::User, "other pair", &[], None, base).unwrap();

        let rows = interactions_since(&conn, "u1", "luna", base).unwrap();
        let contents: Vec<&str> = rows.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second"]);
        assert_eq!(rows[0].topics, tags);
        assert_eq!(rows[1].role, Role::Assistant);
        assert_eq!(rows[1].emotional_tone.as_deref(), Some("warm"));
    }

    #[test]
    fn bounded_window_excludes_end() {
        let conn = test_db();
        let day = Utc.with_ymd_and_hms(2026, 5, 4, 0, 0, 0).unwrap();
        record_interaction(&conn, "u1", "luna", Role::User, "morning", &[], None, day + Duration::hours(9)).unwrap();
        record_interaction(&conn, "u1", "luna", Role::User, "midnight", &[], None, day + Duration::days(1)).unwrap();

        let rows = interactions_between(&conn, "u1", "luna", day, day + Duration::days(1)).unwrap();
        let contents: Vec<&str> = rows.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(contents, vec!["morning"]);
        assert_eq!(interactions_since(&conn, "u1", "luna", day).unwrap().len(), 2);
    }

    #[test]
    fn daily_usage_counts_per_day() {
        let conn = test_db();
        let day1 = Utc.with_ymd_and_hms(2026, 5, 4, 8, 0, 0).unwrap();
        assert_eq!(increment_daily_usage(&conn, "u1", "luna", day1).unwrap(), 1);
        assert_eq!(increment_daily_usage(&conn, "u1", "luna", day1).unwrap(), 2);
        assert_eq!(
            increment_daily_usage(&conn, "u1", "luna", day1 + Duration::days(1)).unwrap(),
            1
        );
    }

    #[test]
    fn audit_log_records_operation() {
        let conn = test_db();
        write_audit_log(&conn, "delta", &pair_subject("u1", "luna"), None).unwrap();
        let subject: String = conn
            .query_row("SELECT subject FROM engine_log WHERE operation = 'delta'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(subject, "u1/luna");
    }
}
