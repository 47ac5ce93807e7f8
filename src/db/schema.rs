//! SQL DDL for all Rapport tables.
//!
//! Defines the engine's own tables (`emotional_state`, `episodic_memories`,
//! `user_facts`, `memory_triggers`, `episode_markers`, `engine_log`,
//! `schema_meta`) and the tables shared with the chat service that
//! reconciliation reassigns (`interactions`, `legacy_memories`,
//! `daily_usage`). All DDL uses `IF NOT EXISTS` for idempotent initialization.

use rusqlite::Connection;

/// All schema DDL statements for the version 1 schema.
const SCHEMA_SQL: &str = r#"
-- One row per (user, character); every dimension stays inside [0, 100]
CREATE TABLE IF NOT EXISTS emotional_state (
    user_id TEXT NOT NULL,
    character_key TEXT NOT NULL,
    affection REAL NOT NULL CHECK(affection >= 0.0 AND affection <= 100.0),
    trust REAL NOT NULL CHECK(trust >= 0.0 AND trust <= 100.0),
    jealousy REAL NOT NULL CHECK(jealousy >= 0.0 AND jealousy <= 100.0),
    playfulness REAL NOT NULL CHECK(playfulness >= 0.0 AND playfulness <= 100.0),
    clinginess REAL NOT NULL CHECK(clinginess >= 0.0 AND clinginess <= 100.0),
    total_conversations INTEGER NOT NULL DEFAULT 0 CHECK(total_conversations >= 0),
    streak_days INTEGER NOT NULL DEFAULT 0,
    last_visit_at TEXT,
    metadata TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (user_id, character_key)
);

-- Summarized episodes with a decaying salience
CREATE TABLE IF NOT EXISTS episodic_memories (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    character_key TEXT NOT NULL,
    summary TEXT NOT NULL,
    topics TEXT NOT NULL DEFAULT '[]',
    salience REAL NOT NULL CHECK(salience >= 0.0 AND salience <= 1.0),
    created_at TEXT NOT NULL,
    last_referenced_at TEXT NOT NULL,
    reference_count INTEGER NOT NULL DEFAULT 0 CHECK(reference_count >= 0)
);

CREATE INDEX IF NOT EXISTS idx_episodes_owner ON episodic_memories(user_id, character_key);
CREATE INDEX IF NOT EXISTS idx_episodes_salience ON episodic_memories(salience);

-- Externally extracted facts about the user
CREATE TABLE IF NOT EXISTS user_facts (
    user_id TEXT NOT NULL,
    character_key TEXT NOT NULL,
    display_name TEXT,
    occupation TEXT,
    favorites TEXT NOT NULL DEFAULT '{}',
    tags TEXT NOT NULL DEFAULT '[]',
    updated_at TEXT NOT NULL,
    PRIMARY KEY (user_id, character_key)
);

-- Phrases that recall an episode when they appear in a message
CREATE TABLE IF NOT EXISTS memory_triggers (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    character_key TEXT NOT NULL,
    phrase TEXT NOT NULL,
    episode_id TEXT NOT NULL REFERENCES episodic_memories(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_triggers_owner ON memory_triggers(user_id, character_key);

-- Chat log written by the chat service, read by the summarizer
CREATE TABLE IF NOT EXISTS interactions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    character_key TEXT NOT NULL,
    role TEXT NOT NULL CHECK(role IN ('user','assistant')),
    content TEXT NOT NULL,
    topics TEXT NOT NULL DEFAULT '[]',
    emotional_tone TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_interactions_owner ON interactions(user_id, character_key, created_at);

-- Free-text notes kept from before episodic memory existed
CREATE TABLE IF NOT EXISTS legacy_memories (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    character_key TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at TEXT NOT NULL
);

-- Per-day message counters
CREATE TABLE IF NOT EXISTS daily_usage (
    user_id TEXT NOT NULL,
    character_key TEXT NOT NULL,
    day TEXT NOT NULL,
    message_count INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (user_id, character_key, day)
);

-- Summarizer processed-markers: at most one episode per (user, character, day)
CREATE TABLE IF NOT EXISTS episode_markers (
    user_id TEXT NOT NULL,
    character_key TEXT NOT NULL,
    day TEXT NOT NULL,
    episode_id TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (user_id, character_key, day)
);

-- Audit log
CREATE TABLE IF NOT EXISTS engine_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    operation TEXT NOT NULL CHECK(operation IN ('delta','conversation','gift','summarize','decay','prune','reference','facts','reconcile')),
    subject TEXT NOT NULL,
    details TEXT,
    created_at TEXT NOT NULL
);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    // Set initial schema version if not already present
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}
