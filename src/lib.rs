//! Persistent memory and relationship state for companion characters.
//!
//! Rapport keeps, per user and character, a five-dimension emotional vector,
//! a pool of salience-scored episodic memories, and extracted user facts. Chat
//! turns and gifts nudge the vector through an atomic add-and-clamp upsert;
//! batch jobs summarize the day's interactions into episodes and decay what
//! nobody talks about any more.
//!
//! | Dimension | Baseline | Meaning |
//! |-----------|----------|---------|
//! | affection | 50 | warmth toward the user |
//! | trust | 50 | willingness to open up |
//! | jealousy | 20 | possessiveness (lower is healthier) |
//! | playfulness | 45 | banter; best near the middle |
//! | clinginess | 30 | dependence; best near the middle |
//!
//! # Modules
//!
//! - [`config`] — TOML configuration, environment overrides, character table
//! - [`db`] — SQLite initialization, schema, migrations, and health checks
//! - [`identity`] — anonymous vs. authenticated identities
//! - [`memory`] — the engine itself
//! - [`error`] — typed errors for fact extraction and identity parsing

pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod memory;
