//! Read model handed to prompt assembly: facts, emotional state, and the most
//! salient episodes for one user-character pair.

use anyhow::Result;
use rusqlite::Connection;
use serde::Serialize;

use crate::config::CharacterTable;
use crate::memory::scoring::{compute_relationship_score, RelationshipScore};
use crate::memory::types::{EmotionalVector, EpisodicMemory, UserFact};

#[derive(Debug, Serialize)]
pub struct MemoryBundle {
    pub facts: Option<UserFact>,
    /// Stored vector, or the character baseline when the pair has no state yet.
    pub emotional_state: EmotionalVector,
    pub total_conversations: u32,
    pub relationship: RelationshipScore,
    pub episodes: Vec<EpisodicMemory>,
}

/// Assemble the bundle. Missing rows degrade to defaults, never to errors.
pub fn get_memory_bundle(
    conn: &Connection,
    characters: &CharacterTable,
    user_id: &str,
    character_key: &str,
    episode_limit: usize,
) -> Result<MemoryBundle> {
    let facts = super::facts::get_facts(conn, user_id, character_key)?;
    let (emotional_state, total_conversations) =
        super::emotion::current_vector(conn, characters, user_id, character_key)?;
    let episodes = super::episodes::list_episodes(conn, user_id, character_key, episode_limit)?;

    Ok(MemoryBundle {
        facts,
        emotional_state,
        total_conversations,
        relationship: compute_relationship_score(&emotional_state, total_conversations),
        episodes,
    })
}
