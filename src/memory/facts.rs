//! User facts from the external extraction step.
//!
//! The extractor is a black box that returns raw text. [`parse_facts`]
//! accepts exactly one JSON object matching [`ExtractedFacts`] (optionally
//! wrapped in a Markdown code fence) and turns every other shape into an
//! [`ExtractionError`]. Stored facts merge: newer scalars win, favorites merge
//! by key, tags accumulate.

use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::store::{pair_subject, write_audit_log};
use crate::db::{parse_sql_time, to_sql_time, write_transaction};
use crate::error::ExtractionError;
use crate::memory::types::UserFact;

/// Produces fact JSON from recent conversation text.
pub trait FactExtractor {
    fn extract(&self, conversation: &str) -> Result<String, ExtractionError>;
}

/// The schema the extractor must produce.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractedFacts {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub occupation: Option<String>,
    #[serde(default)]
    pub favorites: BTreeMap<String, String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

/// Result of [`extract_and_store`]. Extraction failures are a normal outcome.
#[derive(Debug)]
pub enum FactOutcome {
    Stored(UserFact),
    Failed(ExtractionError),
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // drop the info string ("json") on the opening line
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse extractor output into [`ExtractedFacts`].
pub fn parse_facts(raw: &str) -> Result<ExtractedFacts, ExtractionError> {
    let body = strip_code_fence(raw);
    if body.is_empty() {
        return Err(ExtractionError::Empty);
    }

    let value: serde_json::Value = serde_json::from_str(body)?;
    if !value.is_object() {
        return Err(ExtractionError::SchemaMismatch(
            "expected a JSON object".to_string(),
        ));
    }

    let facts: ExtractedFacts = serde_json::from_value(value)?;
    Ok(ExtractedFacts {
        display_name: non_blank(facts.display_name),
        occupation: non_blank(facts.occupation),
        favorites: facts
            .favorites
            .into_iter()
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .filter(|(k, v)| !k.is_empty() && !v.is_empty())
            .collect(),
        tags: facts
            .tags
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect(),
    })
}

/// Fetch stored facts for a pair.
pub fn get_facts(conn: &Connection, user_id: &str, character_key: &str) -> Result<Option<UserFact>> {
    let fact = conn
        .query_row(
            "SELECT user_id, character_key, display_name, occupation, favorites, tags, updated_at \
             FROM user_facts WHERE user_id = ?1 AND character_key = ?2",
            params![user_id, character_key],
            |row| {
                let favorites: String = row.get(4)?;
                let tags: String = row.get(5)?;
                let updated_at: String = row.get(6)?;
                Ok(UserFact {
                    user_id: row.get(0)?,
                    character_key: row.get(1)?,
                    display_name: row.get(2)?,
                    occupation: row.get(3)?,
                    favorites: stored_column(&favorites, "favorites", user_id, character_key),
                    tags: stored_column(&tags, "tags", user_id, character_key),
                    updated_at: Some(parse_sql_time(&updated_at)?),
                })
            },
        )
        .optional()?;
    Ok(fact)
}

/// Decode a JSON column, falling back to empty when the stored text is malformed.
fn stored_column<T: DeserializeOwned + Default>(
    raw: &str,
    column: &str,
    user_id: &str,
    character_key: &str,
) -> T {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        tracing::warn!(user_id, character_key, column, error = %e, "ignoring malformed user_facts column");
        T::default()
    })
}

/// Merge `facts` into the stored row and return the result.
pub fn merge_facts(
    conn: &Connection,
    user_id: &str,
    character_key: &str,
    facts: ExtractedFacts,
) -> Result<UserFact> {
    let tx = write_transaction(conn)?;

    let mut merged = get_facts(&tx, user_id, character_key)?.unwrap_or_else(|| UserFact {
        user_id: user_id.to_string(),
        character_key: character_key.to_string(),
        ..UserFact::default()
    });
    if facts.display_name.is_some() {
        merged.display_name = facts.display_name;
    }
    if facts.occupation.is_some() {
        merged.occupation = facts.occupation;
    }
    merged.favorites.extend(facts.favorites);
    merged.tags.extend(facts.tags);
    let now = Utc::now();
    merged.updated_at = Some(now);

    tx.execute(
        "INSERT INTO user_facts (user_id, character_key, display_name, occupation, favorites, tags, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
         ON CONFLICT(user_id, character_key) DO UPDATE SET \
             display_name = excluded.display_name, \
             occupation = excluded.occupation, \
             favorites = excluded.favorites, \
             tags = excluded.tags, \
             updated_at = excluded.updated_at",
        params![
            user_id,
            character_key,
            merged.display_name,
            merged.occupation,
            serde_json::to_string(&merged.favorites)?,
            serde_json::to_string(&merged.tags)?,
            to_sql_time(now),
        ],
    )?;
    write_audit_log(&tx, "facts", &pair_subject(user_id, character_key), None)?;
    tx.commit()?;

    Ok(merged)
}

/// Run the extractor over `conversation` and store whatever it yields.
///
/// Extraction and parse failures come back as [`FactOutcome::Failed`];
/// only storage errors are returned as `Err`.
pub fn extract_and_store(
    conn: &Connection,
    extractor: &dyn FactExtractor,
    user_id: &str,
    character_key: &str,
    conversation: &str,
) -> Result<FactOutcome> {
    let parsed = extractor.extract(conversation).and_then(|raw| parse_facts(&raw));
    match parsed {
        Ok(facts) => Ok(FactOutcome::Stored(merge_facts(conn, user_id, character_key, facts)?)),
        Err(e) => {
            tracing::warn!(user_id, character_key, error = %e, "fact extraction rejected");
            Ok(FactOutcome::Failed(e))
        }
    }
}
