//! Core record types for the relationship engine.
//!
//! Defines the five-dimension [`EmotionalVector`] and its partial
//! [`EmotionalDelta`], the stored [`EmotionalState`], [`EpisodicMemory`],
//! [`UserFact`], and the [`Interaction`] rows read from the chat log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Lower bound of every emotional dimension.
pub const DIMENSION_MIN: f64 = 0.0;
/// Upper bound of every emotional dimension.
pub const DIMENSION_MAX: f64 = 100.0;

/// Clamp a dimension value into `[0, 100]`.
pub fn clamp_dimension(value: f64) -> f64 {
    if value.is_nan() {
        return DIMENSION_MIN;
    }
    value.clamp(DIMENSION_MIN, DIMENSION_MAX)
}

/// Clamp a salience value into `[0, 1]`.
pub fn clamp_salience(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

/// The relationship state for one user-character pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmotionalVector {
    pub affection: f64,
    pub trust: f64,
    pub jealousy: f64,
    pub playfulness: f64,
    pub clinginess: f64,
}

impl EmotionalVector {
    /// Character-agnostic starting point when no profile overrides it.
    pub const BASELINE: EmotionalVector = EmotionalVector {
        affection: 50.0,
        trust: 50.0,
        jealousy: 20.0,
        playfulness: 45.0,
        clinginess: 30.0,
    };

    /// Add `delta` component-wise and clamp each dimension.
    pub fn apply(&self, delta: &EmotionalDelta) -> EmotionalVector {
        EmotionalVector {
            affection: clamp_dimension(self.affection + delta.affection.unwrap_or(0.0)),
            trust: clamp_dimension(self.trust + delta.trust.unwrap_or(0.0)),
            jealousy: clamp_dimension(self.jealousy + delta.jealousy.unwrap_or(0.0)),
            playfulness: clamp_dimension(self.playfulness + delta.playfulness.unwrap_or(0.0)),
            clinginess: clamp_dimension(self.clinginess + delta.clinginess.unwrap_or(0.0)),
        }
    }

    pub fn clamped(&self) -> EmotionalVector {
        self.apply(&EmotionalDelta::default())
    }

    pub fn is_within_bounds(&self) -> bool {
        [
            self.affection,
            self.trust,
            self.jealousy,
            self.playfulness,
            self.clinginess,
        ]
        .iter()
        .all(|v| (DIMENSION_MIN..=DIMENSION_MAX).contains(v))
    }
}

impl Default for EmotionalVector {
    fn default() -> Self {
        Self::BASELINE
    }
}

/// A partial change to an [`EmotionalVector`]. Absent components are zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EmotionalDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affection: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trust: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jealousy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playfulness: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clinginess: Option<f64>,
}

impl EmotionalDelta {
    pub fn affection(mut self, value: f64) -> Self {
        self.affection = Some(value);
        self
    }

    pub fn trust(mut self, value: f64) -> Self {
        self.trust = Some(value);
        self
    }

    pub fn jealousy(mut self, value: f64) -> Self {
        self.jealousy = Some(value);
        self
    }

    pub fn playfulness(mut self, value: f64) -> Self {
        self.playfulness = Some(value);
        self
    }

    pub fn clinginess(mut self, value: f64) -> Self {
        self.clinginess = Some(value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.affection.is_none()
            && self.trust.is_none()
            && self.jealousy.is_none()
            && self.playfulness.is_none()
            && self.clinginess.is_none()
    }
}

/// A row of the `emotional_state` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmotionalState {
    pub user_id: String,
    pub character_key: String,
    #[serde(flatten)]
    pub vector: EmotionalVector,
    /// Monotonic; may be raised to the external achievement count.
    pub total_conversations: u32,
    pub streak_days: u32,
    pub last_visit_at: Option<DateTime<Utc>>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A summarized, topic-tagged unit of one day's conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodicMemory {
    /// UUID v7 primary key.
    pub id: String,
    pub user_id: String,
    pub character_key: String,
    pub summary: String,
    pub topics: BTreeSet<String>,
    /// Retention weight in `[0, 1]`.
    pub salience: f64,
    pub created_at: DateTime<Utc>,
    pub last_referenced_at: DateTime<Utc>,
    pub reference_count: u32,
}

/// Facts about a user as produced by the external extraction step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserFact {
    pub user_id: String,
    pub character_key: String,
    pub display_name: Option<String>,
    pub occupation: Option<String>,
    pub favorites: BTreeMap<String, String>,
    pub tags: BTreeSet<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Who authored an interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            _ => Err(format!("unknown role: {s}")),
        }
    }
}

/// One message from the chat subsystem's interaction log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub id: i64,
    pub user_id: String,
    pub character_key: String,
    pub role: Role,
    pub content: String,
    /// Tags assigned by the external topic extractor.
    pub topics: Vec<String>,
    pub emotional_tone: Option<String>,
    pub created_at: DateTime<Utc>,
}
