//! Relationship score and stage.
//!
//! ```text
//! score = 0.3·affection + 0.3·trust + 0.15·(100 − jealousy)
//!       + g(playfulness, 50, 0.15) + g(clinginess, 30, 0.10)
//! g(x, opt, w) = −0.1·|opt − x| + w·opt
//! ```
//!
//! clamped to `[0, 100]`. Fewer than five conversations always reads as
//! [`RelationshipStage::GettingToKnow`], whatever the score.

use anyhow::Result;
use rusqlite::Connection;
use serde::{Serialize, Serializer};

use crate::config::CharacterTable;
use crate::memory::types::EmotionalVector;

const AFFECTION_WEIGHT: f64 = 0.3;
const TRUST_WEIGHT: f64 = 0.3;
const CALM_WEIGHT: f64 = 0.15;
const PLAYFULNESS_OPTIMUM: f64 = 50.0;
const PLAYFULNESS_WEIGHT: f64 = 0.15;
const CLINGINESS_OPTIMUM: f64 = 30.0;
const CLINGINESS_WEIGHT: f64 = 0.10;
const DEVIATION_PENALTY: f64 = 0.1;

/// Conversations needed before the score decides the stage.
pub const MIN_CONVERSATIONS_FOR_STAGE: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipStage {
    GettingToKnow,
    CasualAcquaintance,
    GrowingConnection,
    CloseBond,
    DeepRelationship,
    SoulmateConnection,
}

impl RelationshipStage {
    pub fn label(&self) -> &'static str {
        match self {
            Self::GettingToKnow => "Getting to Know Each Other",
            Self::CasualAcquaintance => "Casual Acquaintance",
            Self::GrowingConnection => "Growing Connection",
            Self::CloseBond => "Close Bond",
            Self::DeepRelationship => "Deep Relationship",
            Self::SoulmateConnection => "Soulmate Connection",
        }
    }

    pub fn from_score(score: f64, conversations: u32) -> Self {
        if conversations < MIN_CONVERSATIONS_FOR_STAGE {
            Self::GettingToKnow
        } else if score < 30.0 {
            Self::CasualAcquaintance
        } else if score < 50.0 {
            Self::GrowingConnection
        } else if score < 70.0 {
            Self::CloseBond
        } else if score < 85.0 {
            Self::DeepRelationship
        } else {
            Self::SoulmateConnection
        }
    }
}

impl std::fmt::Display for RelationshipStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for RelationshipStage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RelationshipScore {
    pub score: f64,
    pub stage: RelationshipStage,
}

/// Reward closeness to `optimum`: `−0.1·|optimum − x| + weight·optimum`.
fn optimum_term(value: f64, optimum: f64, weight: f64) -> f64 {
    -DEVIATION_PENALTY * (optimum - value).abs() + weight * optimum
}

/// Score a vector. Pure; no side effects.
pub fn compute_relationship_score(vector: &EmotionalVector, conversations: u32) -> RelationshipScore {
    let raw = AFFECTION_WEIGHT * vector.affection
        + TRUST_WEIGHT * vector.trust
        + CALM_WEIGHT * (100.0 - vector.jealousy)
        + optimum_term(vector.playfulness, PLAYFULNESS_OPTIMUM, PLAYFULNESS_WEIGHT)
        + optimum_term(vector.clinginess, CLINGINESS_OPTIMUM, CLINGINESS_WEIGHT);
    let score = if raw.is_nan() { 0.0 } else { raw.clamp(0.0, 100.0) };

    RelationshipScore {
        score,
        stage: RelationshipStage::from_score(score, conversations),
    }
}

/// Score the stored state for a pair; a missing row scores as the baseline
/// with zero conversations.
pub fn relationship_for(
    conn: &Connection,
    characters: &CharacterTable,
    user_id: &str,
    character_key: &str,
) -> Result<RelationshipScore> {
    let (vector, conversations) =
        super::emotion::current_vector(conn, characters, user_id, character_key)?;
    Ok(compute_relationship_score(&vector, conversations))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(a: f64, t: f64, j: f64, p: f64, c: f64) -> EmotionalVector {
        EmotionalVector {
            affection: a,
            trust: t,
            jealousy: j,
            playfulness: p,
            clinginess: c,
        }
    }

    #[test]
    fn worked_example_is_deep_relationship() {
        // 24 + 24 + 15 + 7.5 + 3
        let out = compute_relationship_score(&vector(80.0, 80.0, 0.0, 50.0, 30.0), 20);
        assert!((out.score - 73.5).abs() < 1e-9);
        assert_eq!(out.stage, RelationshipStage::DeepRelationship);
        assert_eq!(out.stage.label(), "Deep Relationship");
    }

    #[test]
    fn few_conversations_override_score() {
        let out = compute_relationship_score(&vector(100.0, 100.0, 0.0, 50.0, 30.0), 4);
        assert!(out.score > 85.0);
        assert_eq!(out.stage, RelationshipStage::GettingToKnow);
    }

    #[test]
    fn stage_boundaries() {
        assert_eq!(RelationshipStage::from_score(29.99, 5), RelationshipStage::CasualAcquaintance);
        assert_eq!(RelationshipStage::from_score(30.0, 5), RelationshipStage::GrowingConnection);
        assert_eq!(RelationshipStage::from_score(50.0, 5), RelationshipStage::CloseBond);
        assert_eq!(RelationshipStage::from_score(70.0, 5), RelationshipStage::DeepRelationship);
        assert_eq!(RelationshipStage::from_score(85.0, 5), RelationshipStage::SoulmateConnection);
    }

    #[test]
    fn deviation_is_penalised() {
        let ideal = compute_relationship_score(&vector(50.0, 50.0, 20.0, 50.0, 30.0), 10);
        let off = compute_relationship_score(&vector(50.0, 50.0, 20.0, 90.0, 80.0), 10);
        assert!((ideal.score - off.score - 9.0).abs() < 1e-9);
    }

    #[test]
    fn worst_vector_clamps_to_zero() {
        let out = compute_relationship_score(&vector(0.0, 0.0, 100.0, 0.0, 100.0), 10);
        assert!(out.score >= 0.0);
        assert_eq!(out.stage, RelationshipStage::CasualAcquaintance);
    }

    #[test]
    fn stage_serializes_as_label() {
        let json = serde_json::to_string(&RelationshipStage::CloseBond).unwrap();
        assert_eq!(json, "\"Close Bond\"");
    }
}
