//! Gift and tip bonus calculator.
//!
//! Maps an amount (minor currency units) to a tier multiplier, then spreads
//! the multiplier across the emotional dimensions using the character's
//! [`GiftWeights`] from configuration.

use anyhow::Result;
use rusqlite::Connection;
use serde::Serialize;

use super::emotion::add_delta;
use super::store::{pair_subject, write_audit_log};
use crate::config::{CharacterTable, GiftWeights};
use crate::db::write_transaction;
use crate::memory::types::{EmotionalDelta, EmotionalVector};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GiftTier {
    Small,
    Medium,
    Large,
    Epic,
}

impl GiftTier {
    pub fn for_amount(amount: u64) -> Self {
        if amount >= 5000 {
            Self::Epic
        } else if amount >= 2000 {
            Self::Large
        } else if amount >= 800 {
            Self::Medium
        } else {
            Self::Small
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
            Self::Epic => "epic",
        }
    }
}

impl std::fmt::Display for GiftTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the user sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GiftKind {
    Tip,
    Gift,
}

impl std::str::FromStr for GiftKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tip" => Ok(Self::Tip),
            "gift" => Ok(Self::Gift),
            _ => Err(format!("unknown gift kind: {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GiftBonus {
    pub kind: GiftKind,
    pub tier: GiftTier,
    pub multiplier: u32,
    pub deltas: EmotionalDelta,
}

#[derive(Debug, Clone, Serialize)]
pub struct GiftOutcome {
    pub bonus: GiftBonus,
    pub vector: EmotionalVector,
}

/// Tier multiplier: fixed for medium and up, `max(1, amount / 200)` for small.
pub fn tier_multiplier(tier: GiftTier, amount: u64) -> u32 {
    match tier {
        GiftTier::Epic => 5,
        GiftTier::Large => 4,
        GiftTier::Medium => 3,
        GiftTier::Small => (amount / 200).max(1) as u32,
    }
}

fn weighted_delta(weights: &GiftWeights, multiplier: u32) -> EmotionalDelta {
    let m = multiplier as f64;
    EmotionalDelta::default()
        .affection(weights.affection * m)
        .trust(weights.trust * m)
        .playfulness(weights.playfulness * m)
        .clinginess(weights.clinginess * m)
        .jealousy(-weights.jealousy_reduction * m)
}

/// Compute the bonus for a gift. Unknown characters use the `default` weights.
pub fn calculate_bonus(
    amount: u64,
    kind: GiftKind,
    character_key: &str,
    characters: &CharacterTable,
) -> GiftBonus {
    let tier = GiftTier::for_amount(amount);
    let multiplier = tier_multiplier(tier, amount);
    let weights = characters.profile(character_key).gift_weights;

    GiftBonus {
        kind,
        tier,
        multiplier,
        deltas: weighted_delta(&weights, multiplier),
    }
}

/// Compute the bonus and apply it to the pair's emotional state.
///
/// The delta and the gift audit entry commit in one transaction.
pub fn apply_gift(
    conn: &Connection,
    characters: &CharacterTable,
    user_id: &str,
    character_key: &str,
    amount: u64,
    kind: GiftKind,
) -> Result<GiftOutcome> {
    let bonus = calculate_bonus(amount, kind, character_key, characters);

    let tx = write_transaction(conn)?;
    let vector = add_delta(&tx, characters, user_id, character_key, &bonus.deltas)?;
    write_audit_log(
        &tx,
        "gift",
        &pair_subject(user_id, character_key),
        Some(&serde_json::json!({
            "amount": amount,
            "kind": bonus.kind,
            "tier": bonus.tier,
            "multiplier": bonus.multiplier,
        })),
    )?;
    tx.commit()?;
    tracing::info!(user_id, character_key, amount, tier = %bonus.tier, "gift applied");

    Ok(GiftOutcome { bonus, vector })
}
