use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::memory::types::EmotionalVector;

/// Key of the character profile used when a character has no entry of its own.
pub const DEFAULT_CHARACTER: &str = "default";

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RapportConfig {
    pub logging: LoggingConfig,
    pub storage: StorageConfig,
    pub decay: DecayConfig,
    pub summarizer: SummarizerConfig,
    pub characters: CharacterTable,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DecayConfig {
    /// Per-day retention factor applied to salience.
    pub daily_factor: f64,
    /// Weight of the `ln(1 + reference_count)` reinforcement term.
    pub reinforcement_weight: f64,
    /// Salience changes at or below this are not written back.
    pub write_threshold: f64,
    pub prune_salience_floor: f64,
    pub prune_after_days: i64,
    /// Summarizer and decay day markers older than this are deleted.
    pub marker_retention_days: i64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SummarizerConfig {
    /// Minimum interactions in the window before an episode is produced.
    pub min_interactions: usize,
    /// User-authored messages above this count mark a long conversation.
    pub long_conversation_messages: usize,
    /// Window used by the batch job when no explicit cutoff is given.
    pub lookback_hours: i64,
}

/// Per-character baseline vector and gift weighting.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct CharacterProfile {
    pub baseline: EmotionalVector,
    pub gift_weights: GiftWeights,
}

/// How a gift multiplier is spread across the emotional dimensions.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct GiftWeights {
    pub affection: f64,
    pub trust: f64,
    pub playfulness: f64,
    pub clinginess: f64,
    pub jealousy_reduction: f64,
}

/// Character key → profile lookup with a guaranteed fallback entry.
#[derive(Debug, Deserialize, Clone)]
#[serde(from = "HashMap<String, CharacterProfile>")]
pub struct CharacterTable {
    profiles: HashMap<String, CharacterProfile>,
}

impl CharacterTable {
    /// Profile for `character_key`, or the `default` profile if unknown.
    pub fn profile(&self, character_key: &str) -> &CharacterProfile {
        self.profiles
            .get(character_key)
            .or_else(|| self.profiles.get(DEFAULT_CHARACTER))
            .unwrap_or(&FALLBACK_PROFILE)
    }

    pub fn baseline(&self, character_key: &str) -> EmotionalVector {
        self.profile(character_key).baseline
    }

    pub fn insert(&mut self, character_key: impl Into<String>, profile: CharacterProfile) {
        self.profiles.insert(character_key.into(), profile);
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }
}

static FALLBACK_PROFILE: CharacterProfile = CharacterProfile {
    baseline: EmotionalVector::BASELINE,
    gift_weights: GiftWeights::DEFAULT,
};

impl From<HashMap<String, CharacterProfile>> for CharacterTable {
    fn from(mut profiles: HashMap<String, CharacterProfile>) -> Self {
        profiles
            .entry(DEFAULT_CHARACTER.to_string())
            .or_insert_with(CharacterProfile::default);
        Self { profiles }
    }
}

impl Default for RapportConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            storage: StorageConfig::default(),
            decay: DecayConfig::default(),
            summarizer: SummarizerConfig::default(),
            characters: CharacterTable::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_rapport_dir()
            .join("rapport.db")
            .to_string_lossy()
            .into_owned();
        Self { db_path }
    }
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            daily_factor: 0.985,
            reinforcement_weight: 0.05,
            write_threshold: 0.01,
            prune_salience_floor: 0.05,
            prune_after_days: 30,
            marker_retention_days: 90,
        }
    }
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            min_interactions: 2,
            long_conversation_messages: 5,
            lookback_hours: 24,
        }
    }
}

impl GiftWeights {
    pub const DEFAULT: GiftWeights = GiftWeights {
        affection: 2.0,
        trust: 1.0,
        playfulness: 1.0,
        clinginess: 0.5,
        jealousy_reduction: 1.0,
    };
}

impl Default for GiftWeights {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl Default for CharacterProfile {
    fn default() -> Self {
        Self {
            baseline: EmotionalVector::BASELINE,
            gift_weights: GiftWeights::DEFAULT,
        }
    }
}

impl Default for CharacterTable {
    fn default() -> Self {
        HashMap::new().into()
    }
}

/// Returns `~/.rapport/`, or `./.rapport` when no home directory is known.
pub fn default_rapport_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".rapport")
}

/// Returns the default config file path: `~/.rapport/config.toml`
pub fn default_config_path() -> PathBuf {
    default_rapport_dir().join("config.toml")
}

impl RapportConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            RapportConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides (RAPPORT_DB, RAPPORT_LOG_LEVEL).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("RAPPORT_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("RAPPORT_LOG_LEVEL") {
            self.logging.level = val;
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = RapportConfig::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.decay.daily_factor, 0.985);
        assert_eq!(config.decay.prune_after_days, 30);
        assert_eq!(config.summarizer.min_interactions, 2);
        assert!(config.storage.db_path.ends_with("rapport.db"));
    }

    #[test]
    fn default_character_table_has_fallback() {
        let table = CharacterTable::default();
        let profile = table.profile("someone-unknown");
        assert_eq!(profile.baseline.jealousy, 20.0);
        assert_eq!(profile.baseline.playfulness, 45.0);
        assert_eq!(profile.gift_weights, GiftWeights::DEFAULT);
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[logging]
level = "debug"

[storage]
db_path = "/tmp/test.db"

[decay]
prune_after_days = 45

[characters.luna.baseline]
affection = 60.0
jealousy = 35.0

[characters.luna.gift_weights]
affection = 3.0
trust = 0.5
"#;
        let config: RapportConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.storage.db_path, "/tmp/test.db");
        assert_eq!(config.decay.prune_after_days, 45);
        // defaults still apply for unset fields
        assert_eq!(config.decay.daily_factor, 0.985);

        let luna = config.characters.profile("luna");
        assert_eq!(luna.baseline.affection, 60.0);
        assert_eq!(luna.baseline.jealousy, 35.0);
        assert_eq!(luna.baseline.playfulness, 45.0);
        assert_eq!(luna.gift_weights.affection, 3.0);
        assert_eq!(luna.gift_weights.jealousy_reduction, 1.0);

        // the default entry is always present
        assert!(config.characters.keys().any(|k| k == DEFAULT_CHARACTER));
    }

    #[test]
    fn configured_default_entry_overrides_fallback() {
        let toml_str = r#"
[characters.default.baseline]
trust = 10.0
"#;
        let config: RapportConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.characters.baseline("anyone").trust, 10.0);
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = RapportConfig::default();
        std::env::set_var("RAPPORT_DB", "/tmp/override.db");
        std::env::set_var("RAPPORT_LOG_LEVEL", "trace");

        config.apply_env_overrides();

        assert_eq!(config.storage.db_path, "/tmp/override.db");
        assert_eq!(config.logging.level, "trace");

        // Clean up
        std::env::remove_var("RAPPORT_DB");
        std::env::remove_var("RAPPORT_LOG_LEVEL");
    }
}
