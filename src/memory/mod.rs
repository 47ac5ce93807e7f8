//! Memory and relationship engine: emotional state, episodes, facts, decay,
//! scoring, gifts and identity reconciliation.

pub mod bundle;
pub mod emotion;
pub mod episodes;
pub mod facts;
pub mod gifts;
pub mod maintenance;
pub mod reconcile;
pub mod scoring;
pub mod stats;
pub mod store;
pub mod summarizer;
pub mod types;
