//! Typed errors for the places where callers branch on the failure kind.
//!
//! Store and batch paths use `anyhow`; these enums cover fact extraction
//! (a failure is a normal, reportable outcome) and identity parsing.

use thiserror::Error;

/// Why an externally extracted fact payload was rejected.
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// The extractor itself failed (timeout, transport, provider error).
    #[error("fact extractor failed: {0}")]
    Extractor(String),

    /// The extractor returned nothing usable.
    #[error("fact extractor returned empty output")]
    Empty,

    /// The output is not syntactically valid JSON.
    #[error("fact payload is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    /// Valid JSON, but not the fact schema (wrong types, unknown fields, not an object).
    #[error("fact payload does not match the schema: {0}")]
    SchemaMismatch(String),
}

impl From<serde_json::Error> for ExtractionError {
    fn from(err: serde_json::Error) -> Self {
        use serde_json::error::Category;
        match err.classify() {
            Category::Syntax | Category::Eof => Self::InvalidJson(err),
            Category::Data | Category::Io => Self::SchemaMismatch(err.to_string()),
        }
    }
}

/// Identity strings that cannot be used where they were given.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("identity must not be empty")]
    Empty,

    #[error("not a valid account key: {0}")]
    NotAnAccountKey(String),
}
