//! Shared error taxonomy.
//!
//! Validation and risk-refusal outcomes are business-as-usual results,
//! not errors — components return `Ok(None)` or a status value with a
//! reason for those. `QtxError` is reserved for upstream failures a
//! caller must retry or handle, and for invariant violations that are
//! fatal to the owning component.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QtxError {
    #[error("upstream call failed: {0}")]
    Upstream(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl QtxError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, QtxError::Invariant(_))
    }
}
