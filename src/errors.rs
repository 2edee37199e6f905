//! Crate-wide error taxonomy, by kind rather than by source library.
//!
//! See spec §7: `InvalidIdentifier`, `NotFound`, `IOError`, `ShadowingConflict`
//! and `JobPanic` are distinct kinds callers branch on; `AnomalyDetected` is
//! deliberately not a variant here — anomalies are data, never errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PageError {
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serde JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("shadowing conflict: {0}")]
    ShadowingConflict(String),

    #[error("index error: {0}")]
    Index(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("queue not registered: {0}")]
    NoSuchQueue(String),
}

pub type Result<T> = std::result::Result<T, PageError>;
