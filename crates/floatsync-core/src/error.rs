//! Error types for floatsync-core.

use thiserror::Error;

use crate::phase::OfferPhase;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid phase transition: {from} -> {to}")]
    InvalidTransition { from: OfferPhase, to: OfferPhase },

    #[error("Invalid trade payload: {0}")]
    InvalidTrade(String),

    #[error("Unknown offer state code: {0}")]
    UnknownOfferState(i64),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
