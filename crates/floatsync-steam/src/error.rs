//! Trade client error types.

use thiserror::Error;

use floatsync_core::{CoreError, OfferId, OfferState};

#[derive(Debug, Error)]
pub enum SteamError {
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Web session error: {0}")]
    Session(String),

    #[error("Invalid trade URL: {0}")]
    InvalidTradeUrl(String),

    #[error("Offer rejected: {0}")]
    Rejected(String),

    #[error("Offer {0} could not be found and therefore cannot be cancelled")]
    OfferNotFound(OfferId),

    #[error("Offer {offer_id} is no longer active (state {state})")]
    OfferNotActive { offer_id: OfferId, state: OfferState },

    #[error("Confirmation failed: {0}")]
    Confirmation(String),

    #[error("Invalid secret: {0}")]
    Secret(String),

    #[error("Response parse error: {0}")]
    Parse(String),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),
}

pub type SteamResult<T> = Result<T, SteamError>;
