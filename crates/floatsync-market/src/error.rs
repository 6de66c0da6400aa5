//! Marketplace error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MarketError {
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Response parse error: {0}")]
    Parse(String),

    #[error("Invalid proxy configuration: {0}")]
    Proxy(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type MarketResult<T> = Result<T, MarketError>;
