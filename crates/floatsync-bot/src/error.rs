//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Marketplace error: {0}")]
    Market(#[from] floatsync_market::MarketError),

    #[error("Trade client error: {0}")]
    Steam(#[from] floatsync_steam::SteamError),

    #[error("Reconciler error: {0}")]
    Reconcile(#[from] floatsync_reconcile::ReconcileError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] floatsync_telemetry::TelemetryError),

    #[error("Could not establish a web session: {0}")]
    Session(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
