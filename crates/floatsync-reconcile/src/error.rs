//! Reconciler error types.

use thiserror::Error;

use floatsync_core::{AssetId, CoreError, TradeId};
use floatsync_market::MarketError;
use floatsync_steam::SteamError;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Marketplace error: {0}")]
    Market(#[from] MarketError),

    #[error("Trade client error: {0}")]
    Steam(#[from] SteamError),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    #[error("Offer for trade {trade_id} would carry {actual:?} instead of asset {expected}")]
    AssetMismatch {
        trade_id: TradeId,
        expected: AssetId,
        actual: Vec<AssetId>,
    },

    #[error("Reconciler is not running")]
    ChannelClosed,
}

pub type ReconcileResult<T> = Result<T, ReconcileError>;
