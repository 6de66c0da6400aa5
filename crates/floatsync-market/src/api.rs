//! Marketplace abstraction used by the reconciler.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use parking_lot::Mutex;

use floatsync_core::{Trade, TradeId};

use crate::error::{MarketError, MarketResult};
use crate::snapshot::TradesSnapshot;

/// Marketplace operations the reconciler depends on.
///
/// Allows unit testing the reconciler against a scripted marketplace.
pub trait MarketApi: Send + Sync {
    /// Fetch the current "trades to send" queue.
    fn fetch_trades_to_send(&self) -> BoxFuture<'_, MarketResult<TradesSnapshot>>;

    /// Accept a queued sale. Idempotent on the marketplace side.
    fn accept_trade<'a>(&'a self, trade_id: &'a TradeId) -> BoxFuture<'a, MarketResult<()>>;
}

/// Arc wrapper for MarketApi trait objects.
pub type DynMarketApi = Arc<dyn MarketApi>;

/// Scripted marketplace for testing.
#[derive(Debug, Default)]
pub struct MockMarketApi {
    /// Trades returned by the next fetch.
    trades: Mutex<Vec<Trade>>,
    /// Whether fetches fail.
    fail_fetch: Mutex<bool>,
    /// Remaining accept failures per trade.
    accept_failures: Mutex<HashMap<TradeId, usize>>,
    /// Accept attempts per trade.
    accept_calls: Mutex<HashMap<TradeId, usize>>,
    /// Number of fetches.
    fetch_calls: Mutex<usize>,
}

impl MockMarketApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the queue returned by subsequent fetches.
    pub fn set_trades(&self, trades: Vec<Trade>) {
        *self.trades.lock() = trades;
    }

    /// Make subsequent fetches fail (or succeed again).
    pub fn set_fail_fetch(&self, fail: bool) {
        *self.fail_fetch.lock() = fail;
    }

    /// Fail the next `count` accept attempts for `trade_id`.
    pub fn fail_accepts(&self, trade_id: &TradeId, count: usize) {
        self.accept_failures.lock().insert(trade_id.clone(), count);
    }

    /// Number of accept attempts made for `trade_id`.
    pub fn accept_calls(&self, trade_id: &TradeId) -> usize {
        self.accept_calls
            .lock()
            .get(trade_id)
            .copied()
            .unwrap_or_default()
    }

    /// Number of fetches made.
    pub fn fetch_calls(&self) -> usize {
        *self.fetch_calls.lock()
    }
}

impl MarketApi for MockMarketApi {
    fn fetch_trades_to_send(&self) -> BoxFuture<'_, MarketResult<TradesSnapshot>> {
        Box::pin(async move {
            *self.fetch_calls.lock() += 1;
            if *self.fail_fetch.lock() {
                return Err(MarketError::HttpClient("mock fetch failure".to_string()));
            }
            Ok(TradesSnapshot::from_trades(self.trades.lock().clone()))
        })
    }

    fn accept_trade<'a>(&'a self, trade_id: &'a TradeId) -> BoxFuture<'a, MarketResult<()>> {
        Box::pin(async move {
            *self
                .accept_calls
                .lock()
                .entry(trade_id.clone())
                .or_default() += 1;

            let mut failures = self.accept_failures.lock();
            match failures.get_mut(trade_id) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    Err(MarketError::Status {
                        status: 503,
                        body: "mock accept failure".to_string(),
                    })
                }
                _ => Ok(()),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_accept_failures_then_success() {
        let mock = MockMarketApi::new();
        let id = TradeId::from("T1");
        mock.fail_accepts(&id, 2);

        assert!(mock.accept_trade(&id).await.is_err());
        assert!(mock.accept_trade(&id).await.is_err());
        assert!(mock.accept_trade(&id).await.is_ok());
        assert_eq!(mock.accept_calls(&id), 3);
    }

    #[tokio::test]
    async fn test_mock_fetch_failure() {
        let mock = MockMarketApi::new();
        mock.set_fail_fetch(true);
        assert!(mock.fetch_trades_to_send().await.is_err());
        mock.set_fail_fetch(false);
        assert!(mock.fetch_trades_to_send().await.unwrap().trades.is_empty());
        assert_eq!(mock.fetch_calls(), 2);
    }
}
