//! Marketplace poll loop.
//!
//! Fetches the "trades to send" queue on a fixed interval (first tick
//! immediately) and hands well-formed trades to the reconciler. A failed
//! fetch skips the cycle without touching reconciler state.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use floatsync_market::{DynMarketApi, TradesSnapshot};
use floatsync_telemetry::{DynNotifier, Metrics};

use crate::engine::ReconcilerHandle;
use crate::error::ReconcileResult;

pub struct MarketPoller {
    market: DynMarketApi,
    reconciler: ReconcilerHandle,
    notifier: DynNotifier,
    interval: Duration,
    shutdown: CancellationToken,
}

impl MarketPoller {
    pub fn new(
        market: DynMarketApi,
        reconciler: ReconcilerHandle,
        notifier: DynNotifier,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            market,
            reconciler,
            notifier,
            interval,
            shutdown,
        }
    }

    /// Run one poll cycle.
    ///
    /// Only a stopped reconciler is an error; marketplace failures are
    /// notified and swallowed.
    pub async fn poll_once(&self) -> ReconcileResult<()> {
        let snapshot = match self.market.fetch_trades_to_send().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                Metrics::poll_cycle(false);
                error!(error = %e, "Failed to fetch trades to send");
                self.notifier.notify("Error while getting trades to send.");
                return Ok(());
            }
        };

        self.report_quarantined(&snapshot);

        debug!(
            trades = snapshot.trades.len(),
            pending_offers = snapshot.pending_offers,
            "Fetched trades to send"
        );
        self.reconciler.submit_snapshot(snapshot.trades).await?;
        Metrics::poll_cycle(true);
        Ok(())
    }

    fn report_quarantined(&self, snapshot: &TradesSnapshot) {
        for entry in &snapshot.quarantined {
            Metrics::entry_quarantined();
            let label = entry
                .trade_id
                .clone()
                .unwrap_or_else(|| format!("#{}", entry.index));
            warn!(entry = %label, reason = %entry.reason, "Quarantined trade entry");
            self.notifier.notify(&format!(
                "Skipped malformed trade {label}: {}. Please check it manually.",
                entry.reason
            ));
        }
    }

    /// Poll until shutdown or until the reconciler stops.
    pub async fn run(self) {
        info!(interval_ms = self.interval.as_millis() as u64, "MarketPoller started");
        let mut ticker = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => {
                    info!("MarketPoller shutting down");
                    return;
                }
                _ = ticker.tick() => {}
            }

            if self.poll_once().await.is_err() {
                warn!("Reconciler stopped, MarketPoller exiting");
                return;
            }
        }
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use floatsync_market::MockMarketApi;
    use floatsync_steam::MockTradeClient;
    use floatsync_telemetry::RecordingNotifier;

    use crate::config::ReconcilerConfig;
    use crate::engine::spawn_reconciler;
    use crate::lifecycle::OfferLifecycle;

    fn setup() -> (Arc<MockMarketApi>, Arc<RecordingNotifier>, MarketPoller) {
        let market = Arc::new(MockMarketApi::new());
        let trades = Arc::new(MockTradeClient::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let config = ReconcilerConfig::default();

        let lifecycle =
            OfferLifecycle::new(market.clone(), trades.clone(), notifier.clone(), &config);
        let (handle, _join) = spawn_reconciler(lifecycle, trades, notifier.clone(), &config);

        let poller = MarketPoller::new(
            market.clone(),
            handle,
            notifier.clone(),
            config.poll_interval,
            CancellationToken::new(),
        );
        (market, notifier, poller)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_failure_notifies_and_skips() {
        let (market, notifier, poller) = setup();
        market.set_fail_fetch(true);

        poller.poll_once().await.unwrap();
        assert_eq!(
            notifier.count_containing("Error while getting trades to send."),
            1
        );
        assert_eq!(market.fetch_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_immediately_then_every_interval() {
        let (market, _notifier, poller) = setup();
        let shutdown = poller.shutdown.clone();
        let join = poller.spawn();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(market.fetch_calls(), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(market.fetch_calls(), 2);

        shutdown.cancel();
        join.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_quarantined_entries_are_notified() {
        let (_market, notifier, poller) = setup();
        let snapshot = TradesSnapshot::from_me_body(serde_json::json!({
            "trades_to_send": [{ "id": "T9", "state": "queued" }]
        }))
        .unwrap();

        poller.report_quarantined(&snapshot);
        assert_eq!(notifier.count_containing("Skipped malformed trade T9"), 1);
    }
}
