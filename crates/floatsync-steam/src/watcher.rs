//! Sent-offer watcher.
//!
//! Polls our sent offers and turns state changes into [`OfferEvent`]s. The
//! diffing lives in [`OfferStateTracker`] so it can be tested without a
//! network or a clock.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use floatsync_core::{OfferId, OfferState};

use crate::error::SteamResult;
use crate::mock::MockTradeClient;
use crate::offer::{OfferEvent, OfferSnapshot};
use crate::web::SteamWebClient;

/// Source of sent-offer snapshots.
pub trait OfferSource: Send + Sync {
    /// Sent offers that are active or were updated after `cutoff` (unix seconds).
    fn sent_offers(&self, cutoff: i64) -> BoxFuture<'_, SteamResult<Vec<OfferSnapshot>>>;
}

impl OfferSource for SteamWebClient {
    fn sent_offers(&self, cutoff: i64) -> BoxFuture<'_, SteamResult<Vec<OfferSnapshot>>> {
        Box::pin(async move {
            let offers = self.fetch_sent_offers(cutoff).await?;
            for offer in &offers {
                self.record_state(&offer.offer_id, offer.state);
            }
            Ok(offers)
        })
    }
}

impl OfferSource for MockTradeClient {
    fn sent_offers(&self, cutoff: i64) -> BoxFuture<'_, SteamResult<Vec<OfferSnapshot>>> {
        Box::pin(async move { self.poll_offers(cutoff) })
    }
}

/// Historical cutoff for the sent-offers feed.
///
/// Anchored at the start of the last successful poll, so offers updated
/// during a run of failed polls are still inside the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollWindow {
    anchor: i64,
    margin: i64,
}

impl PollWindow {
    /// Smallest look-back, in seconds.
    pub const MIN_MARGIN_SECS: i64 = 60;

    /// Window anchored at `started_at` (unix seconds), with a margin of two
    /// poll intervals.
    pub fn new(interval: Duration, started_at: i64) -> Self {
        let margin = i64::try_from(interval.as_secs().saturating_mul(2)).unwrap_or(i64::MAX);
        Self {
            anchor: started_at,
            margin: margin.max(Self::MIN_MARGIN_SECS),
        }
    }

    pub fn cutoff(&self) -> i64 {
        self.anchor.saturating_sub(self.margin)
    }

    /// Move the anchor to the start of a poll that succeeded.
    pub fn record_success(&mut self, poll_started_at: i64) {
        self.anchor = self.anchor.max(poll_started_at);
    }
}

/// Last seen state per offer.
#[derive(Debug, Default)]
pub struct OfferStateTracker {
    states: HashMap<OfferId, OfferState>,
}

impl OfferStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of offers being tracked.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Last seen state of an offer.
    pub fn state(&self, offer_id: &OfferId) -> Option<OfferState> {
        self.states.get(offer_id).copied()
    }

    /// Diff one poll result against the last seen states.
    ///
    /// An offer seen for the first time is reported with `old_state: None`,
    /// including on the first call. Terminal offers that drop out of the
    /// poll window are forgotten.
    pub fn observe(&mut self, offers: &[OfferSnapshot]) -> Vec<OfferEvent> {
        let mut events = Vec::new();
        let mut seen = HashSet::with_capacity(offers.len());

        for offer in offers {
            seen.insert(offer.offer_id.clone());
            let previous = self.states.insert(offer.offer_id.clone(), offer.state);

            if previous == Some(offer.state) {
                continue;
            }

            events.push(OfferEvent {
                offer_id: offer.offer_id.clone(),
                old_state: previous,
                new_state: offer.state,
                is_our_offer: offer.is_our_offer,
            });
        }

        self.states
            .retain(|id, state| seen.contains(id) || !state.is_terminal());
        events
    }
}

/// Background task that polls sent offers and forwards state changes.
pub struct OfferWatcher {
    source: Arc<dyn OfferSource>,
    interval: Duration,
    events_tx: mpsc::Sender<OfferEvent>,
    shutdown: CancellationToken,
    tracker: OfferStateTracker,
    window: PollWindow,
}

impl OfferWatcher {
    pub fn new(
        source: Arc<dyn OfferSource>,
        interval: Duration,
        events_tx: mpsc::Sender<OfferEvent>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            source,
            interval,
            events_tx,
            shutdown,
            tracker: OfferStateTracker::new(),
            window: PollWindow::new(interval, chrono::Utc::now().timestamp()),
        }
    }

    /// Run until shutdown or until the event receiver is dropped.
    pub async fn run(mut self) {
        info!(interval_ms = self.interval.as_millis() as u64, "OfferWatcher started");
        let mut ticker = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => {
                    info!("OfferWatcher shutting down");
                    return;
                }
                _ = ticker.tick() => {}
            }

            let started_at = chrono::Utc::now().timestamp();
            let cutoff = self.window.cutoff();
            let offers = match self.source.sent_offers(cutoff).await {
                Ok(offers) => offers,
                Err(e) => {
                    warn!(error = %e, cutoff, "Failed to poll sent offers");
                    continue;
                }
            };
            self.window.record_success(started_at);

            for event in self.tracker.observe(&offers) {
                debug!(
                    offer_id = %event.offer_id,
                    old_state = ?event.old_state,
                    new_state = %event.new_state,
                    "Offer state changed"
                );
                if self.events_tx.send(event).await.is_err() {
                    info!("Offer event receiver dropped, OfferWatcher stopping");
                    return;
                }
            }
        }
    }

    /// Spawn the watcher on the current runtime.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
