//! Shared fixtures for reconciler integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use floatsync_core::{AssetId, Buyer, Contract, Item, OfferId, OfferState, Trade, TradeId, TradeState};
use floatsync_market::MockMarketApi;
use floatsync_reconcile::{spawn_reconciler, OfferLifecycle, ReconcilerConfig, ReconcilerHandle};
use floatsync_steam::{MockTradeClient, OfferEvent, OfferWatcher};
use floatsync_telemetry::RecordingNotifier;

pub struct Harness {
    pub market: Arc<MockMarketApi>,
    pub trades: Arc<MockTradeClient>,
    pub notifier: Arc<RecordingNotifier>,
    pub handle: ReconcilerHandle,
    pub join: JoinHandle<()>,
}

impl Harness {
    pub fn start() -> Self {
        let market = Arc::new(MockMarketApi::new());
        let trades = Arc::new(MockTradeClient::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let config = ReconcilerConfig::default();

        let lifecycle =
            OfferLifecycle::new(market.clone(), trades.clone(), notifier.clone(), &config);
        let (handle, join) =
            spawn_reconciler(lifecycle, trades.clone(), notifier.clone(), &config);

        Self {
            market,
            trades,
            notifier,
            handle,
            join,
        }
    }

    /// Watch the mock's sent offers and feed state changes to the actor.
    pub fn spawn_watcher(&self, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let (tx, rx) = mpsc::channel(64);
        self.handle.forward_offer_events(rx);
        OfferWatcher::new(self.trades.clone(), interval, tx, shutdown).spawn()
    }

    /// Submit a snapshot and let spawned lifecycle tasks run.
    pub async fn poll(&self, trades: Vec<Trade>) {
        self.handle.submit_snapshot(trades).await.unwrap();
        settle().await;
    }

    /// Offer id registered for a trade.
    pub async fn offer_of(&self, trade_id: &str) -> OfferId {
        self.handle
            .find(&TradeId::from(trade_id))
            .await
            .unwrap()
            .and_then(|t| t.offer)
            .expect("trade should be tracked with an offer")
    }

    /// Mark an offer accepted on the trading side and deliver the event.
    pub async fn accept_offer(&self, offer_id: &OfferId) {
        self.trades.set_offer_state(offer_id, OfferState::Accepted);
        self.handle
            .offer_changed(OfferEvent {
                offer_id: offer_id.clone(),
                old_state: Some(OfferState::Active),
                new_state: OfferState::Accepted,
                is_our_offer: true,
            })
            .await
            .unwrap();
        settle().await;
    }
}

/// Let queued messages and spawned tasks make progress.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

pub fn trade(id: &str, state: TradeState) -> Trade {
    Trade {
        id: TradeId::from(id),
        created_at: Utc::now(),
        buyer_id: "76561198000000001".to_string(),
        buyer: Buyer {
            steam_id: "76561198000000001".to_string(),
            username: "buyer".to_string(),
        },
        seller_id: "76561198000000000".to_string(),
        state,
        manual_verification: false,
        expires_at: None,
        grace_period_start: None,
        contract: Contract {
            id: format!("contract-{id}"),
            price: 2500,
            state: "sold".to_string(),
            item: Item {
                asset_id: AssetId::from("123"),
                market_hash_name: "M4A1-S | Printstream (Minimal Wear)".to_string(),
                float_value: Some(0.12),
                paint_seed: Some(301),
                wear_name: Some("Minimal Wear".to_string()),
                inspect_link: None,
                is_stattrak: false,
            },
        },
        trade_url: "https://steamcommunity.com/tradeoffer/new/?partner=40734&token=xyz"
            .to_string(),
    }
}

pub fn with_grace(mut trade: Trade, grace_period_start: DateTime<Utc>) -> Trade {
    trade.grace_period_start = Some(grace_period_start);
    trade
}
