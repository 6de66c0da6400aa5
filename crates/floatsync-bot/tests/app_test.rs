//! End-to-end run of the application against scripted services.
//!
//! Marketplace poll -> accept -> offer sent -> watcher sees acceptance ->
//! reconciler marks the trade completed -> shutdown.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use floatsync_bot::app::Services;
use floatsync_bot::{AppConfig, Application};
use floatsync_core::{AssetId, Buyer, Contract, Item, OfferState, Trade, TradeId, TradeState};
use floatsync_market::MockMarketApi;
use floatsync_steam::MockTradeClient;
use floatsync_telemetry::RecordingNotifier;

const CONFIG: &str = r#"
[market]
api_key = "market-key"

[steam]
api_key = "steam-key"
steam_id = 76561198000000000
identity_secret = "MDEyMzQ1Njc4OWFiY2RlZmdoaWo="
login_secure = "cookie"
session_id = "session"
watch_interval_secs = 10
"#;

fn queued_trade(id: &str) -> Trade {
    Trade {
        id: TradeId::from(id),
        created_at: Utc::now(),
        buyer_id: "76561198000000001".to_string(),
        buyer: Buyer {
            steam_id: "76561198000000001".to_string(),
            username: "buyer".to_string(),
        },
        seller_id: "76561198000000000".to_string(),
        state: TradeState::Queued,
        manual_verification: false,
        expires_at: None,
        grace_period_start: None,
        contract: Contract {
            id: format!("contract-{id}"),
            price: 1200,
            state: "sold".to_string(),
            item: Item {
                asset_id: AssetId::from("555"),
                market_hash_name: "AK-47 | Redline (Field-Tested)".to_string(),
                float_value: Some(0.2),
                paint_seed: None,
                wear_name: Some("Field-Tested".to_string()),
                inspect_link: None,
                is_stattrak: false,
            },
        },
        trade_url: "https://steamcommunity.com/tradeoffer/new/?partner=40734&token=xyz"
            .to_string(),
    }
}

struct Fixture {
    market: Arc<MockMarketApi>,
    trades: Arc<MockTradeClient>,
    notifier: Arc<RecordingNotifier>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            market: Arc::new(MockMarketApi::new()),
            trades: Arc::new(MockTradeClient::new()),
            notifier: Arc::new(RecordingNotifier::new()),
        }
    }

    fn services(&self) -> Services {
        Services {
            market: self.market.clone(),
            trades: self.trades.clone(),
            offers: self.trades.clone(),
            notifier: self.notifier.clone(),
        }
    }
}

#[test]
fn test_new_rejects_incomplete_config() {
    let config = AppConfig::from_toml("").unwrap();
    assert!(Application::new(config).is_err());
}

#[tokio::test(start_paused = true)]
async fn test_sale_runs_to_completion() {
    let fixture = Fixture::new();
    fixture.market.set_trades(vec![queued_trade("T1")]);

    let app = Application::new(AppConfig::from_toml(CONFIG).unwrap()).unwrap();
    let shutdown = app.shutdown_token();
    let run = tokio::spawn(app.run_with(fixture.services()));

    // First market poll fires immediately.
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(fixture.market.accept_calls(&TradeId::from("T1")), 1);
    assert_eq!(fixture.trades.sends().len(), 1);
    assert_eq!(
        fixture.notifier.count_containing("Offer sent for AK-47 | Redline (Field-Tested) to buyer"),
        1
    );

    // Buyer accepts; the watcher picks it up on a later tick.
    let offer_id = fixture.trades.offers()[0].offer_id.clone();
    tokio::time::sleep(Duration::from_secs(10)).await;
    fixture.trades.set_offer_state(&offer_id, OfferState::Accepted);
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(
        fixture
            .notifier
            .count_containing("trade T1 is now completed"),
        1
    );

    // Later polls still list the trade but never produce a second offer.
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(fixture.market.fetch_calls() >= 2);
    assert_eq!(fixture.trades.sends().len(), 1);

    shutdown.cancel();
    run.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_before_any_sale() {
    let fixture = Fixture::new();

    let app = Application::new(AppConfig::from_toml(CONFIG).unwrap()).unwrap();
    let shutdown = app.shutdown_token();
    let run = tokio::spawn(app.run_with(fixture.services()));

    tokio::time::sleep(Duration::from_secs(1)).await;
    shutdown.cancel();
    run.await.unwrap().unwrap();

    assert_eq!(fixture.market.fetch_calls(), 1);
    assert!(fixture.trades.sends().is_empty());
}
