//! Main application orchestration.
//!
//! Starts the reconciler actor and the two pollers feeding it:
//! - `MarketPoller`: marketplace trades-to-send queue -> snapshots
//! - `OfferWatcher`: sent offers -> state change events
//!
//! Runs until Ctrl-C, the shutdown token, or the reconciler stopping.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use floatsync_market::{DynMarketApi, MarketClient};
use floatsync_reconcile::{spawn_reconciler, MarketPoller, OfferLifecycle};
use floatsync_steam::{DynTradeClient, OfferSource, OfferWatcher, SteamWebClient};
use floatsync_telemetry::{DiscordNotifier, DynNotifier, LogNotifier, Metrics};

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};

/// Offer event channel capacity.
const OFFER_EVENT_CAPACITY: usize = 256;

/// How long to wait for background tasks after shutdown.
const TASK_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// External collaborators the application runs against.
pub struct Services {
    pub market: DynMarketApi,
    pub trades: DynTradeClient,
    pub offers: Arc<dyn OfferSource>,
    pub notifier: DynNotifier,
}

/// Main application.
pub struct Application {
    config: AppConfig,
    shutdown: CancellationToken,
}

impl Application {
    /// Create a new application. Fails on an incomplete configuration.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            shutdown: CancellationToken::new(),
        })
    }

    /// Token that stops `run` when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    fn build_notifier(&self) -> AppResult<DynNotifier> {
        match &self.config.notify.discord_webhook_url {
            Some(url) => Ok(Arc::new(DiscordNotifier::new(url.clone())?)),
            None => {
                info!("No webhook configured, notifications go to the log only");
                Ok(Arc::new(LogNotifier))
            }
        }
    }

    /// Build the real clients and verify the web session.
    ///
    /// A session that is not logged in is fatal: nothing could be sent.
    pub async fn connect(&self) -> AppResult<Services> {
        let notifier = self.build_notifier()?;
        let market: DynMarketApi = Arc::new(MarketClient::new(self.config.market_client_config())?);

        let steam = Arc::new(SteamWebClient::new(self.config.steam_web_config())?);
        if let Err(e) = steam.establish_session().await {
            error!(error = %e, "Web session check failed");
            return Err(AppError::Session(e.to_string()));
        }

        Ok(Services {
            market,
            trades: steam.clone(),
            offers: steam,
            notifier,
        })
    }

    /// Connect, then run until shutdown.
    pub async fn run(self) -> AppResult<()> {
        let services = self.connect().await?;
        self.run_with(services).await
    }

    /// Run the reconciler and pollers against the given services.
    pub async fn run_with(self, services: Services) -> AppResult<()> {
        let Services {
            market,
            trades,
            offers,
            notifier,
        } = services;
        let reconciler_config = self.config.reconciler_config();

        let lifecycle = OfferLifecycle::new(
            market.clone(),
            trades.clone(),
            notifier.clone(),
            &reconciler_config,
        );
        let (handle, mut reconciler_join) =
            spawn_reconciler(lifecycle, trades, notifier.clone(), &reconciler_config);

        let (events_tx, events_rx) = mpsc::channel(OFFER_EVENT_CAPACITY);
        let watcher_join = OfferWatcher::new(
            offers,
            self.config.watch_interval(),
            events_tx,
            self.shutdown.child_token(),
        )
        .spawn();
        let forward_join = handle.forward_offer_events(events_rx);

        let poller_join = MarketPoller::new(
            market,
            handle.clone(),
            notifier,
            reconciler_config.poll_interval,
            self.shutdown.child_token(),
        )
        .spawn();

        info!(
            poll_interval_secs = reconciler_config.poll_interval.as_secs(),
            watch_interval_secs = self.config.steam.watch_interval_secs,
            "floatsync running"
        );

        let mut reconciler_exited = false;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
            }
            () = self.shutdown.cancelled() => {
                info!("Shutdown requested");
            }
            result = &mut reconciler_join => {
                reconciler_exited = true;
                error!(?result, "Reconciler stopped unexpectedly");
            }
        }

        // Cleanup
        self.shutdown.cancel();
        drain("market poller", poller_join).await;
        drain("offer watcher", watcher_join).await;
        drain("offer event forwarder", forward_join).await;

        if !reconciler_exited {
            if let Ok(stats) = handle.stats().await {
                info!(
                    tracked = stats.tracked,
                    in_flight = stats.in_flight,
                    armed_deadlines = stats.armed_deadlines,
                    "Final reconciler state"
                );
            }
            handle.shutdown().await?;
            drain("reconciler", reconciler_join).await;
        }

        match Metrics::gather_text() {
            Ok(text) => info!(metrics = %text, "Final metrics"),
            Err(e) => warn!(error = %e, "Failed to gather metrics"),
        }

        if reconciler_exited {
            return Err(floatsync_reconcile::ReconcileError::ChannelClosed.into());
        }
        Ok(())
    }
}

async fn drain(name: &str, join: JoinHandle<()>) {
    match tokio::time::timeout(TASK_DRAIN_TIMEOUT, join).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(task = name, error = %e, "Task ended abnormally"),
        Err(_) => warn!(task = name, "Task did not stop in time"),
    }
}
