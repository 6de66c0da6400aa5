//! Offer lifecycle driver.
//!
//! Drives one trade through accept -> build offer -> send -> confirm. Runs in
//! its own task per trade; the only shared state is the external clients.
//! Every give-up path notifies before returning the error.

use floatsync_core::{AssetId, OfferId, OfferPhase, Trade};
use floatsync_market::DynMarketApi;
use floatsync_steam::{DynTradeClient, OfferDraft, SendOutcome, SendStatus};
use floatsync_telemetry::{DynNotifier, Metrics};
use tracing::{debug, error, info, warn};

use crate::config::ReconcilerConfig;
use crate::error::{ReconcileError, ReconcileResult};
use crate::retry::RetryPolicy;

/// Successful end of a lifecycle run: the offer exists and is owned by the
/// registry from here on.
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleOutcome {
    pub offer_id: OfferId,
    pub asset_id: AssetId,
    /// `Sent`, or `Confirmed` if a mobile confirmation went through.
    pub phase: OfferPhase,
    pub status: SendStatus,
}

pub struct OfferLifecycle {
    market: DynMarketApi,
    trades: DynTradeClient,
    notifier: DynNotifier,
    retry: RetryPolicy,
    app_id: u32,
    context_id: u64,
}

impl OfferLifecycle {
    pub fn new(
        market: DynMarketApi,
        trades: DynTradeClient,
        notifier: DynNotifier,
        config: &ReconcilerConfig,
    ) -> Self {
        Self {
            market,
            trades,
            notifier,
            retry: config.retry,
            app_id: config.app_id,
            context_id: config.context_id,
        }
    }

    /// Run the pipeline for one trade.
    ///
    /// An `Err` means no offer was created (or it could not be attributed),
    /// and the trade must stay unregistered so the next cycle picks it up.
    pub async fn drive(&self, trade: &Trade) -> ReconcileResult<LifecycleOutcome> {
        let mut phase = if trade.needs_accept() {
            OfferPhase::Queued
        } else {
            OfferPhase::Pending
        };

        if phase == OfferPhase::Queued {
            self.accept(trade).await?;
            phase = phase.advance(OfferPhase::Pending)?;
        }

        let asset_id = trade.asset_id().clone();
        let outcome = self.send(trade, &asset_id).await?;
        phase = phase.advance(OfferPhase::Sent)?;

        match outcome.status {
            SendStatus::NeedsConfirmation => {
                if self.confirm(&outcome.offer_id).await {
                    phase = phase.advance(OfferPhase::Confirmed)?;
                }
            }
            SendStatus::NeedsEmailConfirmation => {
                self.notifier.notify(&format!(
                    "Offer #{} needs email confirmation. Please confirm it manually.",
                    outcome.offer_id
                ));
            }
            SendStatus::Sent => {}
        }

        Ok(LifecycleOutcome {
            offer_id: outcome.offer_id,
            asset_id,
            phase,
            status: outcome.status,
        })
    }

    async fn accept(&self, trade: &Trade) -> ReconcileResult<()> {
        debug!(trade_id = %trade.id, "Accepting trade on the marketplace");

        match self
            .retry
            .run("accept trade", || self.market.accept_trade(&trade.id))
            .await
        {
            Ok(()) => {
                Metrics::lifecycle_step("accept", true);
                info!(trade_id = %trade.id, "Trade accepted");
                Ok(())
            }
            Err(e) => {
                Metrics::lifecycle_step("accept", false);
                error!(trade_id = %trade.id, error = %e, "Failed to accept trade");
                self.notifier
                    .notify(&format!("Error while accepting trade {}.", trade.id));
                Err(e.into())
            }
        }
    }

    fn build_offer(&self, trade: &Trade, asset_id: &AssetId) -> ReconcileResult<OfferDraft> {
        let mut draft = self.trades.create_offer(&trade.trade_url)?;
        self.trades
            .add_item(&mut draft, asset_id, self.app_id, self.context_id);

        let committed: Vec<AssetId> = draft.items.iter().map(|i| i.asset_id.clone()).collect();
        if committed.len() != 1 || committed[0] != *trade.asset_id() {
            return Err(ReconcileError::AssetMismatch {
                trade_id: trade.id.clone(),
                expected: trade.asset_id().clone(),
                actual: committed,
            });
        }

        draft.message = format!("floatsync trade {}", trade.id);
        Ok(draft)
    }

    async fn send(&self, trade: &Trade, asset_id: &AssetId) -> ReconcileResult<SendOutcome> {
        let result = match self.build_offer(trade, asset_id) {
            Ok(draft) => self
                .retry
                .run("send offer", || self.trades.send(&draft))
                .await
                .map_err(ReconcileError::from),
            Err(e) => Err(e),
        };

        match result {
            Ok(outcome) => {
                Metrics::lifecycle_step("send", true);
                info!(
                    trade_id = %trade.id,
                    offer_id = %outcome.offer_id,
                    status = %outcome.status,
                    "Offer sent"
                );
                self.notifier.notify(&format!(
                    "Offer sent for {} to {}",
                    trade.item_name(),
                    trade.buyer_name()
                ));
                self.notifier
                    .notify(&format!("Sent offer. Status: {}.", outcome.status));
                Ok(outcome)
            }
            Err(e) => {
                Metrics::lifecycle_step("send", false);
                error!(trade_id = %trade.id, error = %e, "Failed to send offer");
                self.notifier
                    .notify(&format!("Error sending offer for trade {}.", trade.id));
                Err(e)
            }
        }
    }

    /// Confirm a sent offer. Failure leaves the offer registered as `Sent`.
    async fn confirm(&self, offer_id: &OfferId) -> bool {
        self.notifier
            .notify(&format!("Offer #{offer_id} needs confirmation."));

        match self
            .retry
            .run("confirm offer", || self.trades.confirm(offer_id))
            .await
        {
            Ok(()) => {
                Metrics::lifecycle_step("confirm", true);
                self.notifier.notify(&format!("Offer {offer_id} confirmed"));
                true
            }
            Err(e) => {
                Metrics::lifecycle_step("confirm", false);
                warn!(offer_id = %offer_id, error = %e, "Failed to confirm offer");
                self.notifier.notify(&format!(
                    "Error confirming offer {offer_id}. Please confirm it manually."
                ));
                false
            }
        }
    }
}
