//! Reconciler actor.
//!
//! A single task owns the registry and the deadline scheduler. Marketplace
//! snapshots, lifecycle results, offer events and cancel results all arrive
//! through one inbox, and timers fire from the same select loop, so registry
//! mutations are never concurrent.
//!
//! # Flow
//!
//! 1. `Snapshot`: diff against the registry and the in-flight set, spawn a
//!    lifecycle task per new trade, then rescan every tracked trade for a
//!    new or moved grace period and (re)arm its deadline.
//! 2. `LifecycleFinished`: register the offer and arm its deadline if the
//!    latest snapshot already carries a grace period.
//! 3. `OfferChanged`: on acceptance, disarm the deadline, notify, and arm a
//!    retirement timer for the cooldown.
//! 4. Grace timer: spawn a single cancel attempt; its result comes back as
//!    `CancelFinished` and always ends in a notification.
//! 5. Retirement timer: disarm anything left, then remove the record.
//!
//! Cancelled records stay registered while the marketplace still lists
//! their trade. Once a snapshot no longer contains it, they are retired
//! after the same cooldown.

use std::collections::{HashMap, HashSet};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use floatsync_core::{OfferId, OfferPhase, OfferState, Trade, TradeId};
use floatsync_steam::{DynTradeClient, OfferEvent, SteamError};
use floatsync_telemetry::{DynNotifier, Metrics};

use crate::config::ReconcilerConfig;
use crate::deadline::{DeadlineHandle, DeadlineScheduler};
use crate::error::{ReconcileError, ReconcileResult};
use crate::lifecycle::{LifecycleOutcome, OfferLifecycle};
use crate::registry::{Registry, TrackedOffer};

// ============================================================================
// Messages
// ============================================================================

/// Messages handled by the reconciler actor.
#[derive(Debug)]
pub enum ReconcilerMsg {
    /// Well-formed trades from one marketplace poll.
    Snapshot(Vec<Trade>),

    /// A lifecycle task ended. `None` means it gave up (already notified).
    LifecycleFinished {
        trade_id: TradeId,
        outcome: Option<LifecycleOutcome>,
    },

    /// Offer state change from the trading client.
    OfferChanged(OfferEvent),

    /// A grace-period cancel attempt ended.
    CancelFinished {
        trade_id: TradeId,
        offer_id: OfferId,
        result: Result<(), String>,
    },

    /// Look up a tracked offer.
    Find {
        trade_id: TradeId,
        reply: oneshot::Sender<Option<TrackedOffer>>,
    },

    /// Registry statistics.
    Stats(oneshot::Sender<ReconcilerStats>),

    Shutdown,
}

/// Timer payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerAction {
    /// Grace period reached: withdraw the offer.
    GraceCancel(TradeId),
    /// Cooldown after completion (or after a cancelled trade left the
    /// marketplace) elapsed: drop the record.
    Retire(TradeId),
}

/// Point-in-time counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcilerStats {
    pub tracked: usize,
    pub in_flight: usize,
    pub armed_deadlines: usize,
    pub timers: usize,
}

// ============================================================================
// ReconcilerTask
// ============================================================================

/// Reconciler actor task.
pub struct ReconcilerTask {
    rx: mpsc::Receiver<ReconcilerMsg>,
    /// Used to hand results of spawned work back to the inbox without
    /// keeping the actor alive on its own.
    self_tx: mpsc::WeakSender<ReconcilerMsg>,
    registry: Registry,
    scheduler: DeadlineScheduler<TimerAction>,
    /// Trades whose lifecycle task is running, with their latest snapshot.
    in_flight: HashMap<TradeId, Trade>,
    lifecycle: Arc<OfferLifecycle>,
    trades: DynTradeClient,
    notifier: DynNotifier,
    retirement_cooldown: Duration,
}

impl ReconcilerTask {
    /// Process messages and timers until `Shutdown` or until every handle
    /// and in-flight task is gone.
    pub async fn run(mut self) {
        debug!("ReconcilerTask started");

        loop {
            tokio::select! {
                biased;

                msg = self.rx.recv() => match msg {
                    Some(msg) => {
                        if self.handle_message(msg).is_break() {
                            break;
                        }
                    }
                    None => break,
                },

                Some((handle, action)) = self.scheduler.next_expired(), if !self.scheduler.is_empty() => {
                    self.on_timer(handle, action);
                }
            }
        }

        let dropped = self.scheduler.clear();
        if dropped > 0 {
            warn!(dropped, "Reconciler stopping with armed timers, dropping them");
        }
        info!(
            tracked = self.registry.len(),
            in_flight = self.in_flight.len(),
            "ReconcilerTask terminated"
        );
    }

    fn handle_message(&mut self, msg: ReconcilerMsg) -> ControlFlow<()> {
        match msg {
            ReconcilerMsg::Snapshot(trades) => self.on_snapshot(trades),
            ReconcilerMsg::LifecycleFinished { trade_id, outcome } => {
                self.on_lifecycle_finished(trade_id, outcome);
            }
            ReconcilerMsg::OfferChanged(event) => self.on_offer_changed(event),
            ReconcilerMsg::CancelFinished {
                trade_id,
                offer_id,
                result,
            } => self.on_cancel_finished(trade_id, offer_id, result),
            ReconcilerMsg::Find { trade_id, reply } => {
                let _ = reply.send(self.registry.find(&trade_id).cloned());
            }
            ReconcilerMsg::Stats(reply) => {
                let _ = reply.send(self.stats());
            }
            ReconcilerMsg::Shutdown => return ControlFlow::Break(()),
        }
        self.refresh_gauges();
        ControlFlow::Continue(())
    }

    fn stats(&self) -> ReconcilerStats {
        ReconcilerStats {
            tracked: self.registry.len(),
            in_flight: self.in_flight.len(),
            armed_deadlines: self.registry.armed_deadlines(),
            timers: self.scheduler.len(),
        }
    }

    fn refresh_gauges(&self) {
        Metrics::tracked_offers(self.registry.len());
        Metrics::armed_deadlines(self.registry.armed_deadlines());
    }

    // ------------------------------------------------------------------------
    // Poll-and-diff
    // ------------------------------------------------------------------------

    fn on_snapshot(&mut self, trades: Vec<Trade>) {
        let mut started = 0usize;
        let listed: HashSet<TradeId> = trades.iter().map(|t| t.id.clone()).collect();

        for trade in trades {
            if self.registry.contains(&trade.id) {
                self.rescan_tracked(trade);
                continue;
            }

            if let Some(latest) = self.in_flight.get_mut(&trade.id) {
                trace_skip(&trade, "lifecycle in flight");
                *latest = trade;
                continue;
            }

            if !trade.is_actionable() {
                trace_skip(&trade, "not actionable");
                continue;
            }

            self.start_lifecycle(trade);
            started += 1;
        }

        self.sweep_cancelled(&listed);

        debug!(
            started,
            tracked = self.registry.len(),
            in_flight = self.in_flight.len(),
            "Snapshot reconciled"
        );
    }

    /// Refresh a tracked trade from a new snapshot: report asset drift and
    /// arm or move its grace deadline.
    fn rescan_tracked(&mut self, trade: Trade) {
        let Some(entry) = self.registry.find_mut(&trade.id) else {
            return;
        };

        if *trade.asset_id() != entry.asset_id && !entry.mismatch_reported {
            entry.mismatch_reported = true;
            warn!(
                trade_id = %trade.id,
                committed = %entry.asset_id,
                listed = %trade.asset_id(),
                "Trade asset no longer matches the offer"
            );
            self.notifier.notify(&format!(
                "Trade {} now lists asset {} but its offer carries asset {}. Please check it manually.",
                trade.id,
                trade.asset_id(),
                entry.asset_id
            ));
        }

        entry.trade = trade;
        let trade_id = entry.trade.id.clone();
        self.arm_grace(&trade_id);
    }

    /// Schedule retirement of cancelled records whose trade is no longer
    /// listed, and hold back those that are listed again.
    fn sweep_cancelled(&mut self, listed: &HashSet<TradeId>) {
        let cooldown = self.retirement_cooldown;
        let cancelled: Vec<TradeId> = self
            .registry
            .iter()
            .filter(|(_, entry)| entry.phase() == OfferPhase::Cancelled)
            .map(|(id, _)| id.clone())
            .collect();

        for trade_id in cancelled {
            let Some(entry) = self.registry.find_mut(&trade_id) else {
                continue;
            };
            match (listed.contains(&trade_id), entry.retirement) {
                (true, Some(retire)) => {
                    self.scheduler.disarm(retire);
                    entry.retirement = None;
                    debug!(trade_id = %trade_id, "Cancelled trade listed again, retirement held");
                }
                (false, None) => {
                    let retire = self
                        .scheduler
                        .arm_in(cooldown, TimerAction::Retire(trade_id.clone()));
                    entry.retirement = Some(retire);
                    debug!(trade_id = %trade_id, "Cancelled trade no longer listed, retirement armed");
                }
                _ => {}
            }
        }
    }

    fn start_lifecycle(&mut self, trade: Trade) {
        let Some(tx) = self.self_tx.upgrade() else {
            return;
        };

        info!(trade_id = %trade.id, state = %trade.state, "New trade to send");
        self.in_flight.insert(trade.id.clone(), trade.clone());

        let lifecycle = Arc::clone(&self.lifecycle);
        tokio::spawn(async move {
            let trade_id = trade.id.clone();
            let outcome = lifecycle.drive(&trade).await.ok();
            if tx
                .send(ReconcilerMsg::LifecycleFinished { trade_id, outcome })
                .await
                .is_err()
            {
                debug!(trade_id = %trade.id, "Reconciler gone, dropping lifecycle result");
            }
        });
    }

    fn on_lifecycle_finished(&mut self, trade_id: TradeId, outcome: Option<LifecycleOutcome>) {
        let Some(latest) = self.in_flight.remove(&trade_id) else {
            warn!(trade_id = %trade_id, "Lifecycle result for unknown trade");
            return;
        };

        let Some(outcome) = outcome else {
            debug!(trade_id = %trade_id, "Lifecycle gave up, trade left unregistered");
            return;
        };

        let mut tracked =
            TrackedOffer::new(latest, outcome.offer_id, outcome.asset_id, outcome.phase);
        if *tracked.trade.asset_id() != tracked.asset_id {
            tracked.mismatch_reported = true;
            self.notifier.notify(&format!(
                "Trade {} now lists asset {} but its offer carries asset {}. Please check it manually.",
                trade_id,
                tracked.trade.asset_id(),
                tracked.asset_id
            ));
        }

        info!(
            trade_id = %trade_id,
            offer_id = ?tracked.offer,
            phase = %tracked.phase(),
            "Offer registered"
        );
        self.registry.upsert(trade_id.clone(), tracked);
        self.arm_grace(&trade_id);
    }

    // ------------------------------------------------------------------------
    // Deadlines
    // ------------------------------------------------------------------------

    /// Arm (or move) the grace deadline of a tracked trade from its latest
    /// snapshot. Only live offers get a deadline.
    fn arm_grace(&mut self, trade_id: &TradeId) {
        let Some(entry) = self.registry.find_mut(trade_id) else {
            return;
        };
        let Some(grace_at) = entry.trade.grace_period_start else {
            return;
        };
        if entry.phase().is_terminal() || entry.grace_at == Some(grace_at) {
            return;
        }

        if let Some(old) = entry.deadline.take() {
            self.scheduler.disarm(old);
        }
        let handle = self
            .scheduler
            .arm_at(grace_at, TimerAction::GraceCancel(trade_id.clone()));
        entry.deadline = Some(handle);
        entry.grace_at = Some(grace_at);

        info!(
            trade_id = %trade_id,
            grace_period_start = %grace_at,
            deadline = handle.id(),
            "Grace-period deadline armed"
        );
    }

    fn on_timer(&mut self, handle: DeadlineHandle, action: TimerAction) {
        match action {
            TimerAction::GraceCancel(trade_id) => self.on_grace_deadline(handle, trade_id),
            TimerAction::Retire(trade_id) => self.on_retire(handle, trade_id),
        }
        self.refresh_gauges();
    }

    fn on_grace_deadline(&mut self, handle: DeadlineHandle, trade_id: TradeId) {
        let Some(entry) = self.registry.find_mut(&trade_id) else {
            return;
        };
        if entry.deadline != Some(handle) {
            debug!(trade_id = %trade_id, "Stale grace deadline ignored");
            return;
        }
        entry.deadline = None;
        Metrics::deadline_fired();

        if entry.phase().is_terminal() {
            return;
        }

        let Some(offer_id) = entry.offer.clone() else {
            error!(trade_id = %trade_id, "Grace period reached for a trade without an offer");
            self.notifier.notify(&format!(
                "Error cancelling trade {trade_id}. Please cancel it manually."
            ));
            return;
        };

        warn!(trade_id = %trade_id, offer_id = %offer_id, "Grace period reached, cancelling offer");

        let Some(tx) = self.self_tx.upgrade() else {
            return;
        };
        let trades = Arc::clone(&self.trades);
        tokio::spawn(async move {
            let result = cancel_offer(&trades, &offer_id)
                .await
                .map_err(|e| e.to_string());
            let msg = ReconcilerMsg::CancelFinished {
                trade_id,
                offer_id,
                result,
            };
            if tx.send(msg).await.is_err() {
                debug!("Reconciler gone, dropping cancel result");
            }
        });
    }

    fn on_cancel_finished(
        &mut self,
        trade_id: TradeId,
        offer_id: OfferId,
        result: Result<(), String>,
    ) {
        match result {
            Ok(()) => {
                Metrics::lifecycle_step("cancel", true);
                info!(trade_id = %trade_id, offer_id = %offer_id, "Offer cancelled");
                self.notifier.notify(&format!(
                    "Cancelled trade {trade_id} as grace period has started."
                ));

                // Kept registered: the marketplace may keep listing the trade.
                if let Some(entry) = self.registry.find_mut(&trade_id) {
                    if let Err(e) = entry.advance(OfferPhase::Cancelled) {
                        debug!(trade_id = %trade_id, error = %e, "Cancellation not recorded");
                    }
                }
            }
            Err(e) => {
                Metrics::lifecycle_step("cancel", false);
                error!(trade_id = %trade_id, offer_id = %offer_id, error = %e, "Failed to cancel offer");
                self.notifier.notify(&format!(
                    "Error cancelling trade {trade_id}. Please cancel it manually."
                ));
            }
        }
    }

    fn on_retire(&mut self, handle: DeadlineHandle, trade_id: TradeId) {
        let Some(entry) = self.registry.find_mut(&trade_id) else {
            return;
        };
        if entry.retirement != Some(handle) {
            return;
        }
        entry.retirement = None;
        if let Some(deadline) = entry.deadline.take() {
            self.scheduler.disarm(deadline);
        }

        self.registry.retire(&trade_id);
        info!(trade_id = %trade_id, "Tracked offer retired");
    }

    // ------------------------------------------------------------------------
    // Offer events
    // ------------------------------------------------------------------------

    fn on_offer_changed(&mut self, event: OfferEvent) {
        if !event.is_our_offer {
            return;
        }
        let Some(trade_id) = self.registry.trade_for_offer(&event.offer_id).cloned() else {
            debug!(offer_id = %event.offer_id, state = %event.new_state, "Event for untracked offer");
            return;
        };

        if event.is_own_acceptance() {
            self.on_accepted(&trade_id, &event.offer_id);
        } else if event.new_state.is_terminal() {
            self.on_closed(&trade_id, &event);
        } else {
            debug!(
                trade_id = %trade_id,
                offer_id = %event.offer_id,
                state = %event.new_state,
                "Offer state changed"
            );
        }
    }

    fn on_accepted(&mut self, trade_id: &TradeId, offer_id: &OfferId) {
        let cooldown = self.retirement_cooldown;
        let Some(entry) = self.registry.find_mut(trade_id) else {
            return;
        };

        if let Err(e) = entry.advance(OfferPhase::Accepted) {
            debug!(trade_id = %trade_id, error = %e, "Acceptance ignored");
            return;
        }

        // Disarm before anything can retire the record.
        if let Some(deadline) = entry.deadline.take() {
            self.scheduler.disarm(deadline);
        }
        let retire = self
            .scheduler
            .arm_in(cooldown, TimerAction::Retire(trade_id.clone()));
        entry.retirement = Some(retire);

        Metrics::offer_accepted();
        info!(trade_id = %trade_id, offer_id = %offer_id, "Offer accepted");
        self.notifier.notify(&format!(
            "Offer accepted for {} and trade {} is now completed.",
            entry.trade.item_name(),
            trade_id
        ));
    }

    fn on_closed(&mut self, trade_id: &TradeId, event: &OfferEvent) {
        let Some(entry) = self.registry.find(trade_id) else {
            return;
        };
        if entry.phase().is_terminal() {
            return;
        }

        warn!(
            trade_id = %trade_id,
            offer_id = %event.offer_id,
            state = %event.new_state,
            "Offer closed without acceptance"
        );
        if event.new_state != OfferState::Canceled {
            self.notifier.notify(&format!(
                "Offer {} for trade {} is now {}. Please check it manually.",
                event.offer_id, trade_id, event.new_state
            ));
        }
    }
}

fn trace_skip(trade: &Trade, reason: &str) {
    trace!(trade_id = %trade.id, reason, "Skipping trade");
}

/// One cancel attempt: the offer must still exist and be active.
async fn cancel_offer(trades: &DynTradeClient, offer_id: &OfferId) -> Result<(), SteamError> {
    match trades.get_offer(offer_id).await? {
        Some(offer) if offer.state.is_terminal() => Err(SteamError::OfferNotActive {
            offer_id: offer_id.clone(),
            state: offer.state,
        }),
        Some(_) => trades.cancel(offer_id).await,
        None => Err(SteamError::OfferNotFound(offer_id.clone())),
    }
}

// ============================================================================
// ReconcilerHandle
// ============================================================================

/// Cloneable handle to the reconciler actor.
#[derive(Debug, Clone)]
pub struct ReconcilerHandle {
    tx: mpsc::Sender<ReconcilerMsg>,
}

impl ReconcilerHandle {
    async fn send(&self, msg: ReconcilerMsg) -> ReconcileResult<()> {
        self.tx
            .send(msg)
            .await
            .map_err(|_| ReconcileError::ChannelClosed)
    }

    /// Hand a marketplace snapshot to the actor.
    pub async fn submit_snapshot(&self, trades: Vec<Trade>) -> ReconcileResult<()> {
        self.send(ReconcilerMsg::Snapshot(trades)).await
    }

    /// Report an offer state change.
    pub async fn offer_changed(&self, event: OfferEvent) -> ReconcileResult<()> {
        self.send(ReconcilerMsg::OfferChanged(event)).await
    }

    /// Look up a tracked offer.
    pub async fn find(&self, trade_id: &TradeId) -> ReconcileResult<Option<TrackedOffer>> {
        let (reply, rx) = oneshot::channel();
        self.send(ReconcilerMsg::Find {
            trade_id: trade_id.clone(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| ReconcileError::ChannelClosed)
    }

    pub async fn stats(&self) -> ReconcileResult<ReconcilerStats> {
        let (reply, rx) = oneshot::channel();
        self.send(ReconcilerMsg::Stats(reply)).await?;
        rx.await.map_err(|_| ReconcileError::ChannelClosed)
    }

    /// Ask the actor to stop. Armed timers are dropped.
    pub async fn shutdown(&self) -> ReconcileResult<()> {
        self.send(ReconcilerMsg::Shutdown).await
    }

    /// Forward offer events from a watcher channel until it closes.
    pub fn forward_offer_events(&self, mut events: mpsc::Receiver<OfferEvent>) -> JoinHandle<()> {
        let handle = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if handle.offer_changed(event).await.is_err() {
                    debug!("Reconciler gone, offer event forwarding stopped");
                    return;
                }
            }
        })
    }
}

// ============================================================================
// Spawn function
// ============================================================================

/// Spawn the reconciler actor.
///
/// Returns a handle for interaction and a join handle for the task.
#[must_use]
pub fn spawn_reconciler(
    lifecycle: OfferLifecycle,
    trades: DynTradeClient,
    notifier: DynNotifier,
    config: &ReconcilerConfig,
) -> (ReconcilerHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(config.inbox_capacity.max(1));

    let task = ReconcilerTask {
        rx,
        self_tx: tx.downgrade(),
        registry: Registry::new(),
        scheduler: DeadlineScheduler::new(),
        in_flight: HashMap::new(),
        lifecycle: Arc::new(lifecycle),
        trades,
        notifier,
        retirement_cooldown: config.retirement_cooldown,
    };

    let handle = ReconcilerHandle { tx };
    let join_handle = tokio::spawn(task.run());

    (handle, join_handle)
}
