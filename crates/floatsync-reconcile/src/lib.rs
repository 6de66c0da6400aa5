//! Offer reconciliation engine.
//!
//! Bridges the marketplace "trades to send" queue and outbound trade offers:
//! every sale becomes exactly one offer, tracked until the buyer accepts it
//! or its grace period forces a withdrawal.
//!
//! # Key Components
//!
//! - [`Registry`]: trade id -> [`TrackedOffer`], the dedup source of truth
//! - [`DeadlineScheduler`]: owned, idempotently disarmable timers
//! - [`OfferLifecycle`]: accept -> build -> send -> confirm for one trade
//! - [`ReconcilerTask`]: single-owner actor (poll diff, grace arming, reaper)
//! - [`MarketPoller`]: fixed-interval marketplace fetch feeding the actor

pub mod config;
pub mod deadline;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod poller;
pub mod registry;
pub mod retry;

pub use config::ReconcilerConfig;
pub use deadline::{DeadlineHandle, DeadlineScheduler};
pub use engine::{
    spawn_reconciler, ReconcilerHandle, ReconcilerMsg, ReconcilerStats, ReconcilerTask,
    TimerAction,
};
pub use error::{ReconcileError, ReconcileResult};
pub use lifecycle::{LifecycleOutcome, OfferLifecycle};
pub use poller::MarketPoller;
pub use registry::{Registry, TrackedOffer};
pub use retry::RetryPolicy;
