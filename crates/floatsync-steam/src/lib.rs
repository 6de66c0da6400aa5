//! Trade offer client for floatsync.
//!
//! The reconciler only depends on the [`TradeClient`] contract. This crate
//! also provides a thin web implementation that assumes an already
//! authenticated web session (cookies supplied by the operator).
//!
//! # Key Components
//!
//! - [`TradeClient`]: create/add item/send/confirm/cancel/get contract
//! - [`OfferDraft`]: an offer being built from a buyer's trade URL
//! - [`SteamWebClient`]: web implementation over the community site and Web API
//! - [`OfferWatcher`]: polls sent offers and emits [`OfferEvent`]s on state change
//! - [`MockTradeClient`]: scripted client for tests

pub mod client;
pub mod confirm;
pub mod error;
pub mod mock;
pub mod offer;
pub mod watcher;
pub mod web;

pub use client::{DynTradeClient, TradeClient};
pub use confirm::ConfirmationSigner;
pub use error::{SteamError, SteamResult};
pub use mock::MockTradeClient;
pub use offer::{OfferDraft, OfferEvent, OfferItem, OfferSnapshot, SendOutcome, SendStatus};
pub use watcher::{OfferSource, OfferStateTracker, OfferWatcher, PollWindow};
pub use web::{SteamWebClient, SteamWebConfig};
