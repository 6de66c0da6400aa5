//! Core domain types for the floatsync trade reconciler.
//!
//! This crate provides the types shared by every other crate:
//! - `TradeId`, `OfferId`, `AssetId`: identifiers on both sides of the bridge
//! - `Trade`, `Contract`, `Item`, `Buyer`: the marketplace trade schema
//! - `TradeState`: marketplace-side trade state
//! - `OfferPhase`: engine-side lifecycle phase of a tracked offer
//! - `OfferState`: trading-protocol offer state

pub mod error;
pub mod ids;
pub mod phase;
pub mod trade;

pub use error::{CoreError, Result};
pub use ids::{AssetId, OfferId, TradeId};
pub use phase::{OfferPhase, OfferState};
pub use trade::{Buyer, Contract, Item, Trade, TradeState};
