//! Marketplace trade schema.
//!
//! A `Trade` is an immutable snapshot of one sale as reported by the
//! marketplace's `trades_to_send` list. Only the fields the reconciler reads
//! are modelled; everything else in the payload is ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, Result};
use crate::ids::{AssetId, TradeId};

/// Marketplace-side trade state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeState {
    /// Sale made, seller has not accepted it yet.
    Queued,
    /// Seller accepted, waiting for the item to be sent.
    Pending,
    Accepted,
    Verified,
    Failed,
    Cancelled,
    /// Any state this build does not know about.
    #[serde(other)]
    Unknown,
}

impl fmt::Display for TradeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Verified => "verified",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// Buyer summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Buyer {
    #[serde(default)]
    pub steam_id: String,
    #[serde(default)]
    pub username: String,
}

/// The tradable item of a contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Inventory asset id of the item to hand over.
    pub asset_id: AssetId,
    #[serde(default)]
    pub market_hash_name: String,
    #[serde(default)]
    pub float_value: Option<f64>,
    #[serde(default)]
    pub paint_seed: Option<u32>,
    #[serde(default)]
    pub wear_name: Option<String>,
    #[serde(default)]
    pub inspect_link: Option<String>,
    #[serde(default)]
    pub is_stattrak: bool,
}

/// Listing the trade was created from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub id: String,
    /// Sale price in cents.
    #[serde(default)]
    pub price: u64,
    #[serde(default)]
    pub state: String,
    pub item: Item,
}

/// A single sale awaiting handoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub buyer_id: String,
    #[serde(default)]
    pub buyer: Buyer,
    #[serde(default)]
    pub seller_id: String,
    pub state: TradeState,
    #[serde(default)]
    pub manual_verification: bool,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// Once set, the offer must be accepted before this instant or withdrawn.
    #[serde(default)]
    pub grace_period_start: Option<DateTime<Utc>>,
    pub contract: Contract,
    /// Buyer's trade URL, used to address the outbound offer.
    pub trade_url: String,
}

impl Trade {
    /// Asset committed by this snapshot.
    pub fn asset_id(&self) -> &AssetId {
        &self.contract.item.asset_id
    }

    /// Display name of the item.
    pub fn item_name(&self) -> &str {
        &self.contract.item.market_hash_name
    }

    /// Buyer username, falling back to the buyer id.
    pub fn buyer_name(&self) -> &str {
        if self.buyer.username.is_empty() {
            &self.buyer_id
        } else {
            &self.buyer.username
        }
    }

    /// Returns true if the sale still has to be accepted on the marketplace.
    #[must_use]
    pub fn needs_accept(&self) -> bool {
        self.state == TradeState::Queued
    }

    /// Returns true if the engine should act on this trade at all.
    #[must_use]
    pub fn is_actionable(&self) -> bool {
        matches!(self.state, TradeState::Queued | TradeState::Pending)
    }

    /// Parse a single `trades_to_send` entry and check the fields an offer needs.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let trade: Trade = serde_json::from_value(value)?;
        trade.validate()?;
        Ok(trade)
    }

    /// Reject snapshots that cannot be turned into an offer.
    pub fn validate(&self) -> Result<()> {
        if self.id.as_str().is_empty() {
            return Err(CoreError::InvalidTrade("empty trade id".to_string()));
        }
        if self.contract.item.asset_id.as_str().is_empty() {
            return Err(CoreError::InvalidTrade(format!(
                "trade {} has no asset id",
                self.id
            )));
        }
        if self.trade_url.is_empty() {
            return Err(CoreError::InvalidTrade(format!(
                "trade {} has no trade url",
                self.id
            )));
        }
        Ok(())
    }
}
