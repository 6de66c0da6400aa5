//! Marketplace REST client for floatsync.
//!
//! Fetches the authenticated seller's `trades_to_send` queue and accepts
//! individual trades. Entries that fail to parse are quarantined at this
//! boundary and never reach the reconciler.

pub mod api;
pub mod client;
pub mod error;
pub mod snapshot;

pub use api::{DynMarketApi, MarketApi, MockMarketApi};
pub use client::{MarketClient, MarketClientConfig, ProxyConfig};
pub use error::{MarketError, MarketResult};
pub use snapshot::{QuarantinedEntry, TradesSnapshot};
