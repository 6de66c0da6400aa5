//! Trade client contract.

use std::sync::Arc;

use futures_util::future::BoxFuture;

use floatsync_core::{AssetId, OfferId};

use crate::error::SteamResult;
use crate::offer::{OfferDraft, OfferSnapshot, SendOutcome};

/// Trading-protocol operations the reconciler depends on.
///
/// Session handling (login, guard codes, cookie refresh) is the
/// implementation's concern; callers assume the session is established.
pub trait TradeClient: Send + Sync {
    /// Start an offer addressed through a buyer's trade URL.
    fn create_offer(&self, trade_url: &str) -> SteamResult<OfferDraft> {
        OfferDraft::from_trade_url(trade_url)
    }

    /// Add one of our items to a draft.
    fn add_item(&self, draft: &mut OfferDraft, asset_id: &AssetId, app_id: u32, context_id: u64) {
        draft.add_my_item(asset_id.clone(), app_id, context_id);
    }

    /// Submit a draft. Single attempt; callers own the retry policy.
    fn send<'a>(&'a self, draft: &'a OfferDraft) -> BoxFuture<'a, SteamResult<SendOutcome>>;

    /// Confirm a sent offer that needs a second factor.
    fn confirm<'a>(&'a self, offer_id: &'a OfferId) -> BoxFuture<'a, SteamResult<()>>;

    /// Withdraw an active offer.
    fn cancel<'a>(&'a self, offer_id: &'a OfferId) -> BoxFuture<'a, SteamResult<()>>;

    /// Look up an offer. `None` if it does not exist.
    fn get_offer<'a>(
        &'a self,
        offer_id: &'a OfferId,
    ) -> BoxFuture<'a, SteamResult<Option<OfferSnapshot>>>;
}

/// Arc wrapper for TradeClient trait objects.
pub type DynTradeClient = Arc<dyn TradeClient>;
