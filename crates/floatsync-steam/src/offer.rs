//! Offer types.

use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;

use floatsync_core::{AssetId, OfferId, OfferState};

use crate::error::{SteamError, SteamResult};

/// Offset between a 32-bit account id and its 64-bit steam id.
pub const STEAM_ID64_BASE: u64 = 76_561_197_960_265_728;

/// One item given away by an offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferItem {
    pub app_id: u32,
    pub context_id: u64,
    pub asset_id: AssetId,
}

/// Offer under construction, addressed through a buyer's trade URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferDraft {
    /// Trade URL the draft was built from.
    pub trade_url: String,
    /// Partner account id (32-bit).
    pub partner_account_id: u32,
    /// Access token from the trade URL, required for non-friends.
    pub access_token: Option<String>,
    /// Items we give.
    pub items: Vec<OfferItem>,
    /// Free-text message shown to the partner.
    pub message: String,
}

impl OfferDraft {
    /// Build an empty draft from a `.../tradeoffer/new/?partner=..&token=..` URL.
    pub fn from_trade_url(trade_url: &str) -> SteamResult<Self> {
        let url = Url::parse(trade_url)
            .map_err(|e| SteamError::InvalidTradeUrl(format!("{trade_url}: {e}")))?;

        let mut partner = None;
        let mut token = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "partner" => partner = Some(value.into_owned()),
                "token" => token = Some(value.into_owned()),
                _ => {}
            }
        }

        let partner = partner
            .ok_or_else(|| SteamError::InvalidTradeUrl(format!("{trade_url}: missing partner")))?;
        let partner_account_id = partner
            .parse::<u32>()
            .map_err(|e| SteamError::InvalidTradeUrl(format!("{trade_url}: partner {e}")))?;

        Ok(Self {
            trade_url: trade_url.to_string(),
            partner_account_id,
            access_token: token.filter(|t| !t.is_empty()),
            items: Vec::new(),
            message: String::new(),
        })
    }

    /// Partner's 64-bit steam id.
    pub fn partner_steam_id(&self) -> u64 {
        STEAM_ID64_BASE + u64::from(self.partner_account_id)
    }

    /// Add one of our items.
    pub fn add_my_item(&mut self, asset_id: AssetId, app_id: u32, context_id: u64) {
        self.items.push(OfferItem {
            app_id,
            context_id,
            asset_id,
        });
    }
}

/// Result of submitting an offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SendStatus {
    /// Offer is live for the partner.
    Sent,
    /// Offer exists but needs a mobile confirmation first.
    NeedsConfirmation,
    /// Offer exists but needs an email confirmation first.
    NeedsEmailConfirmation,
}

impl SendStatus {
    /// Returns true if `confirm` must be called before the partner sees the offer.
    #[must_use]
    pub fn needs_mobile_confirmation(self) -> bool {
        self == Self::NeedsConfirmation
    }
}

impl fmt::Display for SendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sent => write!(f, "sent"),
            Self::NeedsConfirmation => write!(f, "pending"),
            Self::NeedsEmailConfirmation => write!(f, "pending_email"),
        }
    }
}

/// Offer created by a successful `send`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOutcome {
    pub offer_id: OfferId,
    pub status: SendStatus,
}

/// Last known state of an offer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferSnapshot {
    pub offer_id: OfferId,
    pub state: OfferState,
    /// True if we created the offer.
    pub is_our_offer: bool,
}

/// Offer state change reported by the watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferEvent {
    pub offer_id: OfferId,
    pub old_state: Option<OfferState>,
    pub new_state: OfferState,
    pub is_our_offer: bool,
}

impl OfferEvent {
    /// Returns true for our own offer reaching the accepted state.
    #[must_use]
    pub fn is_own_acceptance(&self) -> bool {
        self.is_our_offer && self.new_state == OfferState::Accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draft_from_trade_url() {
        let draft = OfferDraft::from_trade_url(
            "https://steamcommunity.com/tradeoffer/new/?partner=12345&token=AbCdEf",
        )
        .unwrap();
        assert_eq!(draft.partner_account_id, 12345);
        assert_eq!(draft.partner_steam_id(), 76_561_197_960_278_073);
        assert_eq!(draft.access_token.as_deref(), Some("AbCdEf"));
        assert!(draft.items.is_empty());
    }

    #[test]
    fn test_draft_without_token() {
        let draft =
            OfferDraft::from_trade_url("https://steamcommunity.com/tradeoffer/new/?partner=7")
                .unwrap();
        assert!(draft.access_token.is_none());
    }

    #[test]
    fn test_invalid_trade_urls() {
        assert!(OfferDraft::from_trade_url("not a url").is_err());
        assert!(OfferDraft::from_trade_url("https://steamcommunity.com/tradeoffer/new/").is_err());
        assert!(
            OfferDraft::from_trade_url("https://steamcommunity.com/tradeoffer/new/?partner=x")
                .is_err()
        );
    }

    #[test]
    fn test_add_item() {
        let mut draft =
            OfferDraft::from_trade_url("https://steamcommunity.com/tradeoffer/new/?partner=7")
                .unwrap();
        draft.add_my_item(AssetId::from("123"), 730, 2);
        assert_eq!(draft.items.len(), 1);
        assert_eq!(draft.items[0].asset_id.as_str(), "123");
    }

    #[test]
    fn test_own_acceptance() {
        let event = OfferEvent {
            offer_id: OfferId::from("1"),
            old_state: Some(OfferState::Active),
            new_state: OfferState::Accepted,
            is_our_offer: true,
        };
        assert!(event.is_own_acceptance());
        assert!(!OfferEvent {
            is_our_offer: false,
            ..event.clone()
        }
        .is_own_acceptance());
        assert!(!OfferEvent {
            new_state: OfferState::Declined,
            ..event
        }
        .is_own_acceptance());
    }
}
