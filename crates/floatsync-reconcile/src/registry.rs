//! Reconciliation registry.
//!
//! Authoritative map from trade id to the engine's tracking record. Owned by
//! the reconciler task; no locking.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use floatsync_core::{AssetId, OfferId, OfferPhase, Trade, TradeId};

use crate::deadline::DeadlineHandle;

/// Engine-side record of one trade being handled.
#[derive(Debug, Clone)]
pub struct TrackedOffer {
    /// Last marketplace snapshot of the trade.
    pub trade: Trade,
    /// Outbound offer, once created.
    pub offer: Option<OfferId>,
    /// Asset committed to the outbound offer.
    pub asset_id: AssetId,
    /// Armed grace-period cancellation.
    pub deadline: Option<DeadlineHandle>,
    /// Grace period start the deadline was armed for.
    pub grace_at: Option<DateTime<Utc>>,
    /// Armed retirement timer.
    pub retirement: Option<DeadlineHandle>,
    /// Set once an asset mismatch has been reported.
    pub mismatch_reported: bool,
    phase: OfferPhase,
}

impl TrackedOffer {
    /// Record for an offer that was just created.
    pub fn new(trade: Trade, offer: OfferId, asset_id: AssetId, phase: OfferPhase) -> Self {
        Self {
            trade,
            offer: Some(offer),
            asset_id,
            deadline: None,
            grace_at: None,
            retirement: None,
            mismatch_reported: false,
            phase,
        }
    }

    pub fn trade_id(&self) -> &TradeId {
        &self.trade.id
    }

    pub fn phase(&self) -> OfferPhase {
        self.phase
    }

    /// Move the phase forward. Backward or sideways moves are rejected and
    /// leave the phase unchanged.
    pub fn advance(&mut self, next: OfferPhase) -> floatsync_core::Result<()> {
        self.phase = self.phase.advance(next)?;
        Ok(())
    }
}

/// Trade id -> tracked offer, with a reverse index by offer id.
#[derive(Debug, Default)]
pub struct Registry {
    entries: HashMap<TradeId, TrackedOffer>,
    by_offer: HashMap<OfferId, TradeId>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, trade_id: &TradeId) -> bool {
        self.entries.contains_key(trade_id)
    }

    /// Insert or replace the record for `trade_id`, returning the previous one.
    pub fn upsert(&mut self, trade_id: TradeId, offer: TrackedOffer) -> Option<TrackedOffer> {
        debug_assert_eq!(&trade_id, offer.trade_id());

        let new_offer = offer.offer.clone();
        if let Some(offer_id) = &new_offer {
            self.by_offer.insert(offer_id.clone(), trade_id.clone());
        }

        let previous = self.entries.insert(trade_id.clone(), offer);
        if let Some(old_offer) = previous.as_ref().and_then(|p| p.offer.as_ref()) {
            if Some(old_offer) != new_offer.as_ref()
                && self.by_offer.get(old_offer) == Some(&trade_id)
            {
                self.by_offer.remove(old_offer);
            }
        }
        previous
    }

    pub fn find(&self, trade_id: &TradeId) -> Option<&TrackedOffer> {
        self.entries.get(trade_id)
    }

    pub fn find_mut(&mut self, trade_id: &TradeId) -> Option<&mut TrackedOffer> {
        self.entries.get_mut(trade_id)
    }

    /// Trade that owns an outbound offer.
    pub fn trade_for_offer(&self, offer_id: &OfferId) -> Option<&TradeId> {
        self.by_offer.get(offer_id)
    }

    /// Remove a record. No-op if absent.
    pub fn retire(&mut self, trade_id: &TradeId) -> Option<TrackedOffer> {
        let removed = self.entries.remove(trade_id)?;
        if let Some(offer_id) = &removed.offer {
            if self.by_offer.get(offer_id) == Some(trade_id) {
                self.by_offer.remove(offer_id);
            }
        }
        Some(removed)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of records with an armed grace deadline.
    pub fn armed_deadlines(&self) -> usize {
        self.entries.values().filter(|e| e.deadline.is_some()).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TradeId, &TrackedOffer)> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use floatsync_core::{Buyer, Contract, Item, TradeState};

    fn trade(id: &str, asset: &str) -> Trade {
        Trade {
            id: TradeId::from(id),
            created_at: Utc::now(),
            buyer_id: "76561198000000001".to_string(),
            buyer: Buyer::default(),
            seller_id: "76561198000000000".to_string(),
            state: TradeState::Pending,
            manual_verification: false,
            expires_at: None,
            grace_period_start: None,
            contract: Contract {
                id: format!("c-{id}"),
                price: 1000,
                state: "sold".to_string(),
                item: Item {
                    asset_id: AssetId::from(asset),
                    market_hash_name: "AK-47 | Redline (Field-Tested)".to_string(),
                    float_value: Some(0.25),
                    paint_seed: None,
                    wear_name: None,
                    inspect_link: None,
                    is_stattrak: false,
                },
            },
            trade_url: "https://steamcommunity.com/tradeoffer/new/?partner=1&token=t".to_string(),
        }
    }

    fn tracked(id: &str, offer: &str) -> TrackedOffer {
        TrackedOffer::new(
            trade(id, "123"),
            OfferId::from(offer),
            AssetId::from("123"),
            OfferPhase::Sent,
        )
    }

    #[test]
    fn test_contains_find_retire() {
        let mut registry = Registry::new();
        let id = TradeId::from("T1");
        assert!(!registry.contains(&id));

        registry.upsert(id.clone(), tracked("T1", "1000"));
        assert!(registry.contains(&id));
        assert_eq!(registry.find(&id).unwrap().phase(), OfferPhase::Sent);
        assert_eq!(
            registry.trade_for_offer(&OfferId::from("1000")),
            Some(&id)
        );

        assert!(registry.retire(&id).is_some());
        assert!(!registry.contains(&id));
        assert!(registry.trade_for_offer(&OfferId::from("1000")).is_none());
    }

    #[test]
    fn test_retire_absent_is_noop() {
        let mut registry = Registry::new();
        assert!(registry.retire(&TradeId::from("missing")).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_upsert_keeps_one_entry_per_trade() {
        let mut registry = Registry::new();
        let id = TradeId::from("T1");
        registry.upsert(id.clone(), tracked("T1", "1000"));
        let previous = registry.upsert(id.clone(), tracked("T1", "1001"));

        assert!(previous.is_some());
        assert_eq!(registry.len(), 1);
        assert!(registry.trade_for_offer(&OfferId::from("1000")).is_none());
        assert_eq!(registry.trade_for_offer(&OfferId::from("1001")), Some(&id));
    }

    #[test]
    fn test_phase_never_moves_backward() {
        let mut offer = tracked("T1", "1000");
        offer.advance(OfferPhase::Confirmed).unwrap();
        assert!(offer.advance(OfferPhase::Sent).is_err());
        assert_eq!(offer.phase(), OfferPhase::Confirmed);

        offer.advance(OfferPhase::Accepted).unwrap();
        assert!(offer.advance(OfferPhase::Cancelled).is_err());
        assert_eq!(offer.phase(), OfferPhase::Accepted);
    }

    #[tokio::test]
    async fn test_armed_deadline_count() {
        let mut scheduler = crate::deadline::DeadlineScheduler::new();
        let mut registry = Registry::new();
        let mut offer = tracked("T1", "1000");
        offer.deadline = Some(scheduler.arm_in(std::time::Duration::from_secs(60), ()));
        registry.upsert(TradeId::from("T1"), offer);
        registry.upsert(TradeId::from("T2"), tracked("T2", "1001"));
        assert_eq!(registry.armed_deadlines(), 1);
    }
}
