//! Scripted trade client for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::future::BoxFuture;
use parking_lot::Mutex;

use floatsync_core::{OfferId, OfferState};

use crate::client::TradeClient;
use crate::error::{SteamError, SteamResult};
use crate::offer::{OfferDraft, OfferSnapshot, SendOutcome, SendStatus};

/// Mock trade client.
///
/// Offer ids are assigned sequentially starting at 1000. Sent offers are kept
/// so `get_offer` and `cancel` behave like the real client.
#[derive(Debug)]
pub struct MockTradeClient {
    /// Recorded sends for verification.
    sends: Mutex<Vec<OfferDraft>>,
    /// Recorded confirms.
    confirms: Mutex<Vec<OfferId>>,
    /// Recorded cancel attempts.
    cancels: Mutex<Vec<OfferId>>,
    /// Known offers.
    offers: Mutex<HashMap<OfferId, OfferSnapshot>>,
    /// Status returned by successful sends.
    send_status: Mutex<SendStatus>,
    /// Remaining send failures.
    send_failures: Mutex<usize>,
    /// Remaining confirm failures.
    confirm_failures: Mutex<usize>,
    /// Whether cancels fail.
    fail_cancel: Mutex<bool>,
    /// Artificial latency for sends.
    send_delay: Mutex<Option<Duration>>,
    /// Remaining sent-offer poll failures.
    poll_failures: Mutex<usize>,
    /// Cutoffs passed to sent-offer polls, failed ones included.
    poll_cutoffs: Mutex<Vec<i64>>,
    next_offer_id: AtomicU64,
}

impl Default for MockTradeClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTradeClient {
    pub fn new() -> Self {
        Self {
            sends: Mutex::new(Vec::new()),
            confirms: Mutex::new(Vec::new()),
            cancels: Mutex::new(Vec::new()),
            offers: Mutex::new(HashMap::new()),
            send_status: Mutex::new(SendStatus::Sent),
            send_failures: Mutex::new(0),
            confirm_failures: Mutex::new(0),
            fail_cancel: Mutex::new(false),
            send_delay: Mutex::new(None),
            poll_failures: Mutex::new(0),
            poll_cutoffs: Mutex::new(Vec::new()),
            next_offer_id: AtomicU64::new(1000),
        }
    }

    /// Set the status returned by successful sends.
    pub fn set_send_status(&self, status: SendStatus) {
        *self.send_status.lock() = status;
    }

    /// Fail the next `count` sends.
    pub fn fail_sends(&self, count: usize) {
        *self.send_failures.lock() = count;
    }

    /// Fail the next `count` confirms.
    pub fn fail_confirms(&self, count: usize) {
        *self.confirm_failures.lock() = count;
    }

    /// Make cancels fail (or succeed again).
    pub fn set_fail_cancel(&self, fail: bool) {
        *self.fail_cancel.lock() = fail;
    }

    /// Delay every send by `delay`.
    pub fn set_send_delay(&self, delay: Duration) {
        *self.send_delay.lock() = Some(delay);
    }

    /// Fail the next `count` sent-offer polls.
    pub fn fail_offer_polls(&self, count: usize) {
        *self.poll_failures.lock() = count;
    }

    /// Cutoffs of every sent-offer poll so far.
    pub fn poll_cutoffs(&self) -> Vec<i64> {
        self.poll_cutoffs.lock().clone()
    }

    /// Force an offer's state (e.g. the buyer accepted it).
    pub fn set_offer_state(&self, offer_id: &OfferId, state: OfferState) {
        if let Some(offer) = self.offers.lock().get_mut(offer_id) {
            offer.state = state;
        }
    }

    /// Get recorded sends.
    pub fn sends(&self) -> Vec<OfferDraft> {
        self.sends.lock().clone()
    }

    /// Get recorded confirms.
    pub fn confirms(&self) -> Vec<OfferId> {
        self.confirms.lock().clone()
    }

    /// Get recorded cancel attempts.
    pub fn cancels(&self) -> Vec<OfferId> {
        self.cancels.lock().clone()
    }

    /// Snapshot of every offer sent so far.
    pub fn offers(&self) -> Vec<OfferSnapshot> {
        self.offers.lock().values().cloned().collect()
    }

    /// One sent-offer poll, honouring scripted failures.
    pub(crate) fn poll_offers(&self, cutoff: i64) -> SteamResult<Vec<OfferSnapshot>> {
        self.poll_cutoffs.lock().push(cutoff);
        let mut failures = self.poll_failures.lock();
        if *failures > 0 {
            *failures -= 1;
            return Err(SteamError::HttpClient("mock poll failure".to_string()));
        }
        Ok(self.offers())
    }
}

impl TradeClient for MockTradeClient {
    fn send<'a>(&'a self, draft: &'a OfferDraft) -> BoxFuture<'a, SteamResult<SendOutcome>> {
        Box::pin(async move {
            let delay = *self.send_delay.lock();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            {
                let mut failures = self.send_failures.lock();
                if *failures > 0 {
                    *failures -= 1;
                    return Err(SteamError::HttpClient("mock send failure".to_string()));
                }
            }

            self.sends.lock().push(draft.clone());

            let id = self.next_offer_id.fetch_add(1, Ordering::SeqCst);
            let offer_id = OfferId::new(id.to_string());
            let status = *self.send_status.lock();
            let state = if status == SendStatus::Sent {
                OfferState::Active
            } else {
                OfferState::CreatedNeedsConfirmation
            };

            self.offers.lock().insert(
                offer_id.clone(),
                OfferSnapshot {
                    offer_id: offer_id.clone(),
                    state,
                    is_our_offer: true,
                },
            );

            Ok(SendOutcome { offer_id, status })
        })
    }

    fn confirm<'a>(&'a self, offer_id: &'a OfferId) -> BoxFuture<'a, SteamResult<()>> {
        Box::pin(async move {
            {
                let mut failures = self.confirm_failures.lock();
                if *failures > 0 {
                    *failures -= 1;
                    return Err(SteamError::Confirmation("mock confirm failure".to_string()));
                }
            }

            self.confirms.lock().push(offer_id.clone());
            self.set_offer_state(offer_id, OfferState::Active);
            Ok(())
        })
    }

    fn cancel<'a>(&'a self, offer_id: &'a OfferId) -> BoxFuture<'a, SteamResult<()>> {
        Box::pin(async move {
            self.cancels.lock().push(offer_id.clone());

            if *self.fail_cancel.lock() {
                return Err(SteamError::HttpClient("mock cancel failure".to_string()));
            }

            let mut offers = self.offers.lock();
            let Some(offer) = offers.get_mut(offer_id) else {
                return Err(SteamError::OfferNotFound(offer_id.clone()));
            };
            if offer.state.is_terminal() {
                return Err(SteamError::OfferNotActive {
                    offer_id: offer_id.clone(),
                    state: offer.state,
                });
            }
            offer.state = OfferState::Canceled;
            Ok(())
        })
    }

    fn get_offer<'a>(
        &'a self,
        offer_id: &'a OfferId,
    ) -> BoxFuture<'a, SteamResult<Option<OfferSnapshot>>> {
        Box::pin(async move { Ok(self.offers.lock().get(offer_id).cloned()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use floatsync_core::AssetId;

    fn draft() -> OfferDraft {
        let mut draft =
            OfferDraft::from_trade_url("https://steamcommunity.com/tradeoffer/new/?partner=7")
                .unwrap();
        draft.add_my_item(AssetId::from("123"), 730, 2);
        draft
    }

    #[tokio::test]
    async fn test_send_then_cancel() {
        let client = MockTradeClient::new();
        let outcome = client.send(&draft()).await.unwrap();
        assert_eq!(outcome.offer_id.as_str(), "1000");
        assert_eq!(outcome.status, SendStatus::Sent);

        client.cancel(&outcome.offer_id).await.unwrap();
        let offer = client.get_offer(&outcome.offer_id).await.unwrap().unwrap();
        assert_eq!(offer.state, OfferState::Canceled);
    }

    #[tokio::test]
    async fn test_cancel_accepted_offer_fails() {
        let client = MockTradeClient::new();
        let outcome = client.send(&draft()).await.unwrap();
        client.set_offer_state(&outcome.offer_id, OfferState::Accepted);

        let err = client.cancel(&outcome.offer_id).await.unwrap_err();
        assert!(matches!(err, SteamError::OfferNotActive { .. }));
    }

    #[tokio::test]
    async fn test_cancel_unknown_offer_fails() {
        let client = MockTradeClient::new();
        let err = client.cancel(&OfferId::from("42")).await.unwrap_err();
        assert!(matches!(err, SteamError::OfferNotFound(_)));
        assert_eq!(client.cancels().len(), 1);
    }

    #[tokio::test]
    async fn test_scripted_send_failures() {
        let client = MockTradeClient::new();
        client.fail_sends(1);
        assert!(client.send(&draft()).await.is_err());
        assert!(client.send(&draft()).await.is_ok());
        assert_eq!(client.sends().len(), 1);
    }
}
