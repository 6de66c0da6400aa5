//! Web implementation of [`TradeClient`].
//!
//! Uses the community site (offer submission, mobile confirmations) with the
//! operator-supplied session cookies, and the Web API (offer lookup and
//! cancellation) with an API key. Logging in and refreshing cookies is out of
//! scope: if the cookies are not valid, [`SteamWebClient::establish_session`]
//! fails and the process is expected to exit.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use reqwest::cookie::Jar;
use reqwest::header::REFERER;
use reqwest::{Client, Response, Url};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use floatsync_core::{OfferId, OfferState};

use crate::client::TradeClient;
use crate::confirm::{ConfirmationList, ConfirmationOpResult, ConfirmationSigner, TAG_ACCEPT, TAG_LIST};
use crate::error::{SteamError, SteamResult};
use crate::offer::{OfferDraft, OfferSnapshot, SendOutcome, SendStatus};

/// Default timeout for requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Web client configuration.
#[derive(Clone)]
pub struct SteamWebConfig {
    /// Community site root, e.g. "https://steamcommunity.com".
    pub community_url: String,
    /// Web API root, e.g. "https://api.steampowered.com".
    pub api_url: String,
    /// Web API key.
    pub api_key: Zeroizing<String>,
    /// Our 64-bit steam id.
    pub steam_id: u64,
    /// Base64 identity secret used for mobile confirmations.
    pub identity_secret: Zeroizing<String>,
    /// `steamLoginSecure` cookie value.
    pub login_secure: Zeroizing<String>,
    /// `sessionid` cookie value.
    pub session_id: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for SteamWebConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SteamWebConfig")
            .field("community_url", &self.community_url)
            .field("api_url", &self.api_url)
            .field("steam_id", &self.steam_id)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct ClientJsToken {
    #[serde(default)]
    logged_in: bool,
    #[serde(default)]
    steamid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSendResponse {
    #[serde(default)]
    tradeofferid: Option<String>,
    #[serde(default)]
    needs_mobile_confirmation: bool,
    #[serde(default)]
    needs_email_confirmation: bool,
    #[serde(rename = "strError", default)]
    str_error: Option<String>,
}

/// Offer as returned by `IEconService`.
#[derive(Debug, Deserialize)]
pub(crate) struct RawOffer {
    pub tradeofferid: String,
    pub trade_offer_state: i64,
    #[serde(default)]
    pub is_our_offer: bool,
}

impl RawOffer {
    pub(crate) fn into_snapshot(self) -> SteamResult<OfferSnapshot> {
        Ok(OfferSnapshot {
            offer_id: OfferId::new(self.tradeofferid),
            state: OfferState::from_code(self.trade_offer_state)?,
            is_our_offer: self.is_our_offer,
        })
    }
}

#[derive(Debug, Deserialize)]
struct GetOfferEnvelope {
    response: GetOfferResponse,
}

#[derive(Debug, Default, Deserialize)]
struct GetOfferResponse {
    #[serde(default)]
    offer: Option<RawOffer>,
}

#[derive(Debug, Deserialize)]
struct GetOffersEnvelope {
    response: GetOffersResponse,
}

#[derive(Debug, Default, Deserialize)]
struct GetOffersResponse {
    #[serde(default)]
    trade_offers_sent: Vec<RawOffer>,
}

/// Trade client over the community site and Web API.
pub struct SteamWebClient {
    client: Client,
    community_url: Url,
    api_url: String,
    api_key: Zeroizing<String>,
    session_id: String,
    signer: ConfirmationSigner,
    session_ready: AtomicBool,
    /// Offers sent by this process, with their last known state.
    sent_offers: Mutex<HashMap<OfferId, OfferSnapshot>>,
}

impl SteamWebClient {
    /// Build the client and install the session cookies.
    pub fn new(config: SteamWebConfig) -> SteamResult<Self> {
        let community_url = Url::parse(&config.community_url)
            .map_err(|e| SteamError::Session(format!("invalid community url: {e}")))?;

        let jar = Arc::new(Jar::default());
        let domain = community_url.host_str().unwrap_or("steamcommunity.com").to_string();
        jar.add_cookie_str(
            &format!(
                "steamLoginSecure={}; Domain={domain}; Path=/; Secure; HttpOnly",
                config.login_secure.as_str()
            ),
            &community_url,
        );
        jar.add_cookie_str(
            &format!("sessionid={}; Domain={domain}; Path=/", config.session_id),
            &community_url,
        );

        let client = Client::builder()
            .timeout(config.timeout)
            .cookie_provider(jar)
            .build()
            .map_err(|e| SteamError::HttpClient(format!("Failed to create HTTP client: {e}")))?;

        let signer = ConfirmationSigner::new(&config.identity_secret, config.steam_id)?;

        Ok(Self {
            client,
            community_url,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
            session_id: config.session_id,
            signer,
            session_ready: AtomicBool::new(false),
            sent_offers: Mutex::new(HashMap::new()),
        })
    }

    /// Default timeout for callers building a config by hand.
    pub fn default_timeout() -> Duration {
        DEFAULT_TIMEOUT
    }

    fn community(&self, path: &str) -> String {
        format!(
            "{}{}",
            self.community_url.as_str().trim_end_matches('/'),
            path
        )
    }

    fn api(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    /// Returns true once `establish_session` succeeded.
    pub fn is_session_ready(&self) -> bool {
        self.session_ready.load(Ordering::SeqCst)
    }

    /// Verify that the installed cookies give a logged-in web session.
    ///
    /// This is the "session established" precondition for the reconciler.
    pub async fn establish_session(&self) -> SteamResult<()> {
        let url = self.community("/chat/clientjstoken");
        info!(url = %url, "Verifying web session");

        let response = self.client.get(&url).send().await.map_err(http_err)?;
        let token: ClientJsToken = json_body(response).await?;

        if !token.logged_in {
            return Err(SteamError::Session(
                "web session cookies are not logged in".to_string(),
            ));
        }

        let expected = self.signer.steam_id().to_string();
        if let Some(steamid) = &token.steamid {
            if *steamid != expected {
                return Err(SteamError::Session(format!(
                    "session belongs to {steamid}, configured account is {expected}"
                )));
            }
        }

        self.session_ready.store(true, Ordering::SeqCst);
        info!(steam_id = %expected, "Web session established");
        Ok(())
    }

    async fn send_draft(&self, draft: &OfferDraft) -> SteamResult<SendOutcome> {
        if draft.items.is_empty() {
            return Err(SteamError::Rejected("offer has no items".to_string()));
        }

        let assets: Vec<_> = draft
            .items
            .iter()
            .map(|item| {
                json!({
                    "appid": item.app_id,
                    "contextid": item.context_id.to_string(),
                    "amount": 1,
                    "assetid": item.asset_id.as_str(),
                })
            })
            .collect();

        let offer = json!({
            "newversion": true,
            "version": assets.len() + 1,
            "me": { "assets": assets, "currency": [], "ready": false },
            "them": { "assets": [], "currency": [], "ready": false },
        });

        let create_params = match &draft.access_token {
            Some(token) => json!({ "trade_offer_access_token": token }),
            None => json!({}),
        };

        let partner = draft.partner_steam_id().to_string();
        let form = [
            ("sessionid", self.session_id.clone()),
            ("serverid", "1".to_string()),
            ("partner", partner),
            ("tradeoffermessage", draft.message.clone()),
            ("json_tradeoffer", offer.to_string()),
            ("captcha", String::new()),
            ("trade_offer_create_params", create_params.to_string()),
        ];

        let response = self
            .client
            .post(self.community("/tradeoffer/new/send"))
            .header(REFERER, &draft.trade_url)
            .form(&form)
            .send()
            .await
            .map_err(http_err)?;

        let status = response.status();
        let body = response.text().await.map_err(http_err)?;
        let parsed: Option<RawSendResponse> = serde_json::from_str(&body).ok();

        if let Some(err) = parsed.as_ref().and_then(|r| r.str_error.clone()) {
            return Err(SteamError::Rejected(err));
        }
        if !status.is_success() {
            return Err(SteamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed = parsed.ok_or_else(|| SteamError::Parse(format!("send response: {body}")))?;
        let offer_id = parsed
            .tradeofferid
            .map(OfferId::new)
            .ok_or_else(|| SteamError::Parse("send response has no tradeofferid".to_string()))?;

        let status = if parsed.needs_mobile_confirmation {
            SendStatus::NeedsConfirmation
        } else if parsed.needs_email_confirmation {
            SendStatus::NeedsEmailConfirmation
        } else {
            SendStatus::Sent
        };

        let state = if status == SendStatus::Sent {
            OfferState::Active
        } else {
            OfferState::CreatedNeedsConfirmation
        };
        self.sent_offers.lock().insert(
            offer_id.clone(),
            OfferSnapshot {
                offer_id: offer_id.clone(),
                state,
                is_our_offer: true,
            },
        );

        debug!(offer_id = %offer_id, %status, "Offer submitted");
        Ok(SendOutcome { offer_id, status })
    }

    async fn confirm_offer(&self, offer_id: &OfferId) -> SteamResult<()> {
        let time = chrono::Utc::now().timestamp();
        let device_id = self.signer.device_id();
        let steam_id = self.signer.steam_id().to_string();

        let list_key = self.signer.key(time, TAG_LIST)?;
        let time_str = time.to_string();
        let response = self
            .client
            .get(self.community("/mobileconf/getlist"))
            .query(&[
                ("p", device_id.as_str()),
                ("a", steam_id.as_str()),
                ("k", list_key.as_str()),
                ("t", time_str.as_str()),
                ("m", "react"),
                ("tag", TAG_LIST),
            ])
            .send()
            .await
            .map_err(http_err)?;
        let list: ConfirmationList = json_body(response).await?;

        if !list.success {
            return Err(SteamError::Confirmation(
                list.message
                    .unwrap_or_else(|| "confirmation list unavailable".to_string()),
            ));
        }

        let conf = list.for_offer(offer_id.as_str()).ok_or_else(|| {
            SteamError::Confirmation(format!("no pending confirmation for offer {offer_id}"))
        })?;

        let accept_key = self.signer.key(time, TAG_ACCEPT)?;
        let response = self
            .client
            .get(self.community("/mobileconf/ajaxop"))
            .query(&[
                ("op", "allow"),
                ("p", device_id.as_str()),
                ("a", steam_id.as_str()),
                ("k", accept_key.as_str()),
                ("t", time_str.as_str()),
                ("m", "react"),
                ("tag", TAG_ACCEPT),
                ("cid", conf.id.as_str()),
                ("ck", conf.nonce.as_str()),
            ])
            .send()
            .await
            .map_err(http_err)?;
        let result: ConfirmationOpResult = json_body(response).await?;

        if !result.success {
            return Err(SteamError::Confirmation(format!(
                "confirmation for offer {offer_id} was not accepted"
            )));
        }

        self.record_state(offer_id, OfferState::Active);
        Ok(())
    }

    /// Fetch an offer from the Web API, bypassing the local cache.
    pub async fn fetch_offer(&self, offer_id: &OfferId) -> SteamResult<Option<OfferSnapshot>> {
        let response = self
            .client
            .get(self.api("/IEconService/GetTradeOffer/v1/"))
            .query(&[
                ("key", self.api_key.as_str()),
                ("tradeofferid", offer_id.as_str()),
            ])
            .send()
            .await
            .map_err(http_err)?;
        let envelope: GetOfferEnvelope = json_body(response).await?;

        envelope
            .response
            .offer
            .map(RawOffer::into_snapshot)
            .transpose()
    }

    /// Fetch our sent offers updated since `cutoff` (unix seconds).
    pub async fn fetch_sent_offers(&self, cutoff: i64) -> SteamResult<Vec<OfferSnapshot>> {
        let cutoff = cutoff.to_string();
        let response = self
            .client
            .get(self.api("/IEconService/GetTradeOffers/v1/"))
            .query(&[
                ("key", self.api_key.as_str()),
                ("get_sent_offers", "1"),
                ("get_received_offers", "0"),
                ("active_only", "1"),
                ("time_historical_cutoff", cutoff.as_str()),
            ])
            .send()
            .await
            .map_err(http_err)?;
        let envelope: GetOffersEnvelope = json_body(response).await?;

        let mut offers = Vec::with_capacity(envelope.response.trade_offers_sent.len());
        for raw in envelope.response.trade_offers_sent {
            match raw.into_snapshot() {
                Ok(snapshot) => offers.push(snapshot),
                Err(e) => warn!(error = %e, "Skipping offer with unknown state"),
            }
        }
        Ok(offers)
    }

    /// Cached state of an offer sent by this process.
    pub fn cached_state(&self, offer_id: &OfferId) -> Option<OfferState> {
        self.sent_offers.lock().get(offer_id).map(|o| o.state)
    }

    /// Update the cached state of an offer sent by this process.
    pub fn record_state(&self, offer_id: &OfferId, state: OfferState) {
        if let Some(offer) = self.sent_offers.lock().get_mut(offer_id) {
            offer.state = state;
        }
    }

    async fn lookup_offer(&self, offer_id: &OfferId) -> SteamResult<Option<OfferSnapshot>> {
        let cached = self.sent_offers.lock().get(offer_id).cloned();
        if cached.is_some() {
            return Ok(cached);
        }
        self.fetch_offer(offer_id).await
    }

    async fn cancel_offer(&self, offer_id: &OfferId) -> SteamResult<()> {
        // Cached states may lag; ask the API before withdrawing.
        let offer = match self.fetch_offer(offer_id).await? {
            Some(offer) => offer,
            None => self
                .lookup_offer(offer_id)
                .await?
                .ok_or_else(|| SteamError::OfferNotFound(offer_id.clone()))?,
        };

        if offer.state.is_terminal() {
            self.record_state(offer_id, offer.state);
            return Err(SteamError::OfferNotActive {
                offer_id: offer_id.clone(),
                state: offer.state,
            });
        }

        let response = self
            .client
            .post(self.api("/IEconService/CancelTradeOffer/v1/"))
            .form(&[
                ("key", self.api_key.as_str()),
                ("tradeofferid", offer_id.as_str()),
            ])
            .send()
            .await
            .map_err(http_err)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SteamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        self.sent_offers.lock().remove(offer_id);
        Ok(())
    }
}

impl TradeClient for SteamWebClient {
    fn send<'a>(&'a self, draft: &'a OfferDraft) -> BoxFuture<'a, SteamResult<SendOutcome>> {
        Box::pin(self.send_draft(draft))
    }

    fn confirm<'a>(&'a self, offer_id: &'a OfferId) -> BoxFuture<'a, SteamResult<()>> {
        Box::pin(self.confirm_offer(offer_id))
    }

    fn cancel<'a>(&'a self, offer_id: &'a OfferId) -> BoxFuture<'a, SteamResult<()>> {
        Box::pin(self.cancel_offer(offer_id))
    }

    fn get_offer<'a>(
        &'a self,
        offer_id: &'a OfferId,
    ) -> BoxFuture<'a, SteamResult<Option<OfferSnapshot>>> {
        Box::pin(self.lookup_offer(offer_id))
    }
}

fn http_err(e: reqwest::Error) -> SteamError {
    SteamError::HttpClient(format!("HTTP request failed: {e}"))
}

async fn json_body<T: serde::de::DeserializeOwned>(response: Response) -> SteamResult<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(SteamError::Status {
            status: status.as_u16(),
            body,
        });
    }

    response
        .json()
        .await
        .map_err(|e| SteamError::Parse(format!("Failed to parse response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SteamWebConfig {
        SteamWebConfig {
            community_url: "https://steamcommunity.com".to_string(),
            api_url: "https://api.steampowered.com/".to_string(),
            api_key: Zeroizing::new("key".to_string()),
            steam_id: 76561198000000000,
            identity_secret: Zeroizing::new("MDEyMzQ1Njc4OWFiY2RlZmdoaWo=".to_string()),
            login_secure: Zeroizing::new("cookie".to_string()),
            session_id: "sess".to_string(),
            timeout: Duration::from_millis(500),
        }
    }

    #[test]
    fn test_urls() {
        let client = SteamWebClient::new(config()).unwrap();
        assert_eq!(
            client.community("/tradeoffer/new/send"),
            "https://steamcommunity.com/tradeoffer/new/send"
        );
        assert_eq!(
            client.api("/IEconService/GetTradeOffer/v1/"),
            "https://api.steampowered.com/IEconService/GetTradeOffer/v1/"
        );
        assert!(!client.is_session_ready());
    }

    #[test]
    fn test_bad_identity_secret_is_rejected() {
        let mut cfg = config();
        cfg.identity_secret = Zeroizing::new("???".to_string());
        assert!(matches!(
            SteamWebClient::new(cfg),
            Err(SteamError::Secret(_))
        ));
    }

    #[test]
    fn test_raw_offer_snapshot() {
        let raw: RawOffer = serde_json::from_value(json!({
            "tradeofferid": "6150120593",
            "trade_offer_state": 3,
            "is_our_offer": true,
            "items_to_give": []
        }))
        .unwrap();
        let snapshot = raw.into_snapshot().unwrap();
        assert_eq!(snapshot.state, OfferState::Accepted);
        assert!(snapshot.is_our_offer);
    }

    #[test]
    fn test_send_response_parsing() {
        let parsed: RawSendResponse = serde_json::from_str(
            r#"{"tradeofferid":"123","needs_mobile_confirmation":true,"needs_email_confirmation":false,"email_domain":""}"#,
        )
        .unwrap();
        assert_eq!(parsed.tradeofferid.as_deref(), Some("123"));
        assert!(parsed.needs_mobile_confirmation);

        let parsed: RawSendResponse =
            serde_json::from_str(r#"{"strError":"There was an error sending your trade offer. (26)"}"#)
                .unwrap();
        assert!(parsed.str_error.unwrap().contains("(26)"));
    }

    #[tokio::test]
    async fn test_empty_draft_is_rejected_before_network() {
        let client = SteamWebClient::new(config()).unwrap();
        let draft =
            OfferDraft::from_trade_url("https://steamcommunity.com/tradeoffer/new/?partner=7")
                .unwrap();
        let err = client.send(&draft).await.unwrap_err();
        assert!(matches!(err, SteamError::Rejected(_)));
    }
}
