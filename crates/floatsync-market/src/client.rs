//! HTTP client for the marketplace REST API.
//!
//! Every request carries the seller's API key in the `Authorization` header.
//! Requests can optionally be routed through an HTTPS proxy.

use std::time::Duration;

use futures_util::future::BoxFuture;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Proxy};
use tracing::{debug, info};
use zeroize::Zeroizing;

use floatsync_core::TradeId;

use crate::api::MarketApi;
use crate::error::{MarketError, MarketResult};
use crate::snapshot::TradesSnapshot;

/// Default marketplace API root.
pub const DEFAULT_BASE_URL: &str = "https://csgofloat.com/api/v1";

/// Default timeout for API requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Outbound proxy settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub host: String,
    /// Default: 443.
    pub port: u16,
    /// Scheme, with or without trailing colon (e.g. "https:"). Default: https.
    pub protocol: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ProxyConfig {
    /// Proxy URL in `scheme://host:port` form.
    pub fn url(&self) -> String {
        let scheme = self.protocol.trim_end_matches(':');
        let scheme = if scheme.is_empty() { "https" } else { scheme };
        format!("{scheme}://{}:{}", self.host, self.port)
    }

    fn to_proxy(&self) -> MarketResult<Proxy> {
        let proxy = Proxy::all(self.url()).map_err(|e| MarketError::Proxy(e.to_string()))?;
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => Ok(proxy.basic_auth(user, pass)),
            _ => Ok(proxy),
        }
    }
}

/// Marketplace client configuration.
#[derive(Clone)]
pub struct MarketClientConfig {
    /// API root, e.g. "https://csgofloat.com/api/v1".
    pub base_url: String,
    /// Seller API key.
    pub api_key: Zeroizing<String>,
    pub timeout: Duration,
    pub proxy: Option<ProxyConfig>,
}

impl MarketClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: Zeroizing::new(api_key.into()),
            timeout: DEFAULT_TIMEOUT,
            proxy: None,
        }
    }
}

impl std::fmt::Debug for MarketClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketClientConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("timeout", &self.timeout)
            .field("proxy", &self.proxy.as_ref().map(ProxyConfig::url))
            .finish()
    }
}

/// Client for the marketplace REST API.
pub struct MarketClient {
    /// HTTP client with default auth header installed.
    client: Client,
    /// API root without trailing slash.
    base_url: String,
}

impl MarketClient {
    /// Create a new marketplace client.
    pub fn new(config: MarketClientConfig) -> MarketResult<Self> {
        let mut auth = HeaderValue::from_str(config.api_key.as_str())
            .map_err(|e| MarketError::HttpClient(format!("Invalid API key header: {e}")))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let mut builder = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers);

        if let Some(proxy) = &config.proxy {
            info!(proxy = %proxy.url(), "Routing marketplace requests through proxy");
            builder = builder.proxy(proxy.to_proxy()?);
        }

        let client = builder
            .build()
            .map_err(|e| MarketError::HttpClient(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Fetch the current `trades_to_send` queue.
    pub async fn fetch_me(&self) -> MarketResult<TradesSnapshot> {
        let url = self.url("/me");
        debug!(url = %url, "Fetching trades to send");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| MarketError::HttpClient(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MarketError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| MarketError::Parse(format!("Failed to parse response: {e}")))?;

        TradesSnapshot::from_me_body(body)
    }

    /// Accept a sale so it can be sent.
    pub async fn accept(&self, trade_id: &TradeId) -> MarketResult<()> {
        let url = self.url(&format!("/trades/{trade_id}/accept"));
        debug!(url = %url, trade_id = %trade_id, "Accepting trade");

        let response = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(|e| MarketError::HttpClient(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MarketError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

impl MarketApi for MarketClient {
    fn fetch_trades_to_send(&self) -> BoxFuture<'_, MarketResult<TradesSnapshot>> {
        Box::pin(self.fetch_me())
    }

    fn accept_trade<'a>(&'a self, trade_id: &'a TradeId) -> BoxFuture<'a, MarketResult<()>> {
        Box::pin(self.accept(trade_id))
    }
}
