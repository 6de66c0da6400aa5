//! Application configuration.
//!
//! Loaded from TOML; credentials are normally left out of the file and
//! supplied through `FLOATSYNC_*` environment variables (or `.env`).

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use zeroize::Zeroizing;

use floatsync_market::{MarketClientConfig, ProxyConfig};
use floatsync_reconcile::{ReconcilerConfig, RetryPolicy};
use floatsync_steam::SteamWebConfig;

use crate::error::{AppError, AppResult};

// ============================================================================
// Marketplace
// ============================================================================

/// Outbound proxy for marketplace requests.
#[derive(Debug, Clone, Deserialize)]
pub struct ProxySection {
    pub host: String,
    #[serde(default = "default_proxy_port")]
    pub port: u16,
    #[serde(default = "default_proxy_protocol")]
    pub protocol: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_proxy_port() -> u16 {
    443
}

fn default_proxy_protocol() -> String {
    "https:".to_string()
}

#[derive(Clone, Deserialize)]
pub struct MarketSection {
    #[serde(default = "default_market_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_market_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub proxy: Option<ProxySection>,
}

fn default_market_base_url() -> String {
    floatsync_market::client::DEFAULT_BASE_URL.to_string()
}

fn default_market_timeout_secs() -> u64 {
    10
}

impl Default for MarketSection {
    fn default() -> Self {
        Self {
            base_url: default_market_base_url(),
            api_key: String::new(),
            timeout_secs: default_market_timeout_secs(),
            proxy: None,
        }
    }
}

impl fmt::Debug for MarketSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarketSection")
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("proxy", &self.proxy.as_ref().map(|p| &p.host))
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Steam
// ============================================================================

#[derive(Clone, Deserialize)]
pub struct SteamSection {
    #[serde(default = "default_community_url")]
    pub community_url: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub steam_id: u64,
    #[serde(default)]
    pub identity_secret: String,
    #[serde(default)]
    pub login_secure: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(default = "default_steam_timeout_secs")]
    pub timeout_secs: u64,
    /// Sent-offer watcher poll interval.
    #[serde(default = "default_watch_interval_secs")]
    pub watch_interval_secs: u64,
}

fn default_community_url() -> String {
    "https://steamcommunity.com".to_string()
}

fn default_api_url() -> String {
    "https://api.steampowered.com".to_string()
}

fn default_steam_timeout_secs() -> u64 {
    30
}

fn default_watch_interval_secs() -> u64 {
    10
}

impl Default for SteamSection {
    fn default() -> Self {
        Self {
            community_url: default_community_url(),
            api_url: default_api_url(),
            api_key: String::new(),
            steam_id: 0,
            identity_secret: String::new(),
            login_secure: String::new(),
            session_id: String::new(),
            timeout_secs: default_steam_timeout_secs(),
            watch_interval_secs: default_watch_interval_secs(),
        }
    }
}

impl fmt::Debug for SteamSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SteamSection")
            .field("community_url", &self.community_url)
            .field("api_url", &self.api_url)
            .field("steam_id", &self.steam_id)
            .field("timeout_secs", &self.timeout_secs)
            .field("watch_interval_secs", &self.watch_interval_secs)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Reconciler
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ReconcilerSection {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    #[serde(default = "default_retirement_cooldown_secs")]
    pub retirement_cooldown_secs: u64,
    #[serde(default = "default_app_id")]
    pub app_id: u32,
    #[serde(default = "default_context_id")]
    pub context_id: u64,
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_secs() -> u64 {
    5
}

fn default_retirement_cooldown_secs() -> u64 {
    300
}

fn default_app_id() -> u32 {
    730
}

fn default_context_id() -> u64 {
    2
}

impl Default for ReconcilerSection {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            retry_attempts: default_retry_attempts(),
            retry_delay_secs: default_retry_delay_secs(),
            retirement_cooldown_secs: default_retirement_cooldown_secs(),
            app_id: default_app_id(),
            context_id: default_context_id(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotifySection {
    /// Discord webhook. Without it, notifications only go to the log.
    #[serde(default)]
    pub discord_webhook_url: Option<String>,
}

// ============================================================================
// AppConfig
// ============================================================================

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub market: MarketSection,
    #[serde(default)]
    pub steam: SteamSection,
    #[serde(default)]
    pub reconciler: ReconcilerSection,
    #[serde(default)]
    pub notify: NotifySection,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }

    /// Override fields from `FLOATSYNC_*` environment variables.
    pub fn apply_env_overrides(&mut self) -> AppResult<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Override fields from a variable lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> AppResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("FLOATSYNC_MARKET_API_KEY") {
            self.market.api_key = v;
        }
        if let Some(v) = get("FLOATSYNC_STEAM_API_KEY") {
            self.steam.api_key = v;
        }
        if let Some(v) = get("FLOATSYNC_STEAM_ID") {
            self.steam.steam_id = v
                .trim()
                .parse()
                .map_err(|e| AppError::Config(format!("FLOATSYNC_STEAM_ID: {e}")))?;
        }
        if let Some(v) = get("FLOATSYNC_STEAM_IDENTITY_SECRET") {
            self.steam.identity_secret = v;
        }
        if let Some(v) = get("FLOATSYNC_STEAM_LOGIN_SECURE") {
            self.steam.login_secure = v;
        }
        if let Some(v) = get("FLOATSYNC_STEAM_SESSION_ID") {
            self.steam.session_id = v;
        }
        if let Some(v) = get("FLOATSYNC_DISCORD_WEBHOOK_URL") {
            self.notify.discord_webhook_url = Some(v);
        }

        if let Some(host) = get("FLOATSYNC_PROXY_HOST") {
            let port = match get("FLOATSYNC_PROXY_PORT") {
                Some(p) => p
                    .trim()
                    .parse()
                    .map_err(|e| AppError::Config(format!("FLOATSYNC_PROXY_PORT: {e}")))?,
                None => default_proxy_port(),
            };
            self.market.proxy = Some(ProxySection {
                host,
                port,
                protocol: get("FLOATSYNC_PROXY_PROTOCOL").unwrap_or_else(default_proxy_protocol),
                username: get("FLOATSYNC_PROXY_USERNAME"),
                password: get("FLOATSYNC_PROXY_PASSWORD"),
            });
        }

        Ok(())
    }

    /// Reject configurations the bot cannot run with.
    pub fn validate(&self) -> AppResult<()> {
        let required = [
            ("market.api_key", self.market.api_key.is_empty()),
            ("steam.api_key", self.steam.api_key.is_empty()),
            ("steam.identity_secret", self.steam.identity_secret.is_empty()),
            ("steam.login_secure", self.steam.login_secure.is_empty()),
            ("steam.session_id", self.steam.session_id.is_empty()),
            ("steam.steam_id", self.steam.steam_id == 0),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, missing)| *missing)
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            return Err(AppError::Config(format!(
                "missing required settings: {}",
                missing.join(", ")
            )));
        }

        let r = &self.reconciler;
        if r.poll_interval_secs == 0 || self.steam.watch_interval_secs == 0 {
            return Err(AppError::Config("poll intervals must be positive".to_string()));
        }
        if r.retry_attempts == 0 {
            return Err(AppError::Config(
                "reconciler.retry_attempts must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    pub fn reconciler_config(&self) -> ReconcilerConfig {
        let r = &self.reconciler;
        ReconcilerConfig {
            poll_interval: Duration::from_secs(r.poll_interval_secs),
            retry: RetryPolicy::new(r.retry_attempts, Duration::from_secs(r.retry_delay_secs)),
            retirement_cooldown: Duration::from_secs(r.retirement_cooldown_secs),
            app_id: r.app_id,
            context_id: r.context_id,
            ..ReconcilerConfig::default()
        }
    }

    pub fn market_client_config(&self) -> MarketClientConfig {
        let m = &self.market;
        MarketClientConfig {
            base_url: m.base_url.clone(),
            api_key: Zeroizing::new(m.api_key.clone()),
            timeout: Duration::from_secs(m.timeout_secs),
            proxy: m.proxy.as_ref().map(|p| ProxyConfig {
                host: p.host.clone(),
                port: p.port,
                protocol: p.protocol.clone(),
                username: p.username.clone(),
                password: p.password.clone(),
            }),
        }
    }

    pub fn steam_web_config(&self) -> SteamWebConfig {
        let s = &self.steam;
        SteamWebConfig {
            community_url: s.community_url.clone(),
            api_url: s.api_url.clone(),
            api_key: Zeroizing::new(s.api_key.clone()),
            steam_id: s.steam_id,
            identity_secret: Zeroizing::new(s.identity_secret.clone()),
            login_secure: Zeroizing::new(s.login_secure.clone()),
            session_id: s.session_id.clone(),
            timeout: Duration::from_secs(s.timeout_secs),
        }
    }

    pub fn watch_interval(&self) -> Duration {
        Duration::from_secs(self.steam.watch_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn complete() -> AppConfig {
        let mut config = AppConfig::default();
        let vars = env(&[
            ("FLOATSYNC_MARKET_API_KEY", "market-key"),
            ("FLOATSYNC_STEAM_API_KEY", "steam-key"),
            ("FLOATSYNC_STEAM_ID", "76561198000000000"),
            ("FLOATSYNC_STEAM_IDENTITY_SECRET", "MDEyMzQ1Njc4OWFiY2RlZmdoaWo="),
            ("FLOATSYNC_STEAM_LOGIN_SECURE", "cookie"),
            ("FLOATSYNC_STEAM_SESSION_ID", "session"),
        ]);
        config.apply_overrides(|k| vars.get(k).cloned()).unwrap();
        config
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config.market.base_url, "https://csgofloat.com/api/v1");
        assert_eq!(config.reconciler.poll_interval_secs, 60);
        assert_eq!(config.reconciler.retry_attempts, 3);
        assert_eq!(config.reconciler.retirement_cooldown_secs, 300);
        assert_eq!(config.reconciler.app_id, 730);
        assert_eq!(config.reconciler.context_id, 2);
        assert!(config.notify.discord_webhook_url.is_none());

        let rc = config.reconciler_config();
        assert_eq!(rc.poll_interval, Duration::from_secs(60));
        assert_eq!(rc.retry, RetryPolicy::default());
        assert_eq!(rc.retirement_cooldown, Duration::from_secs(300));
    }

    #[test]
    fn test_parse_sections() {
        let config = AppConfig::from_toml(
            r#"
            [market]
            timeout_secs = 20

            [market.proxy]
            host = "proxy.local"
            username = "u"
            password = "p"

            [steam]
            watch_interval_secs = 15

            [reconciler]
            poll_interval_secs = 30
            "#,
        )
        .unwrap();

        assert_eq!(config.market.timeout_secs, 20);
        let proxy = config.market_client_config().proxy.unwrap();
        assert_eq!(proxy.url(), "https://proxy.local:443");
        assert_eq!(config.watch_interval(), Duration::from_secs(15));
        assert_eq!(config.reconciler.poll_interval_secs, 30);
        assert_eq!(config.reconciler.retry_delay_secs, 5);
    }

    #[test]
    fn test_env_overrides_and_validate() {
        let config = complete();
        assert_eq!(config.steam.steam_id, 76561198000000000);
        assert_eq!(config.market.api_key, "market-key");
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_reports_missing_credentials() {
        let err = AppConfig::default().validate().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("market.api_key"));
        assert!(msg.contains("steam.steam_id"));
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let mut config = complete();
        config.reconciler.retry_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_steam_id() {
        let mut config = AppConfig::default();
        let vars = env(&[("FLOATSYNC_STEAM_ID", "not-a-number")]);
        assert!(config.apply_overrides(|k| vars.get(k).cloned()).is_err());
    }

    #[test]
    fn test_proxy_from_env() {
        let mut config = AppConfig::default();
        let vars = env(&[
            ("FLOATSYNC_PROXY_HOST", "10.0.0.1"),
            ("FLOATSYNC_PROXY_PORT", "8080"),
            ("FLOATSYNC_PROXY_PROTOCOL", "http:"),
        ]);
        config.apply_overrides(|k| vars.get(k).cloned()).unwrap();
        let proxy = config.market_client_config().proxy.unwrap();
        assert_eq!(proxy.url(), "http://10.0.0.1:8080");
        assert!(proxy.username.is_none());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = complete();
        let debug = format!("{config:?}");
        assert!(!debug.contains("market-key"));
        assert!(!debug.contains("cookie"));
    }
}
