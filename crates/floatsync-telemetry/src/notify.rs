//! Operator notifications.
//!
//! Every give-up decision in the reconciler ends in a human-visible message.
//! Notifiers are fire-and-forget: delivery failures are logged here and never
//! reach the caller.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use reqwest::Client;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::{TelemetryError, TelemetryResult};

/// Timeout for a single webhook delivery.
const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Sink for human-visible messages.
pub trait Notifier: Send + Sync {
    /// Emit a message. Must not block and must not fail.
    fn notify(&self, message: &str);
}

/// Arc wrapper for Notifier trait objects.
pub type DynNotifier = Arc<dyn Notifier>;

/// Notifier that only writes to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str) {
        info!(target: "floatsync::notify", "{message}");
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    content: &'a str,
}

/// Posts messages to a Discord webhook and logs them.
#[derive(Debug, Clone)]
pub struct DiscordNotifier {
    client: Client,
    webhook_url: String,
}

impl DiscordNotifier {
    /// Create a notifier for the given webhook URL.
    pub fn new(webhook_url: impl Into<String>) -> TelemetryResult<Self> {
        let client = Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .map_err(|e| TelemetryError::Notifier(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            webhook_url: webhook_url.into(),
        })
    }

    async fn deliver(client: Client, url: String, content: String) {
        let payload = WebhookPayload { content: &content };
        match client.post(&url).json(&payload).send().await {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => {
                warn!(status = %resp.status(), "Error sending notification to Discord");
            }
            Err(e) => {
                error!(error = %e, "Error sending notification to Discord");
            }
        }
    }
}

impl Notifier for DiscordNotifier {
    fn notify(&self, message: &str) {
        info!(target: "floatsync::notify", "{message}");

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No async runtime available, notification only logged");
            return;
        };

        runtime.spawn(Self::deliver(
            self.client.clone(),
            self.webhook_url.clone(),
            message.to_string(),
        ));
    }
}

/// Notifier that records messages in memory.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get recorded messages.
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }

    /// Count recorded messages containing `needle`.
    pub fn count_containing(&self, needle: &str) -> usize {
        self.messages
            .lock()
            .iter()
            .filter(|m| m.contains(needle))
            .count()
    }

    /// Clear recorded messages.
    pub fn clear(&self) {
        self.messages.lock().clear();
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, message: &str) {
        self.messages.lock().push(message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_notifier() {
        let notifier = RecordingNotifier::new();
        notifier.notify("Offer sent for AK-47 to buyer");
        notifier.notify("Offer 1 confirmed");

        assert_eq!(notifier.messages().len(), 2);
        assert_eq!(notifier.count_containing("Offer"), 2);
        assert_eq!(notifier.count_containing("confirmed"), 1);

        notifier.clear();
        assert!(notifier.messages().is_empty());
    }

    #[test]
    fn test_discord_notifier_without_runtime_does_not_panic() {
        let notifier = DiscordNotifier::new("http://127.0.0.1:9/webhook").unwrap();
        notifier.notify("hello");
    }

    #[tokio::test]
    async fn test_discord_delivery_failure_is_swallowed() {
        let notifier = DiscordNotifier::new("http://127.0.0.1:9/webhook").unwrap();
        let dyn_notifier: DynNotifier = Arc::new(notifier);
        dyn_notifier.notify("unreachable webhook");
        tokio::task::yield_now().await;
    }
}
