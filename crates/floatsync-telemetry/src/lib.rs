//! Prometheus metrics, structured logging and operator notifications.
//!
//! - Structured JSON logging with tracing
//! - Prometheus counters for poll cycles and offer lifecycle outcomes
//! - `Notifier`: fire-and-forget, human-visible messages (Discord webhook)

pub mod error;
pub mod logging;
pub mod metrics;
pub mod notify;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
pub use notify::{DiscordNotifier, DynNotifier, LogNotifier, Notifier, RecordingNotifier};
