//! Reconciler tuning.

use std::time::Duration;

use crate::retry::RetryPolicy;

/// Marketplace poll interval.
pub const POLL_INTERVAL: Duration = Duration::from_secs(60);

/// How long an accepted or cancelled offer stays registered.
pub const RETIREMENT_COOLDOWN: Duration = Duration::from_secs(5 * 60);

/// CS2 app id.
pub const DEFAULT_APP_ID: u32 = 730;

/// CS2 inventory context.
pub const DEFAULT_CONTEXT_ID: u64 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerConfig {
    pub poll_interval: Duration,
    /// Policy for marketplace accept and offer send/confirm.
    pub retry: RetryPolicy,
    pub retirement_cooldown: Duration,
    pub app_id: u32,
    pub context_id: u64,
    /// Actor inbox capacity.
    pub inbox_capacity: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            poll_interval: POLL_INTERVAL,
            retry: RetryPolicy::default(),
            retirement_cooldown: RETIREMENT_COOLDOWN,
            app_id: DEFAULT_APP_ID,
            context_id: DEFAULT_CONTEXT_ID,
            inbox_capacity: 256,
        }
    }
}
