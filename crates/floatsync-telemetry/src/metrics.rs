//! Prometheus metrics for the reconciler.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`. A registration failure means a
//! duplicate metric name, which is a startup bug and should crash immediately.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_int_counter, register_int_gauge, CounterVec, Encoder,
    IntCounter, IntGauge, TextEncoder,
};

use crate::error::{TelemetryError, TelemetryResult};

/// Marketplace poll cycles.
/// Labels: outcome (ok/failed)
pub static POLL_CYCLES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "floatsync_poll_cycles_total",
        "Marketplace poll cycles by outcome",
        &["outcome"]
    )
    .unwrap()
});

/// Snapshot entries that failed to parse and were skipped.
pub static QUARANTINED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "floatsync_quarantined_entries_total",
        "Marketplace snapshot entries rejected at the boundary"
    )
    .unwrap()
});

/// Lifecycle step outcomes.
/// Labels: step (accept/send/confirm/cancel), outcome (ok/failed)
pub static LIFECYCLE_STEPS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "floatsync_lifecycle_steps_total",
        "Offer lifecycle steps by outcome",
        &["step", "outcome"]
    )
    .unwrap()
});

/// Offers observed as accepted by the buyer.
pub static OFFERS_ACCEPTED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "floatsync_offers_accepted_total",
        "Outbound offers accepted by the buyer"
    )
    .unwrap()
});

/// Grace-period deadlines that fired.
pub static DEADLINES_FIRED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "floatsync_deadlines_fired_total",
        "Grace-period deadlines that fired"
    )
    .unwrap()
});

/// Offers currently held in the registry.
pub static TRACKED_OFFERS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "floatsync_tracked_offers",
        "TrackedOffers currently registered"
    )
    .unwrap()
});

/// Currently armed grace-period deadlines.
pub static ARMED_DEADLINES: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "floatsync_armed_deadlines",
        "Grace-period deadlines currently armed"
    )
    .unwrap()
});

/// Metrics facade.
pub struct Metrics;

impl Metrics {
    /// Record a completed poll cycle.
    pub fn poll_cycle(ok: bool) {
        let outcome = if ok { "ok" } else { "failed" };
        POLL_CYCLES_TOTAL.with_label_values(&[outcome]).inc();
    }

    /// Record a quarantined snapshot entry.
    pub fn entry_quarantined() {
        QUARANTINED_TOTAL.inc();
    }

    /// Record the outcome of a lifecycle step.
    pub fn lifecycle_step(step: &str, ok: bool) {
        let outcome = if ok { "ok" } else { "failed" };
        LIFECYCLE_STEPS_TOTAL
            .with_label_values(&[step, outcome])
            .inc();
    }

    /// Record an accepted offer.
    pub fn offer_accepted() {
        OFFERS_ACCEPTED_TOTAL.inc();
    }

    /// Record a fired deadline.
    pub fn deadline_fired() {
        DEADLINES_FIRED_TOTAL.inc();
    }

    /// Set the registry size.
    pub fn tracked_offers(count: usize) {
        TRACKED_OFFERS.set(count as i64);
    }

    /// Set the number of armed deadlines.
    pub fn armed_deadlines(count: usize) {
        ARMED_DEADLINES.set(count as i64);
    }

    /// Render all registered metrics in the Prometheus text format.
    pub fn gather_text() -> TelemetryResult<String> {
        let encoder = TextEncoder::new();
        let mut buf = Vec::new();
        encoder
            .encode(&prometheus::gather(), &mut buf)
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
        String::from_utf8(buf).map_err(|e| TelemetryError::Metrics(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_render() {
        Metrics::poll_cycle(true);
        Metrics::lifecycle_step("accept", false);
        Metrics::tracked_offers(3);

        let text = Metrics::gather_text().unwrap();
        assert!(text.contains("floatsync_poll_cycles_total"));
        assert!(text.contains("floatsync_lifecycle_steps_total"));
        assert!(text.contains("floatsync_tracked_offers 3"));
    }
}
