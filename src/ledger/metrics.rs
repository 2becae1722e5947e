//! Prometheus metrics for the ledger

use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

/// Ledger counters, registered on their own registry
#[derive(Clone)]
pub struct LedgerMetrics {
    registry: Registry,

    /// Notifications that produced at least one delta
    pub notifications_applied: IntCounter,

    /// Notifications of kinds the ledger does not track
    pub notifications_ignored: IntCounter,

    /// Feed payloads that could not be decoded
    pub decode_errors: IntCounter,

    /// Decoded notifications the store refused as a whole (overflow)
    pub notifications_rejected: IntCounter,

    /// Balances driven negative by a delta
    pub invariant_violations: IntCounter,

    /// Currencies created at zero because the snapshot did not report them
    pub unknown_currencies: IntCounter,

    /// Feed reconnect attempts
    pub feed_reconnects: IntCounter,

    /// Number of currencies in the store
    pub currencies: IntGauge,
}

impl LedgerMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let notifications_applied = IntCounter::new(
            "ledger_notifications_applied_total",
            "Notifications applied to the balance store",
        )?;
        let notifications_ignored = IntCounter::new(
            "ledger_notifications_ignored_total",
            "Notifications of kinds that do not affect balances",
        )?;
        let decode_errors = IntCounter::new(
            "ledger_decode_errors_total",
            "Feed payloads that failed to decode",
        )?;
        let notifications_rejected = IntCounter::new(
            "ledger_notifications_rejected_total",
            "Notifications rejected without touching any balance",
        )?;
        let invariant_violations = IntCounter::new(
            "ledger_invariant_violations_total",
            "Deltas that left a balance negative",
        )?;
        let unknown_currencies = IntCounter::new(
            "ledger_unknown_currencies_total",
            "Currencies referenced by events but absent from the snapshot",
        )?;
        let feed_reconnects = IntCounter::new(
            "ledger_feed_reconnects_total",
            "Notification feed reconnect attempts",
        )?;
        let currencies = IntGauge::new("ledger_currencies", "Currencies tracked by the ledger")?;

        registry.register(Box::new(notifications_applied.clone()))?;
        registry.register(Box::new(notifications_ignored.clone()))?;
        registry.register(Box::new(decode_errors.clone()))?;
        registry.register(Box::new(notifications_rejected.clone()))?;
        registry.register(Box::new(invariant_violations.clone()))?;
        registry.register(Box::new(unknown_currencies.clone()))?;
        registry.register(Box::new(feed_reconnects.clone()))?;
        registry.register(Box::new(currencies.clone()))?;

        Ok(Self {
            registry,
            notifications_applied,
            notifications_ignored,
            decode_errors,
            notifications_rejected,
            invariant_violations,
            unknown_currencies,
            feed_reconnects,
            currencies,
        })
    }

    /// Render all metrics in the Prometheus text format
    pub fn render(&self) -> prometheus::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
