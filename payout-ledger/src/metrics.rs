//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the payment ledger.
//!
//! # Metrics
//!
//! - `payout_payments_registered_total` - Total number of credits registered
//! - `payout_transfers_sent_total` - Total number of transfers accepted by the node
//! - `payout_transfers_failed_total` - Total number of failed transfers
//! - `payout_drains_total` - Total number of completed drains
//! - `payout_pending_recipients` - Recipients currently holding a pending credit
//! - `payout_drain_duration_seconds` - Histogram of drain durations (lock hold time)

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder,
};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Total credits registered
    pub payments_registered: IntCounter,

    /// Total transfers accepted
    pub transfers_sent: IntCounter,

    /// Total transfers failed
    pub transfers_failed: IntCounter,

    /// Total drains completed
    pub drains_total: IntCounter,

    /// Pending recipients
    pub pending_recipients: IntGauge,

    /// Drain duration histogram
    pub drain_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector on a private registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let payments_registered = IntCounter::new(
            "payout_payments_registered_total",
            "Total number of credits registered",
        )?;
        registry.register(Box::new(payments_registered.clone()))?;

        let transfers_sent = IntCounter::new(
            "payout_transfers_sent_total",
            "Total number of transfers accepted by the node",
        )?;
        registry.register(Box::new(transfers_sent.clone()))?;

        let transfers_failed = IntCounter::new(
            "payout_transfers_failed_total",
            "Total number of failed transfers",
        )?;
        registry.register(Box::new(transfers_failed.clone()))?;

        let drains_total =
            IntCounter::new("payout_drains_total", "Total number of completed drains")?;
        registry.register(Box::new(drains_total.clone()))?;

        let pending_recipients = IntGauge::new(
            "payout_pending_recipients",
            "Recipients currently holding a pending credit",
        )?;
        registry.register(Box::new(pending_recipients.clone()))?;

        let drain_duration = Histogram::with_opts(
            HistogramOpts::new(
                "payout_drain_duration_seconds",
                "Histogram of drain durations",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0]),
        )?;
        registry.register(Box::new(drain_duration.clone()))?;

        Ok(Self {
            payments_registered,
            transfers_sent,
            transfers_failed,
            drains_total,
            pending_recipients,
            drain_duration,
            registry,
        })
    }

    /// Record credit registration
    pub fn record_registration(&self, pending_recipients: usize) {
        self.payments_registered.inc();
        self.pending_recipients.set(pending_recipients as i64);
    }

    /// Record transfer outcome
    pub fn record_transfer(&self, success: bool) {
        if success {
            self.transfers_sent.inc();
        } else {
            self.transfers_failed.inc();
        }
    }

    /// Record drain completion
    pub fn record_drain(&self, duration_seconds: f64) {
        self.drains_total.inc();
        self.pending_recipients.set(0);
        self.drain_duration.observe(duration_seconds);
    }

    /// Render all metrics in the Prometheus text format
    pub fn encode(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!("Failed to encode metrics: {}", e);
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("payments_registered", &self.payments_registered.get())
            .field("transfers_sent", &self.transfers_sent.get())
            .field("transfers_failed", &self.transfers_failed.get())
            .field("drains_total", &self.drains_total.get())
            .field("pending_recipients", &self.pending_recipients.get())
            .finish()
    }
}
