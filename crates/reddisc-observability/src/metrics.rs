//! Metrics collection with Prometheus
//!
//! This module provides Prometheus metrics for RedDisc:
//! - Comment counts (seen, matched)
//! - Delivery outcomes
//! - Reconciliation outcomes
//! - Context fetch failures
//! - Subscription size gauges

use prometheus::{Counter, CounterVec, Gauge, Opts, Registry};
use std::sync::Arc;

/// Metrics collector for RedDisc
#[derive(Clone)]
pub struct Metrics {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Comments pulled from the source
    pub comments_total: Counter,
    /// Comments that matched at least one tenant
    pub comments_matched_total: Counter,
    /// Deliveries by outcome (delivered, failed, skipped)
    pub deliveries_total: CounterVec,
    /// Reconciliations by outcome (ok, failed)
    pub reconciliations_total: CounterVec,
    /// Context fetch failures by kind (submission, parent)
    pub context_fetch_failures_total: CounterVec,
    /// Channels in the active query
    pub subscribed_channels: Gauge,
    /// Tenants in the active index
    pub tenants: Gauge,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let comments_total = Counter::with_opts(Opts::new(
            "reddisc_comments_total",
            "Total number of comments pulled from the source",
        ))?;

        let comments_matched_total = Counter::with_opts(Opts::new(
            "reddisc_comments_matched_total",
            "Total number of comments that matched at least one tenant",
        ))?;

        let deliveries_total = CounterVec::new(
            Opts::new("reddisc_deliveries_total", "Notification deliveries by outcome"),
            &["outcome"],
        )?;

        let reconciliations_total = CounterVec::new(
            Opts::new(
                "reddisc_reconciliations_total",
                "Subscription index rebuilds by outcome",
            ),
            &["outcome"],
        )?;

        let context_fetch_failures_total = CounterVec::new(
            Opts::new(
                "reddisc_context_fetch_failures_total",
                "Failed submission/parent lookups while composing notifications",
            ),
            &["kind"],
        )?;

        let subscribed_channels = Gauge::with_opts(Opts::new(
            "reddisc_subscribed_channels",
            "Number of channels in the active source query",
        ))?;

        let tenants = Gauge::with_opts(Opts::new(
            "reddisc_tenants",
            "Number of tenants in the active subscription index",
        ))?;

        registry.register(Box::new(comments_total.clone()))?;
        registry.register(Box::new(comments_matched_total.clone()))?;
        registry.register(Box::new(deliveries_total.clone()))?;
        registry.register(Box::new(reconciliations_total.clone()))?;
        registry.register(Box::new(context_fetch_failures_total.clone()))?;
        registry.register(Box::new(subscribed_channels.clone()))?;
        registry.register(Box::new(tenants.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            comments_total,
            comments_matched_total,
            deliveries_total,
            reconciliations_total,
            context_fetch_failures_total,
            subscribed_channels,
            tenants,
        })
    }

    /// Get the Prometheus registry for exporting metrics
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record a comment pulled from the source
    pub fn record_comment(&self, matched: bool) {
        self.comments_total.inc();
        if matched {
            self.comments_matched_total.inc();
        }
    }

    /// Record delivery outcomes for one event
    pub fn record_deliveries(&self, delivered: usize, failed: usize, skipped: usize) {
        self.deliveries_total
            .with_label_values(&["delivered"])
            .inc_by(delivered as f64);
        self.deliveries_total
            .with_label_values(&["failed"])
            .inc_by(failed as f64);
        self.deliveries_total
            .with_label_values(&["skipped"])
            .inc_by(skipped as f64);
    }

    /// Record a successful reconciliation and the new subscription size
    pub fn record_reconciliation(&self, tenants: usize, channels: usize) {
        self.reconciliations_total.with_label_values(&["ok"]).inc();
        self.tenants.set(tenants as f64);
        self.subscribed_channels.set(channels as f64);
    }

    /// Record a failed reconciliation
    pub fn record_reconciliation_failure(&self) {
        self.reconciliations_total.with_label_values(&["failed"]).inc();
    }

    /// Record a failed context lookup
    pub fn record_context_failure(&self, kind: &str) {
        self.context_fetch_failures_total
            .with_label_values(&[kind])
            .inc();
    }
}
