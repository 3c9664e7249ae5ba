//! Reconciliation loop
//!
//! Drives the comment stream as a three-state machine:
//!
//! ```text
//!   Reconciling ──> Polling ──(event)──> Polling
//!        ^             │
//!        │          (none)
//!        │             v
//!        └─(changed)── Idle ──(unchanged, after sleep)──> Polling
//! ```
//!
//! The loop owns the subscription index. Reconciling rebuilds it from a fresh
//! config snapshot and re-subscribes the source to the union of subscribed
//! subreddits; Idle compares the store's modification marker with the one
//! captured at the last successful reconciliation.
//!
//! Only the first reconciliation is fatal. Later failures keep the previous
//! index and subscription and are retried on the next idle cycle, after that
//! cycle's sleep, so a persistent failure costs one attempt per interval.

use reddisc_core::{
    Result,
    comment::CommentEvent,
    config_store::{ConfigStore, ModificationMarker},
    sink::NotifierSink,
    source::{ChannelQuery, CommentSource, SubscriptionHandle},
};
use reddisc_observability::Metrics;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::dispatch::deliver;
use crate::index::SubscriptionIndex;
use crate::router::Router;

/// Loop settings
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Sleep between an empty poll and the next poll
    pub idle_interval: Duration,
    /// Empty fetches tolerated before the first subscription reports "no event"
    pub pause_after: u32,
    /// Same, for subscriptions re-issued after a reconciliation
    pub resubscribe_pause_after: u32,
    /// Query used when no tenant subscribes to anything
    pub fallback_query: Option<ChannelQuery>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            idle_interval: Duration::from_secs(5),
            pause_after: 16,
            resubscribe_pause_after: 0,
            fallback_query: None,
        }
    }
}

/// State of the loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Reconciling,
    Polling,
    Idle,
}

/// Counters kept by the loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    /// Successful index rebuilds
    pub reconciliations: u64,
    /// Subscriptions issued to the source
    pub subscriptions: u64,
    /// Comments processed
    pub events: u64,
    pub deliveries: u64,
    pub delivery_failures: u64,
}

/// The driving loop
pub struct ReconciliationLoop {
    store: Arc<dyn ConfigStore>,
    source: Box<dyn CommentSource>,
    sink: Arc<dyn NotifierSink>,
    router: Router,
    config: MonitorConfig,
    metrics: Option<Metrics>,

    state: LoopState,
    index: Arc<SubscriptionIndex>,
    marker: Option<ModificationMarker>,
    subscription: Option<SubscriptionHandle>,
    /// Last reconciliation failed; the next attempt waits one idle interval
    retry_pending: bool,
    stats: LoopStats,
}

impl ReconciliationLoop {
    /// Create a loop in the `Reconciling` state
    pub fn new(
        store: Arc<dyn ConfigStore>,
        source: Box<dyn CommentSource>,
        sink: Arc<dyn NotifierSink>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            store,
            source,
            sink,
            router: Router::new(),
            config,
            metrics: None,
            state: LoopState::Reconciling,
            index: Arc::new(SubscriptionIndex::default()),
            marker: None,
            subscription: None,
            retry_pending: false,
            stats: LoopStats::default(),
        }
    }

    /// Record loop activity to the given metrics
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.router = self.router.with_metrics(metrics.clone());
        self.metrics = Some(metrics);
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Index currently used for routing
    pub fn index(&self) -> Arc<SubscriptionIndex> {
        Arc::clone(&self.index)
    }

    /// Active subscription, if any
    pub fn subscription(&self) -> Option<&SubscriptionHandle> {
        self.subscription.as_ref()
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    /// Run until cancelled.
    ///
    /// # Errors
    /// Returns an error only if the initial reconciliation fails (unreadable
    /// store or a source that refuses the first subscription).
    pub async fn run(mut self, cancel: CancellationToken) -> Result<LoopStats> {
        info!("Starting monitor loop");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Shutdown requested, stopping monitor loop");
                    return Ok(self.stats);
                }
                result = self.step() => {
                    result?;
                }
            }
        }
    }

    /// Perform the current state's work and transition
    pub async fn step(&mut self) -> Result<LoopState> {
        let next = match self.state {
            LoopState::Reconciling => {
                self.reconcile().await?;
                LoopState::Polling
            }
            LoopState::Polling => self.poll_once().await,
            LoopState::Idle => self.idle().await,
        };

        self.state = next;
        Ok(next)
    }

    async fn reconcile(&mut self) -> Result<()> {
        let startup = self.marker.is_none();

        let snapshot = match self.store.read_all().await {
            Ok(snapshot) => snapshot,
            Err(e) if startup => {
                error!("Could not read tenant configuration: {}", e);
                self.record_reconciliation_failure();
                return Err(e);
            }
            Err(e) => {
                error!(
                    "Could not read tenant configuration, keeping previous subscriptions: {}",
                    e
                );
                self.record_reconciliation_failure();
                self.retry_pending = true;
                return Ok(());
            }
        };

        let index = SubscriptionIndex::build(&snapshot.tenants);
        let mut query = index.channel_query();
        if query.is_empty()
            && let Some(fallback) = &self.config.fallback_query
        {
            query = fallback.clone();
        }

        let pause_after = if startup {
            self.config.pause_after
        } else {
            self.config.resubscribe_pause_after
        };

        let subscription = if query.is_empty() {
            warn!("No tenant subscribes to any subreddit; not streaming");
            None
        } else {
            match self.source.subscribe(&query, pause_after).await {
                Ok(handle) => {
                    self.stats.subscriptions += 1;
                    Some(handle)
                }
                Err(e) if startup => {
                    error!("Could not subscribe to r/{}: {}", query, e);
                    self.record_reconciliation_failure();
                    return Err(e);
                }
                Err(e) => {
                    error!(
                        "Could not re-subscribe to r/{}, keeping previous subscription: {}",
                        query, e
                    );
                    self.record_reconciliation_failure();
                    self.retry_pending = true;
                    return Ok(());
                }
            }
        };

        info!(
            "Reconciled {} tenant(s), streaming r/{} (pause_after={})",
            index.tenant_count(),
            query,
            pause_after
        );

        if let Some(metrics) = &self.metrics {
            metrics.record_reconciliation(index.tenant_count(), query.len());
        }

        self.index = Arc::new(index);
        self.subscription = subscription;
        self.marker = Some(snapshot.last_modified);
        self.retry_pending = false;
        self.stats.reconciliations += 1;
        Ok(())
    }

    async fn poll_once(&mut self) -> LoopState {
        let Some(handle) = self.subscription.clone() else {
            return LoopState::Idle;
        };

        match self.source.poll(&handle).await {
            Ok(Some(event)) => {
                self.process(event).await;
                LoopState::Polling
            }
            Ok(None) => {
                debug!("No new comments, going idle");
                LoopState::Idle
            }
            Err(e) => {
                warn!("Comment source poll failed: {}", e);
                LoopState::Idle
            }
        }
    }

    async fn process(&mut self, event: CommentEvent) {
        // Held for the whole step; a rebuild only swaps `self.index`
        let index = Arc::clone(&self.index);

        let routes = self
            .router
            .route(&event, &index, self.source.as_ref())
            .await;
        let report = deliver(&routes, self.sink.as_ref()).await;

        self.stats.events += 1;
        self.stats.deliveries += report.delivered as u64;
        self.stats.delivery_failures += report.failed as u64;

        if let Some(metrics) = &self.metrics {
            metrics.record_comment(!routes.is_empty());
            metrics.record_deliveries(report.delivered, report.failed, report.skipped);
        }
    }

    async fn idle(&mut self) -> LoopState {
        let changed = match self.store.last_modified().await {
            Ok(current) => self.marker.as_ref() != Some(&current),
            Err(e) => {
                warn!("Could not read configuration marker: {}", e);
                false
            }
        };

        if changed && !self.retry_pending {
            info!("Tenant configuration changed, reconciling");
            return LoopState::Reconciling;
        }

        if !self.config.idle_interval.is_zero() {
            tokio::time::sleep(self.config.idle_interval).await;
        }

        if changed {
            info!("Retrying failed reconciliation");
            return LoopState::Reconciling;
        }
        LoopState::Polling
    }

    fn record_reconciliation_failure(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.record_reconciliation_failure();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{CountingStore, FakeSource, RecordingSink, comment};
    use reddisc_core::tenant::Tenant;
    use std::time::Instant;

    struct Harness {
        store: Arc<CountingStore>,
        source: FakeSource,
        sink: RecordingSink,
        monitor: ReconciliationLoop,
    }

    fn harness(tenants: Vec<Tenant>) -> Harness {
        let store = Arc::new(CountingStore::with_tenants(tenants));
        let source = FakeSource::new().with_submission("s1", "A post");
        let sink = RecordingSink::new();
        let config = MonitorConfig {
            idle_interval: Duration::ZERO,
            pause_after: 16,
            resubscribe_pause_after: 1,
            fallback_query: None,
        };
        let monitor = ReconciliationLoop::new(
            store.clone(),
            Box::new(source.clone()),
            Arc::new(sink.clone()),
            config,
        );
        Harness {
            store,
            source,
            sink,
            monitor,
        }
    }

    fn g1() -> Tenant {
        Tenant::new("g1")
            .subscribe("catpics")
            .watch_author("bob")
            .with_destination("111")
    }

    #[tokio::test]
    async fn test_starts_by_reconciling() {
        let mut h = harness(vec![g1()]);
        assert_eq!(h.monitor.state(), LoopState::Reconciling);

        assert_eq!(h.monitor.step().await.unwrap(), LoopState::Polling);

        let subs = h.source.subscriptions();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].0.as_query_string(), "catpics");
        assert_eq!(subs[0].1, 16);
        assert_eq!(h.monitor.index().tenant_count(), 1);
    }

    #[tokio::test]
    async fn test_event_is_routed_and_delivered() {
        let mut h = harness(vec![g1()]);
        h.source.push(Some(comment("c1", "bob", "catpics")));

        h.monitor.step().await.unwrap();
        assert_eq!(h.monitor.step().await.unwrap(), LoopState::Polling);

        let sent = h.sink.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "111");
        assert_eq!(h.monitor.stats().events, 1);
        assert_eq!(h.monitor.stats().deliveries, 1);
    }

    #[tokio::test]
    async fn test_idle_without_change_never_rebuilds() {
        let mut h = harness(vec![g1()]);
        h.monitor.step().await.unwrap();
        assert_eq!(h.store.reads(), 1);

        for _ in 0..5 {
            assert_eq!(h.monitor.step().await.unwrap(), LoopState::Idle);
            assert_eq!(h.monitor.step().await.unwrap(), LoopState::Polling);
        }

        assert_eq!(h.store.reads(), 1);
        assert_eq!(h.source.subscriptions().len(), 1);
        assert_eq!(h.monitor.stats().reconciliations, 1);
    }

    #[tokio::test]
    async fn test_marker_change_triggers_one_rebuild() {
        let mut h = harness(vec![g1()]);
        h.monitor.step().await.unwrap();

        h.store
            .write_all(vec![g1().subscribe("dogpics")])
            .await
            .unwrap();

        assert_eq!(h.monitor.step().await.unwrap(), LoopState::Idle);
        assert_eq!(h.monitor.step().await.unwrap(), LoopState::Reconciling);
        assert_eq!(h.monitor.step().await.unwrap(), LoopState::Polling);
        assert_eq!(h.monitor.step().await.unwrap(), LoopState::Idle);
        assert_eq!(h.monitor.step().await.unwrap(), LoopState::Polling);

        let subs = h.source.subscriptions();
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[1].0.as_query_string(), "catpics+dogpics");
        assert_eq!(subs[1].1, 1);
        assert_eq!(h.store.reads(), 2);
        assert_eq!(h.monitor.stats().reconciliations, 2);
    }

    #[tokio::test]
    async fn test_startup_failure_is_fatal() {
        let mut h = harness(vec![g1()]);
        h.store.set_broken(true);
        assert!(h.monitor.step().await.is_err());

        let mut h = harness(vec![g1()]);
        h.source.fail_subscribe(true);
        assert!(h.monitor.step().await.is_err());
    }

    #[tokio::test]
    async fn test_later_failure_keeps_previous_index_and_retries() {
        let mut h = harness(vec![g1()]);
        h.monitor.step().await.unwrap();
        let before = h.monitor.index();

        h.store.write_all(vec![Tenant::new("g2")]).await.unwrap();
        h.store.set_broken(true);

        h.monitor.step().await.unwrap(); // Idle
        h.monitor.step().await.unwrap(); // Reconciling
        assert_eq!(h.monitor.step().await.unwrap(), LoopState::Polling);
        assert!(Arc::ptr_eq(&before, &h.monitor.index()));
        assert_eq!(h.monitor.subscription().unwrap().id, 1);

        h.store.set_broken(false);
        h.monitor.step().await.unwrap(); // Idle
        assert_eq!(h.monitor.step().await.unwrap(), LoopState::Reconciling);
        h.monitor.step().await.unwrap();
        assert!(h.monitor.index().tenant(&"g2".into()).is_some());
    }

    #[tokio::test]
    async fn test_failed_resubscribe_is_retried() {
        let mut h = harness(vec![g1()]);
        h.monitor.step().await.unwrap();
        let before = h.monitor.index();

        h.store
            .write_all(vec![g1().subscribe("dogpics")])
            .await
            .unwrap();
        h.source.fail_subscribe(true);

        assert_eq!(h.monitor.step().await.unwrap(), LoopState::Idle);
        assert_eq!(h.monitor.step().await.unwrap(), LoopState::Reconciling);
        assert_eq!(h.monitor.step().await.unwrap(), LoopState::Polling);
        assert!(Arc::ptr_eq(&before, &h.monitor.index()));
        assert_eq!(h.monitor.subscription().unwrap().id, 1);
        assert_eq!(h.monitor.stats().reconciliations, 1);

        h.source.fail_subscribe(false);
        assert_eq!(h.monitor.step().await.unwrap(), LoopState::Idle);
        assert_eq!(h.monitor.step().await.unwrap(), LoopState::Reconciling);
        assert_eq!(h.monitor.step().await.unwrap(), LoopState::Polling);

        let subs = h.source.subscriptions();
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[1].0.as_query_string(), "catpics+dogpics");
        assert_eq!(h.monitor.subscription().unwrap().id, 2);
        assert_eq!(h.monitor.stats().reconciliations, 2);

        // Settled: idle goes back to polling
        assert_eq!(h.monitor.step().await.unwrap(), LoopState::Idle);
        assert_eq!(h.monitor.step().await.unwrap(), LoopState::Polling);
    }

    #[tokio::test]
    async fn test_repeated_failures_wait_for_idle_interval() {
        let interval = Duration::from_millis(30);
        let store = Arc::new(CountingStore::with_tenants(vec![Tenant::new("g1")]));
        let source = FakeSource::new();
        let mut monitor = ReconciliationLoop::new(
            store.clone(),
            Box::new(source.clone()),
            Arc::new(RecordingSink::new()),
            MonitorConfig {
                idle_interval: interval,
                ..Default::default()
            },
        );

        // Nothing to stream at startup
        assert_eq!(monitor.step().await.unwrap(), LoopState::Polling);
        assert!(monitor.subscription().is_none());

        store
            .write_all(vec![Tenant::new("g1").subscribe("catpics")])
            .await
            .unwrap();
        source.fail_subscribe(true);

        let started = Instant::now();
        assert_eq!(monitor.step().await.unwrap(), LoopState::Idle);
        // First sighting of the change reconciles at once
        assert_eq!(monitor.step().await.unwrap(), LoopState::Reconciling);

        for _ in 0..3 {
            assert_eq!(monitor.step().await.unwrap(), LoopState::Polling);
            assert_eq!(monitor.step().await.unwrap(), LoopState::Idle);
            assert_eq!(monitor.step().await.unwrap(), LoopState::Reconciling);
        }
        // Three retries, each behind one idle sleep
        assert!(started.elapsed() >= interval * 3);
        assert_eq!(store.reads(), 4);
        assert!(source.subscriptions().is_empty());
        assert_eq!(monitor.stats().reconciliations, 1);
    }

    #[tokio::test]
    async fn test_empty_subscription_set_uses_fallback() {
        let store = Arc::new(CountingStore::with_tenants(vec![Tenant::new("g1")]));
        let source = FakeSource::new();
        let config = MonitorConfig {
            idle_interval: Duration::ZERO,
            fallback_query: Some(ChannelQuery::parse("TheDragonPrince")),
            ..Default::default()
        };
        let mut monitor = ReconciliationLoop::new(
            store,
            Box::new(source.clone()),
            Arc::new(RecordingSink::new()),
            config,
        );

        monitor.step().await.unwrap();
        assert_eq!(source.subscriptions()[0].0.as_query_string(), "thedragonprince");
    }

    #[tokio::test]
    async fn test_empty_subscription_set_without_fallback_idles() {
        let mut h = harness(vec![Tenant::new("g1")]);
        h.monitor.step().await.unwrap();

        assert!(h.monitor.subscription().is_none());
        assert!(h.source.subscriptions().is_empty());
        assert_eq!(h.monitor.step().await.unwrap(), LoopState::Idle);
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let store = Arc::new(CountingStore::with_tenants(vec![g1()]));
        let monitor = ReconciliationLoop::new(
            store,
            Box::new(FakeSource::new()),
            Arc::new(RecordingSink::new()),
            MonitorConfig {
                idle_interval: Duration::from_millis(5),
                ..Default::default()
            },
        );
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(monitor.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let stats = handle.await.unwrap().unwrap();
        assert_eq!(stats.reconciliations, 1);
    }

    #[tokio::test]
    async fn test_metrics_recorded() {
        let metrics = Metrics::new().unwrap();
        let mut h = harness(vec![g1()]);
        h.monitor = ReconciliationLoop::new(
            h.store.clone(),
            Box::new(h.source.clone()),
            Arc::new(h.sink.clone()),
            MonitorConfig {
                idle_interval: Duration::ZERO,
                ..Default::default()
            },
        )
        .with_metrics(metrics.clone());
        h.source.push(Some(comment("c1", "bob", "catpics")));

        h.monitor.step().await.unwrap();
        h.monitor.step().await.unwrap();

        assert_eq!(metrics.comments_total.get(), 1.0);
        assert_eq!(metrics.comments_matched_total.get(), 1.0);
        assert_eq!(metrics.tenants.get(), 1.0);
    }
}
