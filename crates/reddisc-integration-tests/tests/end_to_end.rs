//! End-to-end tests: tenant store -> reconciliation loop -> router -> sink

mod common;

use common::{RecordingSink, ScriptedSource, comment};
use reddisc_config_file::FileConfigStore;
use reddisc_core::{
    ConfigStore, MemoryConfigStore, Tenant, TenantId, admin::TenantAdmin, source::ChannelQuery,
};
use reddisc_routing::{
    LoopState, MAX_NOTIFICATION_CHARS, MonitorConfig, ReconciliationLoop, Router,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn monitor(
    store: Arc<dyn ConfigStore>,
    source: &ScriptedSource,
    sink: &RecordingSink,
) -> ReconciliationLoop {
    let config = MonitorConfig {
        idle_interval: Duration::ZERO,
        ..Default::default()
    };
    ReconciliationLoop::new(store, Box::new(source.clone()), Arc::new(sink.clone()), config)
}

/// Step until the loop goes idle
async fn drain(monitor: &mut ReconciliationLoop) {
    loop {
        if monitor.step().await.unwrap() == LoopState::Idle {
            return;
        }
    }
}

#[tokio::test]
async fn test_author_and_channel_must_both_match() {
    let store = MemoryConfigStore::with_tenants([
        Tenant::new("g1")
            .with_destination("111")
            .subscribe("catpics")
            .watch_author("bob"),
        // Keeps dogpics on the stream
        Tenant::new("g2")
            .with_destination("222")
            .subscribe("dogpics")
            .watch_author("dave"),
    ]);
    let source = ScriptedSource::new();
    let sink = RecordingSink::new();
    let mut monitor = monitor(Arc::new(store), &source, &sink);

    source.push(comment("c1", "bob", "catpics"));
    source.push(comment("c2", "bob", "dogpics"));
    source.push(comment("c3", "carol", "catpics"));
    drain(&mut monitor).await;

    let sent = sink.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "111");
    assert!(sent[0].1.contains("**New comment by u/bob in r/catpics**"));
    assert!(sent[0].1.contains("Post: *Post s1*"));
    assert!(sent[0].1.ends_with("/c1/"));

    let stats = monitor.stats();
    assert_eq!(stats.events, 3);
    assert_eq!(stats.deliveries, 1);
}

#[tokio::test]
async fn test_fan_out_survives_one_failed_delivery() {
    let store = MemoryConfigStore::with_tenants([
        Tenant::new("g1")
            .with_destination("111")
            .subscribe("catpics")
            .watch_author("bob"),
        Tenant::new("g2")
            .with_destination("222")
            .subscribe("catpics")
            .watch_author("bob"),
    ]);
    let source = ScriptedSource::new();
    let sink = RecordingSink::new();
    sink.reject("111");
    let mut monitor = monitor(Arc::new(store), &source, &sink);

    source.push(comment("c1", "bob", "catpics"));
    drain(&mut monitor).await;

    assert_eq!(sink.channels(), vec!["222".to_string()]);
    let stats = monitor.stats();
    assert_eq!(stats.deliveries, 1);
    assert_eq!(stats.delivery_failures, 1);

    // The loop keeps going after the failure
    source.push(comment("c2", "bob", "catpics"));
    drain(&mut monitor).await;
    assert_eq!(sink.channels(), vec!["222".to_string(), "222".to_string()]);
}

#[tokio::test]
async fn test_flair_allow_list_does_not_filter() {
    // The source reports flair "Discussion" for every submission
    let store = MemoryConfigStore::with_tenants([Tenant::new("g1")
        .with_destination("111")
        .subscribe_with_flairs("catpics", ["Meme"])
        .watch_author("bob")]);
    let source = ScriptedSource::new();
    let sink = RecordingSink::new();
    let mut monitor = monitor(Arc::new(store), &source, &sink);

    source.push(comment("c1", "bob", "catpics"));
    drain(&mut monitor).await;

    assert_eq!(sink.channels(), vec!["111".to_string()]);
}

#[tokio::test]
async fn test_long_comment_still_links_back() {
    let store = MemoryConfigStore::with_tenants([Tenant::new("g1")
        .with_destination("111")
        .subscribe("catpics")
        .watch_author("bob")]);
    let source = ScriptedSource::new();
    let sink = RecordingSink::new();
    let mut monitor = monitor(Arc::new(store), &source, &sink);

    let mut event = comment("c1", "bob", "catpics");
    event.body = "purr ".repeat(2000);
    let permalink = event.permalink_url.clone();
    source.push(event);
    drain(&mut monitor).await;

    let sent = sink.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].1.chars().count() <= MAX_NOTIFICATION_CHARS);
    assert!(sent[0].1.ends_with(&permalink));
}

#[tokio::test]
async fn test_tenant_without_destination_is_skipped() {
    let store = MemoryConfigStore::with_tenants([
        Tenant::new("g1").subscribe("catpics").watch_author("bob"),
        Tenant::new("g2")
            .with_destination("222")
            .subscribe("catpics")
            .watch_author("bob"),
    ]);
    let source = ScriptedSource::new();
    let sink = RecordingSink::new();
    let mut monitor = monitor(Arc::new(store), &source, &sink);

    source.push(comment("c1", "bob", "catpics"));
    drain(&mut monitor).await;

    assert_eq!(sink.channels(), vec!["222".to_string()]);
    assert_eq!(monitor.stats().delivery_failures, 0);
}

#[tokio::test]
async fn test_admin_edit_to_tenant_file_is_picked_up() {
    let dir = TempDir::new().unwrap();
    let store: Arc<dyn ConfigStore> = Arc::new(
        FileConfigStore::open_or_create(dir.path().join("tenants.yaml"))
            .await
            .unwrap(),
    );
    let admin = TenantAdmin::new(Arc::clone(&store));
    let g1 = TenantId::new("g1");
    admin.add_channel(&g1, "catpics").await.unwrap();
    admin.add_author(&g1, "bob").await.unwrap();
    admin.set_destination(&g1, "<#111>").await.unwrap();

    let source = ScriptedSource::new();
    let sink = RecordingSink::new();
    let mut monitor = monitor(Arc::clone(&store), &source, &sink);
    drain(&mut monitor).await;
    assert_eq!(source.subscriptions(), vec![("catpics".to_string(), 16)]);

    // An idle cycle without edits does not rebuild
    assert_eq!(monitor.step().await.unwrap(), LoopState::Polling);
    drain(&mut monitor).await;
    assert_eq!(monitor.stats().reconciliations, 1);

    admin.add_channel(&g1, "DogPics").await.unwrap();

    assert_eq!(monitor.step().await.unwrap(), LoopState::Reconciling);
    assert_eq!(monitor.step().await.unwrap(), LoopState::Polling);
    assert_eq!(monitor.stats().reconciliations, 2);
    assert_eq!(
        source.subscriptions(),
        vec![
            ("catpics".to_string(), 16),
            ("catpics+dogpics".to_string(), 0)
        ]
    );

    source.push(comment("c1", "bob", "dogpics"));
    drain(&mut monitor).await;
    assert_eq!(sink.channels(), vec!["111".to_string()]);

    // Exactly one rebuild per edit
    assert_eq!(monitor.step().await.unwrap(), LoopState::Polling);
    drain(&mut monitor).await;
    assert_eq!(monitor.stats().reconciliations, 2);
}

#[tokio::test]
async fn test_index_in_use_survives_rebuild() {
    let store = Arc::new(MemoryConfigStore::with_tenants([Tenant::new("g1")
        .with_destination("111")
        .subscribe("catpics")
        .watch_author("bob")]));
    let source = ScriptedSource::new();
    let sink = RecordingSink::new();
    let mut monitor = monitor(store.clone(), &source, &sink);
    drain(&mut monitor).await;

    let in_use = monitor.index();

    store
        .write_all(vec![
            Tenant::new("g2")
                .with_destination("222")
                .subscribe("catpics")
                .watch_author("bob"),
        ])
        .await
        .unwrap();
    assert_eq!(monitor.step().await.unwrap(), LoopState::Reconciling);
    assert_eq!(monitor.step().await.unwrap(), LoopState::Polling);

    let event = comment("c1", "bob", "catpics");
    assert_eq!(
        Router::match_tenants(&event, &in_use),
        vec![TenantId::new("g1")]
    );
    assert_eq!(
        Router::match_tenants(&event, &monitor.index()),
        vec![TenantId::new("g2")]
    );
    assert!(!Arc::ptr_eq(&in_use, &monitor.index()));
    assert_eq!(
        monitor.subscription().map(|h| h.query.clone()),
        Some(ChannelQuery::parse("catpics"))
    );
}
