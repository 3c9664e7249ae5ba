//! In-memory collaborators for unit tests

use async_trait::async_trait;
use reddisc_core::{
    Error, Result,
    comment::{CommentEvent, ParentComment, ParentContext, ParentRef, Submission},
    config_store::{ConfigSnapshot, ConfigStore, MemoryConfigStore, ModificationMarker},
    sink::NotifierSink,
    source::{ChannelQuery, CommentSource, SubscriptionHandle},
    tenant::Tenant,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub fn comment(id: &str, author: &str, channel: &str) -> CommentEvent {
    CommentEvent {
        id: id.to_string(),
        permalink_url: format!("https://www.reddit.com/r/{}/comments/s1/x/{}/", channel, id),
        body: "hello".to_string(),
        author_name: author.to_string(),
        source_channel_name: channel.to_string(),
        submission_id: "s1".to_string(),
        parent_id: None,
    }
}

#[derive(Default)]
struct SourceState {
    events: VecDeque<Option<CommentEvent>>,
    subscriptions: Vec<(ChannelQuery, u32)>,
    fail_subscribe: bool,
}

/// Scripted comment source; clones share state
#[derive(Clone, Default)]
pub struct FakeSource {
    state: Arc<Mutex<SourceState>>,
    submissions: Arc<HashMap<String, Submission>>,
    parents: Arc<HashMap<String, ParentComment>>,
    context_fetches: Arc<AtomicUsize>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_submission(mut self, id: &str, title: &str) -> Self {
        let mut map = (*self.submissions).clone();
        map.insert(
            id.to_string(),
            Submission {
                id: id.to_string(),
                title: title.to_string(),
                flair: Some("Meme".to_string()),
            },
        );
        self.submissions = Arc::new(map);
        self
    }

    pub fn with_parent_comment(mut self, id: &str, author: &str, body: &str) -> Self {
        let mut map = (*self.parents).clone();
        map.insert(
            id.to_string(),
            ParentComment {
                id: id.to_string(),
                author_name: author.to_string(),
                body: body.to_string(),
            },
        );
        self.parents = Arc::new(map);
        self
    }

    /// Queue an event; `None` queues a "no event available" marker
    pub fn push(&self, event: Option<CommentEvent>) {
        self.state.lock().unwrap().events.push_back(event);
    }

    pub fn fail_subscribe(&self, fail: bool) {
        self.state.lock().unwrap().fail_subscribe = fail;
    }

    pub fn subscriptions(&self) -> Vec<(ChannelQuery, u32)> {
        self.state.lock().unwrap().subscriptions.clone()
    }

    pub fn context_fetches(&self) -> usize {
        self.context_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommentSource for FakeSource {
    async fn subscribe(
        &mut self,
        query: &ChannelQuery,
        pause_after: u32,
    ) -> Result<SubscriptionHandle> {
        let mut state = self.state.lock().unwrap();
        if state.fail_subscribe {
            return Err(Error::Source("subscribe refused".to_string()));
        }
        state.subscriptions.push((query.clone(), pause_after));
        Ok(SubscriptionHandle {
            id: state.subscriptions.len() as u64,
            query: query.clone(),
        })
    }

    async fn poll(&mut self, _handle: &SubscriptionHandle) -> Result<Option<CommentEvent>> {
        Ok(self.state.lock().unwrap().events.pop_front().flatten())
    }

    async fn fetch_submission(&self, submission_id: &str) -> Result<Submission> {
        self.context_fetches.fetch_add(1, Ordering::SeqCst);
        self.submissions
            .get(submission_id)
            .cloned()
            .ok_or_else(|| Error::ContextUnavailable(format!("submission {}", submission_id)))
    }

    async fn fetch_parent(&self, parent: &ParentRef) -> Result<ParentContext> {
        self.context_fetches.fetch_add(1, Ordering::SeqCst);
        match parent {
            ParentRef::Comment(id) => self
                .parents
                .get(id)
                .cloned()
                .map(ParentContext::Comment)
                .ok_or_else(|| Error::ContextUnavailable(format!("comment {}", id))),
            ParentRef::Submission(id) => self
                .fetch_submission(id)
                .await
                .map(ParentContext::Submission),
        }
    }
}

/// Sink that records deliveries and fails for chosen channels
#[derive(Clone, Default)]
pub struct RecordingSink {
    sent: Arc<Mutex<Vec<(String, String)>>>,
    failing: Arc<Mutex<HashSet<String>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, channel: &str) {
        self.failing.lock().unwrap().insert(channel.to_string());
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotifierSink for RecordingSink {
    async fn send(&self, channel_id: &str, text: &str) -> Result<()> {
        if self.failing.lock().unwrap().contains(channel_id) {
            return Err(Error::Sink(format!("channel {} unreachable", channel_id)));
        }
        self.sent
            .lock()
            .unwrap()
            .push((channel_id.to_string(), text.to_string()));
        Ok(())
    }
}

/// Memory store that counts full reads and can be made unreadable
#[derive(Default)]
pub struct CountingStore {
    inner: MemoryConfigStore,
    reads: AtomicUsize,
    broken: Mutex<bool>,
}

impl CountingStore {
    pub fn with_tenants(tenants: Vec<Tenant>) -> Self {
        Self {
            inner: MemoryConfigStore::with_tenants(tenants),
            ..Default::default()
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn set_broken(&self, broken: bool) {
        *self.broken.lock().unwrap() = broken;
    }
}

#[async_trait]
impl ConfigStore for CountingStore {
    async fn read_all(&self) -> Result<ConfigSnapshot> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let broken = *self.broken.lock().unwrap();
        if broken {
            return Err(Error::Config("store unreadable".to_string()));
        }
        self.inner.read_all().await
    }

    async fn write_all(&self, tenants: Vec<Tenant>) -> Result<ModificationMarker> {
        self.inner.write_all(tenants).await
    }

    async fn last_modified(&self) -> Result<ModificationMarker> {
        self.inner.last_modified().await
    }
}
