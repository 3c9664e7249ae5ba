//! Common test utilities for integration tests

use async_trait::async_trait;
use reddisc_core::{
    Error, Result,
    comment::{CommentEvent, ParentComment, ParentContext, ParentRef, Submission},
    sink::NotifierSink,
    source::{ChannelQuery, CommentSource, SubscriptionHandle},
};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

pub fn comment(id: &str, author: &str, channel: &str) -> CommentEvent {
    CommentEvent {
        id: id.to_string(),
        permalink_url: format!("https://www.reddit.com/r/{}/comments/s1/post/{}/", channel, id),
        body: format!("comment {}", id),
        author_name: author.to_string(),
        source_channel_name: channel.to_string(),
        submission_id: "s1".to_string(),
        parent_id: Some(ParentRef::Submission("s1".to_string())),
    }
}

#[derive(Default)]
struct SourceState {
    events: VecDeque<CommentEvent>,
    subscriptions: Vec<(String, u32)>,
}

/// Comment source fed by the test; every poll drains one queued event
#[derive(Clone, Default)]
#[allow(dead_code)]
pub struct ScriptedSource {
    state: Arc<Mutex<SourceState>>,
}

#[allow(dead_code)]
impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: CommentEvent) {
        self.state.lock().unwrap().events.push_back(event);
    }

    /// Queries subscribed so far, with their pause_after
    pub fn subscriptions(&self) -> Vec<(String, u32)> {
        self.state.lock().unwrap().subscriptions.clone()
    }
}

#[async_trait]
impl CommentSource for ScriptedSource {
    async fn subscribe(
        &mut self,
        query: &ChannelQuery,
        pause_after: u32,
    ) -> Result<SubscriptionHandle> {
        let mut state = self.state.lock().unwrap();
        state
            .subscriptions
            .push((query.as_query_string(), pause_after));
        Ok(SubscriptionHandle {
            id: state.subscriptions.len() as u64,
            query: query.clone(),
        })
    }

    async fn poll(&mut self, handle: &SubscriptionHandle) -> Result<Option<CommentEvent>> {
        let mut state = self.state.lock().unwrap();
        if handle.id != state.subscriptions.len() as u64 {
            return Err(Error::Source("stale subscription".to_string()));
        }
        // Only comments from subscribed subreddits reach the stream
        while let Some(event) = state.events.pop_front() {
            if handle.query.contains(&event.source_channel_name) {
                return Ok(Some(event));
            }
        }
        Ok(None)
    }

    async fn fetch_submission(&self, submission_id: &str) -> Result<Submission> {
        Ok(Submission {
            id: submission_id.to_string(),
            title: format!("Post {}", submission_id),
            flair: Some("Discussion".to_string()),
        })
    }

    async fn fetch_parent(&self, parent: &ParentRef) -> Result<ParentContext> {
        match parent {
            ParentRef::Comment(id) => Ok(ParentContext::Comment(ParentComment {
                id: id.clone(),
                author_name: "alice".to_string(),
                body: "hi".to_string(),
            })),
            ParentRef::Submission(id) => Ok(ParentContext::Submission(
                self.fetch_submission(id).await?,
            )),
        }
    }
}

/// Sink that records deliveries and rejects chosen channels
#[derive(Clone, Default)]
#[allow(dead_code)]
pub struct RecordingSink {
    sent: Arc<Mutex<Vec<(String, String)>>>,
    rejecting: Arc<Mutex<HashSet<String>>>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject(&self, channel_id: &str) {
        self.rejecting.lock().unwrap().insert(channel_id.to_string());
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn channels(&self) -> Vec<String> {
        self.sent().into_iter().map(|(channel, _)| channel).collect()
    }
}

#[async_trait]
impl NotifierSink for RecordingSink {
    async fn send(&self, channel_id: &str, text: &str) -> Result<()> {
        if self.rejecting.lock().unwrap().contains(channel_id) {
            return Err(Error::Sink(format!("Missing access to {}", channel_id)));
        }
        self.sent
            .lock()
            .unwrap()
            .push((channel_id.to_string(), text.to_string()));
        Ok(())
    }
}
