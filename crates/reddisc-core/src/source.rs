//! Comment source trait
//!
//! The comment source is the monitored platform: it streams new comments for
//! a channel query and resolves the context (parent, submission) a comment is
//! quoted with.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::fmt;

use crate::{
    Result,
    comment::{CommentEvent, ParentContext, ParentRef, Submission},
    tenant::normalize_channel,
};

/// Union of subreddit names, rendered as Reddit's `a+b+c` OR-query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ChannelQuery {
    channels: BTreeSet<String>,
}

impl ChannelQuery {
    /// Build a query from channel names; duplicates and case collapse
    pub fn from_channels<I, S>(channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            channels: channels
                .into_iter()
                .map(|c| normalize_channel(c.as_ref()))
                .filter(|c| !c.is_empty())
                .collect(),
        }
    }

    /// Parse an already joined query (`a+b`)
    pub fn parse(query: &str) -> Self {
        Self::from_channels(query.split('+'))
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn channels(&self) -> impl Iterator<Item = &str> {
        self.channels.iter().map(String::as_str)
    }

    pub fn contains(&self, channel: &str) -> bool {
        self.channels.contains(&normalize_channel(channel))
    }

    /// Render as the source's OR-query string
    pub fn as_query_string(&self) -> String {
        self.channels
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("+")
    }
}

impl fmt::Display for ChannelQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_query_string())
    }
}

/// Handle to an active subscription on a comment source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    /// Source-assigned id; a newer subscription invalidates older handles
    pub id: u64,
    /// Query the subscription was created for
    pub query: ChannelQuery,
}

/// Comment source trait
///
/// Implementations:
/// - `RedditCommentSource`: Reddit listing API (see `reddisc-egress`)
#[async_trait]
pub trait CommentSource: Send + Sync {
    /// Start streaming comments for a query, replacing any earlier subscription
    ///
    /// # Arguments
    /// * `query` - Union of subreddits to stream
    /// * `pause_after` - Number of consecutive empty fetches tolerated before
    ///   `poll` reports "no event available"
    async fn subscribe(
        &mut self,
        query: &ChannelQuery,
        pause_after: u32,
    ) -> Result<SubscriptionHandle>;

    /// Next comment, or `None` when no new data is available this poll.
    ///
    /// `None` is not an error.
    async fn poll(&mut self, handle: &SubscriptionHandle) -> Result<Option<CommentEvent>>;

    /// Fetch the submission a comment belongs to
    ///
    /// # Errors
    /// - `Error::ContextUnavailable` if the submission is gone
    async fn fetch_submission(&self, submission_id: &str) -> Result<Submission>;

    /// Fetch the entity a comment replies to
    ///
    /// # Errors
    /// - `Error::ContextUnavailable` if the parent is gone
    async fn fetch_parent(&self, parent: &ParentRef) -> Result<ParentContext>;
}
