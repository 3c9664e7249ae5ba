//! Reddit comment source
//!
//! Streams new comments for a subreddit union by polling the listing endpoint
//! `GET /r/{a+b+c}/comments.json`:
//! - `subscribe` primes a fresh stream: comments already in the listing are
//!   marked as seen and never yielded
//! - Each fetch yields unseen comments oldest first
//! - A bounded seen-set deduplicates overlapping listings
//! - After more than `pause_after` consecutive fetches without anything new,
//!   `poll` returns `None` so the caller can do idle work
//!
//! Between empty fetches the source sleeps with exponential backoff, capped at
//! `max_backoff_secs`.

use crate::{
    EgressError, Result,
    client::{HttpClientConfig, create_client, error_for_status, with_retry},
};
use async_trait::async_trait;
use reddisc_core::{
    comment::{CommentEvent, ParentComment, ParentContext, ParentRef, Submission},
    source::{ChannelQuery, CommentSource, SubscriptionHandle},
};
use reqwest::{Client, Url};
use serde::Deserialize;
use std::collections::{HashSet, VecDeque};
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Prefix for building absolute comment links from listing permalinks
pub const PERMALINK_BASE: &str = "https://www.reddit.com";

/// Number of recently seen comment ids remembered per stream
pub const SEEN_CAPACITY: usize = 301;

/// Reddit source configuration
#[derive(Debug, Clone)]
pub struct RedditConfig {
    /// Base URL (https://www.reddit.com, or https://oauth.reddit.com with a token)
    pub base_url: String,

    /// Pre-provisioned OAuth bearer token
    pub access_token: Option<String>,

    /// Listing page size
    pub fetch_limit: u32,

    /// Ceiling for the sleep between empty fetches
    pub max_backoff_secs: u64,

    /// HTTP client configuration
    pub client_config: HttpClientConfig,
}

impl RedditConfig {
    /// Create a configuration for the public endpoint
    pub fn new() -> Self {
        Self {
            base_url: PERMALINK_BASE.to_string(),
            access_token: None,
            fetch_limit: 100,
            max_backoff_secs: 16,
            client_config: HttpClientConfig::default(),
        }
    }

    /// Set the base URL (for tests and the OAuth host)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the bearer token
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Set the user agent Reddit's API rules ask for
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.client_config.user_agent = user_agent.into();
        self
    }
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// User agent in the `<platform>:<app id>:<version> (by /u/<user>)` form
pub fn user_agent(app_id: &str, username: &str) -> String {
    format!(
        "reddit:{}:{} (by /u/{})",
        app_id,
        env!("CARGO_PKG_VERSION"),
        username
    )
}

// Listing wire format

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Thing>,
}

#[derive(Debug, Deserialize)]
struct Thing {
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// Listing children this source understands
#[derive(Debug)]
enum Item {
    Comment(RawComment),
    Link(RawLink),
}

impl Thing {
    fn into_item(self) -> Option<Item> {
        let parsed = match self.kind.as_str() {
            "t1" => serde_json::from_value(self.data).map(Item::Comment),
            "t3" => serde_json::from_value(self.data).map(Item::Link),
            _ => return None,
        };
        parsed
            .map_err(|e| debug!("Skipping malformed {} listing entry: {}", self.kind, e))
            .ok()
    }
}

#[derive(Debug, Deserialize)]
struct RawComment {
    id: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    subreddit: String,
    #[serde(default)]
    link_id: String,
    #[serde(default)]
    parent_id: Option<String>,
    #[serde(default)]
    permalink: String,
}

#[derive(Debug, Deserialize)]
struct RawLink {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    link_flair_text: Option<String>,
}

impl From<RawComment> for CommentEvent {
    fn from(raw: RawComment) -> Self {
        let submission_id = raw
            .link_id
            .strip_prefix("t3_")
            .unwrap_or(&raw.link_id)
            .to_string();
        Self {
            permalink_url: format!("{}{}", PERMALINK_BASE, raw.permalink),
            parent_id: raw.parent_id.as_deref().and_then(ParentRef::from_fullname),
            id: raw.id,
            body: raw.body,
            author_name: raw.author,
            source_channel_name: raw.subreddit,
            submission_id,
        }
    }
}

impl From<RawLink> for Submission {
    fn from(raw: RawLink) -> Self {
        Self {
            id: raw.id,
            title: raw.title,
            flair: raw.link_flair_text.filter(|f| !f.is_empty()),
        }
    }
}

/// FIFO-evicting set of recently seen ids
#[derive(Debug)]
struct BoundedSet {
    capacity: usize,
    order: VecDeque<String>,
    members: HashSet<String>,
}

impl BoundedSet {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            members: HashSet::with_capacity(capacity),
        }
    }

    fn contains(&self, id: &str) -> bool {
        self.members.contains(id)
    }

    fn insert(&mut self, id: &str) {
        if self.members.contains(id) {
            return;
        }
        if self.order.len() == self.capacity
            && let Some(evicted) = self.order.pop_front()
        {
            self.members.remove(&evicted);
        }
        self.order.push_back(id.to_string());
        self.members.insert(id.to_string());
    }
}

/// Per-subscription stream state
#[derive(Debug)]
struct Stream {
    id: u64,
    query: ChannelQuery,
    pause_after: u32,
    seen: BoundedSet,
    pending: VecDeque<CommentEvent>,
    empty_fetches: u32,
    backoff_secs: u64,
}

impl Stream {
    fn new(id: u64, query: ChannelQuery, pause_after: u32) -> Self {
        Self {
            id,
            query,
            pause_after,
            seen: BoundedSet::new(SEEN_CAPACITY),
            pending: VecDeque::new(),
            empty_fetches: 0,
            backoff_secs: 1,
        }
    }

    /// Queue unseen comments; `comments` is newest first as Reddit lists them
    fn absorb(&mut self, comments: Vec<CommentEvent>, emit: bool) -> usize {
        let mut fresh = 0;
        for comment in comments.into_iter().rev() {
            if self.seen.contains(&comment.id) {
                continue;
            }
            self.seen.insert(&comment.id);
            fresh += 1;
            if emit {
                self.pending.push_back(comment);
            }
        }

        if fresh > 0 {
            self.empty_fetches = 0;
            self.backoff_secs = 1;
        }
        fresh
    }

    /// Sleep before the next empty fetch, or `None` once `pause_after` is exceeded
    fn next_backoff(&mut self, max_backoff_secs: u64) -> Option<Duration> {
        self.empty_fetches += 1;
        if self.empty_fetches > self.pause_after {
            self.empty_fetches = 0;
            return None;
        }
        let delay = self.backoff_secs.min(max_backoff_secs);
        self.backoff_secs = self.backoff_secs.saturating_mul(2).min(max_backoff_secs.max(1));
        Some(Duration::from_secs(delay))
    }
}

/// Reddit comment source
pub struct RedditCommentSource {
    config: RedditConfig,
    client: Client,
    stream: Option<Stream>,
    next_id: u64,
}

impl RedditCommentSource {
    /// Create a new Reddit source
    pub fn new(config: RedditConfig) -> Result<Self> {
        Url::parse(&config.base_url)
            .map_err(|e| EgressError::Config(format!("Invalid Reddit base URL: {}", e)))?;
        let client = create_client(&config.client_config)?;
        Ok(Self {
            config,
            client,
            stream: None,
            next_id: 1,
        })
    }

    fn url(&self, path: &str, params: &[(&str, &str)]) -> Result<Url> {
        let mut url = Url::parse(&format!(
            "{}{}",
            self.config.base_url.trim_end_matches('/'),
            path
        ))
        .map_err(|e| EgressError::Config(format!("Invalid Reddit URL: {}", e)))?;
        url.query_pairs_mut().extend_pairs(params);
        Ok(url)
    }

    async fn get_listing(&self, url: Url) -> Result<Listing> {
        with_retry(&self.config.client_config, || {
            let url = url.clone();
            async move {
                let mut request = self.client.get(url);
                if let Some(token) = &self.config.access_token {
                    request = request.header("Authorization", format!("bearer {}", token));
                }
                let response = error_for_status(request.send().await?).await?;
                response
                    .json::<Listing>()
                    .await
                    .map_err(|e| EgressError::Parse(format!("Invalid Reddit listing: {}", e)))
            }
        })
        .await
    }

    #[instrument(skip(self, query), fields(query = %query))]
    async fn fetch_new_comments(&self, query: &ChannelQuery) -> Result<Vec<CommentEvent>> {
        let limit = self.config.fetch_limit.to_string();
        let url = self.url(
            &format!("/r/{}/comments.json", query.as_query_string()),
            &[("limit", limit.as_str()), ("raw_json", "1")],
        )?;

        let listing = self.get_listing(url).await?;
        Ok(listing
            .data
            .children
            .into_iter()
            .filter_map(|thing| match thing.into_item() {
                Some(Item::Comment(raw)) => Some(CommentEvent::from(raw)),
                _ => None,
            })
            .collect())
    }

    async fn fetch_item(&self, fullname: &str) -> Result<Option<Item>> {
        let url = self.url("/api/info.json", &[("id", fullname), ("raw_json", "1")])?;
        let listing = self.get_listing(url).await?;
        Ok(listing.data.children.into_iter().find_map(Thing::into_item))
    }
}

#[async_trait]
impl CommentSource for RedditCommentSource {
    async fn subscribe(
        &mut self,
        query: &ChannelQuery,
        pause_after: u32,
    ) -> reddisc_core::Result<SubscriptionHandle> {
        let mut stream = Stream::new(self.next_id, query.clone(), pause_after);
        self.next_id += 1;

        let existing = self
            .fetch_new_comments(query)
            .await
            .map_err(EgressError::into_source_error)?;
        let skipped = stream.absorb(existing, false);

        info!(
            "Subscribed to r/{} (pause_after={}, skipped {} existing comments)",
            query, pause_after, skipped
        );

        let handle = SubscriptionHandle {
            id: stream.id,
            query: query.clone(),
        };
        self.stream = Some(stream);
        Ok(handle)
    }

    async fn poll(
        &mut self,
        handle: &SubscriptionHandle,
    ) -> reddisc_core::Result<Option<CommentEvent>> {
        let stream = match self.stream.take() {
            Some(stream) if stream.id == handle.id => stream,
            other => {
                self.stream = other;
                return Err(reddisc_core::Error::Source(format!(
                    "Subscription {} is no longer active",
                    handle.id
                )));
            }
        };

        let result = self.poll_stream(stream).await;
        result.map_err(EgressError::into_source_error)
    }

    async fn fetch_submission(&self, submission_id: &str) -> reddisc_core::Result<Submission> {
        let fullname = ParentRef::Submission(submission_id.to_string()).fullname();
        match self
            .fetch_item(&fullname)
            .await
            .map_err(EgressError::into_context_error)?
        {
            Some(Item::Link(raw)) => Ok(raw.into()),
            _ => Err(reddisc_core::Error::ContextUnavailable(format!(
                "submission {} not found",
                submission_id
            ))),
        }
    }

    async fn fetch_parent(&self, parent: &ParentRef) -> reddisc_core::Result<ParentContext> {
        let fullname = parent.fullname();
        match self
            .fetch_item(&fullname)
            .await
            .map_err(EgressError::into_context_error)?
        {
            Some(Item::Comment(raw)) => Ok(ParentContext::Comment(ParentComment {
                id: raw.id,
                author_name: raw.author,
                body: raw.body,
            })),
            Some(Item::Link(raw)) => Ok(ParentContext::Submission(raw.into())),
            _ => Err(reddisc_core::Error::ContextUnavailable(format!(
                "{} not found",
                fullname
            ))),
        }
    }
}

impl RedditCommentSource {
    /// Run the stream until it yields a comment or pauses; the stream is put
    /// back even when a fetch fails
    async fn poll_stream(&mut self, mut stream: Stream) -> Result<Option<CommentEvent>> {
        let outcome = loop {
            if let Some(event) = stream.pending.pop_front() {
                break Ok(Some(event));
            }

            let comments = match self.fetch_new_comments(&stream.query).await {
                Ok(comments) => comments,
                Err(e) => break Err(e),
            };
            if stream.absorb(comments, true) > 0 {
                continue;
            }

            match stream.next_backoff(self.config.max_backoff_secs) {
                None => {
                    debug!("No new comments after {} fetches", stream.pause_after + 1);
                    break Ok(None);
                }
                Some(delay) if !delay.is_zero() => tokio::time::sleep(delay).await,
                Some(_) => {}
            }
        };

        self.stream = Some(stream);
        outcome
    }
}
