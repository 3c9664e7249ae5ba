//! Tenant records and name normalization
//!
//! A tenant (a Discord guild) declares which subreddits it follows, which
//! flairs within those subreddits matter, which authors it wants alerts for,
//! and where alerts are delivered. Subreddit and author names are stored
//! lower-cased so every lookup downstream is an exact match.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Unique identifier for a tenant (the guild id on the sink platform).
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    /// Create a tenant ID from any string-like value
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().trim().to_string())
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TenantId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let id = Self::new(s);
        if id.0.is_empty() {
            return Err(Error::InvalidName("tenant id must not be empty".to_string()));
        }
        Ok(id)
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for TenantId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Normalize a subreddit or author name for storage and lookup.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Normalize a subreddit name, accepting `r/name` and `/r/name` forms.
pub fn normalize_channel(name: &str) -> String {
    let trimmed = name.trim();
    let bare = trimmed
        .strip_prefix("/r/")
        .or_else(|| trimmed.strip_prefix("r/"))
        .unwrap_or(trimmed);
    normalize_name(bare)
}

/// Normalize an author name, accepting `u/name` and `/u/name` forms.
pub fn normalize_author(name: &str) -> String {
    let trimmed = name.trim();
    let bare = trimmed
        .strip_prefix("/u/")
        .or_else(|| trimmed.strip_prefix("u/"))
        .unwrap_or(trimmed);
    normalize_name(bare)
}

/// Per-subreddit subscription settings.
///
/// The flair allow-list is recorded but never consulted when matching
/// comments; only author and subreddit membership gate delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSubscription {
    #[serde(default)]
    pub flair_allow_list: BTreeSet<String>,
}

/// One subscribing tenant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    /// Tenant ID; persisted as the key of the tenant map, not inside the record
    #[serde(skip)]
    pub id: TenantId,

    /// Sink-side channel that receives notifications
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_channel: Option<String>,

    /// Normalized subreddit name -> subscription settings
    #[serde(default)]
    pub subscribed_channels: BTreeMap<String, ChannelSubscription>,

    /// Normalized author names
    #[serde(default)]
    pub watched_authors: BTreeSet<String>,
}

impl Tenant {
    /// Create an empty tenant
    pub fn new(id: impl Into<TenantId>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Set the destination channel
    pub fn with_destination(mut self, channel: impl Into<String>) -> Self {
        self.destination_channel = Some(channel.into());
        self
    }

    /// Subscribe to a subreddit
    pub fn subscribe(mut self, channel: &str) -> Self {
        self.subscribed_channels
            .entry(normalize_channel(channel))
            .or_default();
        self
    }

    /// Subscribe to a subreddit with a flair allow-list
    pub fn subscribe_with_flairs<'a>(
        mut self,
        channel: &str,
        flairs: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let entry = self
            .subscribed_channels
            .entry(normalize_channel(channel))
            .or_default();
        entry
            .flair_allow_list
            .extend(flairs.into_iter().map(str::to_string));
        self
    }

    /// Watch an author
    pub fn watch_author(mut self, author: &str) -> Self {
        self.watched_authors.insert(normalize_author(author));
        self
    }

    /// Check if the tenant subscribes to a subreddit (case-insensitive)
    pub fn watches_channel(&self, channel: &str) -> bool {
        self.subscribed_channels
            .contains_key(&normalize_channel(channel))
    }

    /// Check if the tenant watches an author (case-insensitive)
    pub fn watches_author(&self, author: &str) -> bool {
        self.watched_authors.contains(&normalize_author(author))
    }

    /// Re-normalize a record that may have been edited by hand.
    ///
    /// Mixed-case keys collapse into one entry and their flair lists merge.
    pub fn normalized(self) -> Self {
        let mut subscribed_channels: BTreeMap<String, ChannelSubscription> = BTreeMap::new();
        for (channel, subscription) in self.subscribed_channels {
            subscribed_channels
                .entry(normalize_channel(&channel))
                .or_default()
                .flair_allow_list
                .extend(subscription.flair_allow_list);
        }

        let destination_channel = self
            .destination_channel
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        Self {
            id: self.id,
            destination_channel,
            subscribed_channels,
            watched_authors: self
                .watched_authors
                .iter()
                .map(|a| normalize_author(a))
                .filter(|a| !a.is_empty())
                .collect(),
        }
    }
}
