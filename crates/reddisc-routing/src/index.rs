//! Subscription index
//!
//! Derived from one tenant snapshot and never mutated afterwards. A config
//! change produces a brand new index which replaces the old one wholesale,
//! so a route still holding the previous index is unaffected.

use reddisc_core::{
    source::ChannelQuery,
    tenant::{Tenant, TenantId, normalize_author, normalize_channel},
};
use std::collections::{HashMap, HashSet};

/// Lookup tables from subreddit and author to the tenants watching them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionIndex {
    by_channel: HashMap<String, HashSet<TenantId>>,
    by_author: HashMap<String, HashSet<TenantId>>,
    tenants: HashMap<TenantId, Tenant>,
}

impl SubscriptionIndex {
    /// Build an index from a tenant snapshot.
    ///
    /// Pure and deterministic: the result depends only on the set of tenants,
    /// not on their order. When an id appears twice the later record wins.
    pub fn build<'a>(tenants: impl IntoIterator<Item = &'a Tenant>) -> Self {
        let tenants: HashMap<TenantId, Tenant> = tenants
            .into_iter()
            .map(|t| (t.id.clone(), t.clone().normalized()))
            .collect();

        let mut by_channel: HashMap<String, HashSet<TenantId>> = HashMap::new();
        let mut by_author: HashMap<String, HashSet<TenantId>> = HashMap::new();

        for (id, tenant) in &tenants {
            for channel in tenant.subscribed_channels.keys() {
                by_channel
                    .entry(channel.clone())
                    .or_default()
                    .insert(id.clone());
            }
            for author in &tenant.watched_authors {
                by_author
                    .entry(author.clone())
                    .or_default()
                    .insert(id.clone());
            }
        }

        Self {
            by_channel,
            by_author,
            tenants,
        }
    }

    /// Tenants subscribed to a subreddit (case-insensitive)
    pub fn tenants_for_channel(&self, channel: &str) -> Option<&HashSet<TenantId>> {
        self.by_channel.get(&normalize_channel(channel))
    }

    /// Tenants watching an author (case-insensitive)
    pub fn tenants_for_author(&self, author: &str) -> Option<&HashSet<TenantId>> {
        self.by_author.get(&normalize_author(author))
    }

    /// Tenant record as of the snapshot the index was built from
    pub fn tenant(&self, id: &TenantId) -> Option<&Tenant> {
        self.tenants.get(id)
    }

    /// Union of every subscribed subreddit
    pub fn channel_query(&self) -> ChannelQuery {
        ChannelQuery::from_channels(self.by_channel.keys())
    }

    pub fn tenant_count(&self) -> usize {
        self.tenants.len()
    }

    pub fn channel_count(&self) -> usize {
        self.by_channel.len()
    }

    pub fn author_count(&self) -> usize {
        self.by_author.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tenants.is_empty()
    }
}
