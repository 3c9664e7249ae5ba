//! Tenant administration commands
//!
//! Each command reads the whole tenant map, mutates one record and writes the
//! whole map back. Lookups that find nothing are reported as values
//! (`AdminOutcome::NotFound`, `MentionLookup::NotFound`), not errors.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use crate::{
    Error, Result,
    config_store::ConfigStore,
    tenant::{Tenant, TenantId, normalize_author, normalize_channel},
};

static SUBREDDIT_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9_]{2,21}$").expect("subreddit name pattern"));

static AUTHOR_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9_-]{3,20}$").expect("author name pattern"));

static CHANNEL_MENTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:<#(\d+)>|(\d+))$").expect("channel mention pattern"));

/// What a command could not find
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotFound {
    Tenant(TenantId),
    Channel(String),
    Flair { channel: String, flair: String },
    Author(String),
}

/// Result of an administration command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminOutcome {
    /// The record changed and was written back
    Updated,
    /// The record already had the requested shape; nothing was written
    Unchanged,
    /// The target of the command does not exist
    NotFound(NotFound),
}

/// Result of resolving a destination channel mention
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MentionLookup {
    Found(String),
    NotFound,
}

/// Resolve `<#123>` or a bare `123` to a channel id
pub fn parse_channel_mention(mention: &str) -> MentionLookup {
    match CHANNEL_MENTION.captures(mention.trim()) {
        Some(caps) => caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| MentionLookup::Found(m.as_str().to_string()))
            .unwrap_or(MentionLookup::NotFound),
        None => MentionLookup::NotFound,
    }
}

fn valid_channel(name: &str) -> Result<String> {
    let name = normalize_channel(name);
    if SUBREDDIT_NAME.is_match(&name) {
        Ok(name)
    } else {
        Err(Error::InvalidName(format!("'{}' is not a valid subreddit name", name)))
    }
}

fn valid_author(name: &str) -> Result<String> {
    let name = normalize_author(name);
    if AUTHOR_NAME.is_match(&name) {
        Ok(name)
    } else {
        Err(Error::InvalidName(format!("'{}' is not a valid user name", name)))
    }
}

/// CRUD commands over the tenant map
#[derive(Clone)]
pub struct TenantAdmin {
    store: Arc<dyn ConfigStore>,
}

impl TenantAdmin {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self { store }
    }

    /// Current record of a tenant
    pub async fn tenant(&self, id: &TenantId) -> Result<Option<Tenant>> {
        let snapshot = self.store.read_all().await?;
        Ok(snapshot.tenant(id).cloned())
    }

    /// All tenants, ordered by id
    pub async fn tenants(&self) -> Result<Vec<Tenant>> {
        Ok(self.store.read_all().await?.tenants)
    }

    /// Subscribe a tenant to a subreddit, creating the tenant if needed
    pub async fn add_channel(&self, id: &TenantId, channel: &str) -> Result<AdminOutcome> {
        let channel = valid_channel(channel)?;
        self.mutate(id, true, |tenant| {
            if tenant.subscribed_channels.contains_key(&channel) {
                AdminOutcome::Unchanged
            } else {
                tenant
                    .subscribed_channels
                    .insert(channel.clone(), Default::default());
                AdminOutcome::Updated
            }
        })
        .await
    }

    /// Unsubscribe a tenant from a subreddit, dropping its flair list
    pub async fn remove_channel(&self, id: &TenantId, channel: &str) -> Result<AdminOutcome> {
        let channel = normalize_channel(channel);
        self.mutate(id, false, |tenant| {
            match tenant.subscribed_channels.remove(&channel) {
                Some(_) => AdminOutcome::Updated,
                None => AdminOutcome::NotFound(NotFound::Channel(channel.clone())),
            }
        })
        .await
    }

    /// Add a flair to a subscribed subreddit's allow-list
    pub async fn add_flair(&self, id: &TenantId, channel: &str, flair: &str) -> Result<AdminOutcome> {
        let channel = normalize_channel(channel);
        let flair = flair.trim().to_string();
        if flair.is_empty() {
            return Err(Error::InvalidName("flair must not be empty".to_string()));
        }
        self.mutate(id, false, |tenant| {
            match tenant.subscribed_channels.get_mut(&channel) {
                Some(sub) => {
                    if sub.flair_allow_list.insert(flair.clone()) {
                        AdminOutcome::Updated
                    } else {
                        AdminOutcome::Unchanged
                    }
                }
                None => AdminOutcome::NotFound(NotFound::Channel(channel.clone())),
            }
        })
        .await
    }

    /// Remove a flair from a subscribed subreddit's allow-list
    pub async fn remove_flair(
        &self,
        id: &TenantId,
        channel: &str,
        flair: &str,
    ) -> Result<AdminOutcome> {
        let channel = normalize_channel(channel);
        let flair = flair.trim().to_string();
        self.mutate(id, false, |tenant| {
            match tenant.subscribed_channels.get_mut(&channel) {
                Some(sub) => {
                    if sub.flair_allow_list.remove(&flair) {
                        AdminOutcome::Updated
                    } else {
                        AdminOutcome::NotFound(NotFound::Flair {
                            channel: channel.clone(),
                            flair: flair.clone(),
                        })
                    }
                }
                None => AdminOutcome::NotFound(NotFound::Channel(channel.clone())),
            }
        })
        .await
    }

    /// Watch an author, creating the tenant if needed
    pub async fn add_author(&self, id: &TenantId, author: &str) -> Result<AdminOutcome> {
        let author = valid_author(author)?;
        self.mutate(id, true, |tenant| {
            if tenant.watched_authors.insert(author.clone()) {
                AdminOutcome::Updated
            } else {
                AdminOutcome::Unchanged
            }
        })
        .await
    }

    /// Stop watching an author
    pub async fn remove_author(&self, id: &TenantId, author: &str) -> Result<AdminOutcome> {
        let author = normalize_author(author);
        self.mutate(id, false, |tenant| {
            if tenant.watched_authors.remove(&author) {
                AdminOutcome::Updated
            } else {
                AdminOutcome::NotFound(NotFound::Author(author.clone()))
            }
        })
        .await
    }

    /// Set the destination channel from a mention or bare id
    pub async fn set_destination(&self, id: &TenantId, mention: &str) -> Result<AdminOutcome> {
        let channel = match parse_channel_mention(mention) {
            MentionLookup::Found(channel) => channel,
            MentionLookup::NotFound => {
                return Ok(AdminOutcome::NotFound(NotFound::Channel(
                    mention.trim().to_string(),
                )));
            }
        };
        self.mutate(id, true, |tenant| {
            if tenant.destination_channel.as_deref() == Some(channel.as_str()) {
                AdminOutcome::Unchanged
            } else {
                tenant.destination_channel = Some(channel.clone());
                AdminOutcome::Updated
            }
        })
        .await
    }

    /// Drop a tenant entirely
    pub async fn remove_tenant(&self, id: &TenantId) -> Result<AdminOutcome> {
        let mut tenants = self.store.read_all().await?.into_map();
        if tenants.remove(id).is_none() {
            return Ok(AdminOutcome::NotFound(NotFound::Tenant(id.clone())));
        }
        self.store.write_all(tenants.into_values().collect()).await?;
        info!("Removed tenant {}", id);
        Ok(AdminOutcome::Updated)
    }

    async fn mutate<F>(&self, id: &TenantId, create: bool, apply: F) -> Result<AdminOutcome>
    where
        F: FnOnce(&mut Tenant) -> AdminOutcome + Send,
    {
        let mut tenants: BTreeMap<TenantId, Tenant> = self.store.read_all().await?.into_map();

        if !tenants.contains_key(id) {
            if !create {
                return Ok(AdminOutcome::NotFound(NotFound::Tenant(id.clone())));
            }
            tenants.insert(id.clone(), Tenant::new(id.clone()));
        }

        let outcome = match tenants.get_mut(id) {
            Some(tenant) => apply(tenant),
            None => return Err(Error::Internal(format!("tenant {} vanished", id))),
        };

        if outcome == AdminOutcome::Updated {
            let marker = self.store.write_all(tenants.into_values().collect()).await?;
            info!("Updated tenant {} (marker {})", id, marker);
        }

        Ok(outcome)
    }
}
