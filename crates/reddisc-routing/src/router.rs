//! Comment router
//!
//! Decides which tenants a comment is delivered to and composes the
//! notification they receive:
//! - Candidates come from the author index; an unwatched author short-circuits
//! - Each candidate keeps the comment only if it subscribes to the subreddit
//! - Submission and parent context are fetched best-effort
//!
//! Flair allow-lists are not consulted; author and subreddit membership are
//! the only conditions for delivery.

use reddisc_core::{
    comment::{CommentEvent, ParentContext, ParentRef},
    source::CommentSource,
    tenant::{TenantId, normalize_channel},
};
use reddisc_observability::Metrics;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::index::SubscriptionIndex;
use crate::payload::{NotificationPayload, ParentBlock};

/// One delivery decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub tenant_id: TenantId,
    /// Destination channel as of the index snapshot; `None` if unset
    pub destination: Option<String>,
    pub payload: Arc<NotificationPayload>,
}

/// Matches comments against a subscription index
#[derive(Clone, Default)]
pub struct Router {
    metrics: Option<Metrics>,
}

impl Router {
    /// Create a new router
    pub fn new() -> Self {
        Self::default()
    }

    /// Record context failures to the given metrics
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Tenants that should be notified about a comment, ordered by id
    pub fn match_tenants(event: &CommentEvent, index: &SubscriptionIndex) -> Vec<TenantId> {
        let channel = normalize_channel(&event.source_channel_name);

        // The index normalizes the author itself
        let Some(candidates) = index.tenants_for_author(&event.author_name) else {
            return Vec::new();
        };

        let mut matched: Vec<TenantId> = candidates
            .iter()
            .filter(|id| {
                index
                    .tenant(id)
                    .is_some_and(|t| t.subscribed_channels.contains_key(&channel))
            })
            .cloned()
            .collect();
        matched.sort();
        matched
    }

    /// Route a comment: one `Route` per matching tenant, all sharing one payload
    pub async fn route(
        &self,
        event: &CommentEvent,
        index: &SubscriptionIndex,
        source: &dyn CommentSource,
    ) -> Vec<Route> {
        let matched = Self::match_tenants(event, index);
        if matched.is_empty() {
            return Vec::new();
        }

        debug!(
            "Comment {} by u/{} in r/{} matched {} tenant(s)",
            event.id,
            event.author_name,
            event.source_channel_name,
            matched.len()
        );

        let payload = Arc::new(self.compose(event, source).await);

        matched
            .into_iter()
            .map(|tenant_id| Route {
                destination: index
                    .tenant(&tenant_id)
                    .and_then(|t| t.destination_channel.clone()),
                tenant_id,
                payload: Arc::clone(&payload),
            })
            .collect()
    }

    /// Compose the payload, degrading to less context when lookups fail
    pub async fn compose(
        &self,
        event: &CommentEvent,
        source: &dyn CommentSource,
    ) -> NotificationPayload {
        let (submission, parent) = futures::join!(
            source.fetch_submission(&event.submission_id),
            self.resolve_parent(event, source)
        );

        let submission_title = match submission {
            Ok(submission) => Some(submission.title),
            Err(e) => {
                warn!(
                    "Submission {} unavailable for comment {}: {}",
                    event.submission_id, event.id, e
                );
                self.record_context_failure("submission");
                None
            }
        };

        NotificationPayload {
            channel: normalize_channel(&event.source_channel_name),
            author: event.author_name.clone(),
            submission_title,
            body: event.body.clone(),
            parent,
            permalink: event.permalink_url.clone(),
        }
    }

    async fn resolve_parent(&self, event: &CommentEvent, source: &dyn CommentSource) -> ParentBlock {
        let parent_ref = match &event.parent_id {
            Some(ParentRef::Submission(_)) => return ParentBlock::OriginalPost,
            Some(parent_ref) => parent_ref,
            None => return ParentBlock::Unavailable,
        };

        match source.fetch_parent(parent_ref).await {
            Ok(ParentContext::Comment(parent)) => ParentBlock::Comment {
                author: parent.author_name,
                body: parent.body,
            },
            Ok(ParentContext::Submission(_)) => ParentBlock::OriginalPost,
            Err(e) => {
                warn!(
                    "Parent {} unavailable for comment {}: {}",
                    parent_ref.fullname(),
                    event.id,
                    e
                );
                self.record_context_failure("parent");
                ParentBlock::Unavailable
            }
        }
    }

    fn record_context_failure(&self, kind: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_context_failure(kind);
        }
    }
}
