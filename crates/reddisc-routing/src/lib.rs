//! RedDisc Routing Engine
//!
//! This crate provides the monitoring and routing logic:
//! - Subscription index derived from the tenant map
//! - Comment matching and notification composition
//! - Delivery fan-out to the notifier sink
//! - Reconciliation loop driving the comment stream

pub mod dispatch;
pub mod index;
pub mod payload;
pub mod reconcile;
pub mod router;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use dispatch::{DeliveryReport, deliver};
pub use index::SubscriptionIndex;
pub use payload::{
    MAX_NOTIFICATION_CHARS, NotificationPayload, ParentBlock, REPLY_TO_ORIGINAL_POST,
};
pub use reconcile::{LoopState, LoopStats, MonitorConfig, ReconciliationLoop};
pub use router::{Route, Router};
