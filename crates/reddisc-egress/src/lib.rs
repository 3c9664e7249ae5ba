//! RedDisc Egress Connectors
//!
//! This crate provides HTTP adapters for the external collaborators:
//! - Reddit comment source (listing API)
//! - Discord notifier sink (REST API)

pub mod client;
pub mod discord;
pub mod error;
pub mod reddit;
pub mod retry_after;

pub use client::HttpClientConfig;
pub use discord::{DiscordConfig, DiscordSink};
pub use error::{EgressError, Result};
pub use reddit::{RedditCommentSource, RedditConfig};
pub use retry_after::parse_retry_after;
