//! Notifier sink trait

use async_trait::async_trait;

use crate::Result;

/// Delivers composed notification text to a destination channel.
///
/// Calls are independent per destination; retries, if any, belong to the
/// implementation.
#[async_trait]
pub trait NotifierSink: Send + Sync {
    /// Send text to a channel
    ///
    /// # Errors
    /// - `Error::Sink` if the destination rejected or never received the message
    async fn send(&self, channel_id: &str, text: &str) -> Result<()>;
}
