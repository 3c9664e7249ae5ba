//! Discord notifier sink
//!
//! Posts notifications as bot messages through the Discord REST API. The sink
//! owns retries for rate limits and server errors; callers see one outcome per
//! message.

use crate::{
    EgressError, Result,
    client::{HttpClientConfig, create_client, error_for_status, with_retry},
};
use async_trait::async_trait;
use reddisc_core::sink::NotifierSink;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, instrument};

/// Discord's per-message content limit, in characters
pub const MAX_MESSAGE_CHARS: usize = 2000;

/// Discord sink configuration
#[derive(Debug, Clone)]
pub struct DiscordConfig {
    /// Bot token (sent as `Authorization: Bot <token>`)
    pub bot_token: String,

    /// Base URL for the Discord API (default: https://discord.com/api/v10)
    pub base_url: String,

    /// HTTP client configuration
    pub client_config: HttpClientConfig,
}

impl DiscordConfig {
    /// Create a new Discord configuration
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            base_url: "https://discord.com/api/v10".to_string(),
            client_config: HttpClientConfig::default(),
        }
    }

    /// Set the base URL (for tests and proxies)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Serialize)]
struct CreateMessage<'a> {
    content: &'a str,
}

/// Discord sink
pub struct DiscordSink {
    config: DiscordConfig,
    client: Client,
}

impl DiscordSink {
    /// Create a new Discord sink
    pub fn new(config: DiscordConfig) -> Result<Self> {
        if config.bot_token.trim().is_empty() {
            return Err(EgressError::Config("Discord bot token is empty".to_string()));
        }
        let client = create_client(&config.client_config)?;
        Ok(Self { config, client })
    }

    #[instrument(skip(self, text), fields(chars = text.chars().count()))]
    async fn post_message(&self, channel_id: &str, text: &str) -> Result<()> {
        let content = truncate_message(text);
        let url = format!(
            "{}/channels/{}/messages",
            self.config.base_url.trim_end_matches('/'),
            channel_id
        );

        let url = url.as_str();

        with_retry(&self.config.client_config, || async move {
            let response = self
                .client
                .post(url)
                .header("Authorization", format!("Bot {}", self.config.bot_token))
                .json(&CreateMessage { content })
                .send()
                .await?;
            error_for_status(response).await?;
            Ok(())
        })
        .await?;

        debug!("Posted message to channel {}", channel_id);
        Ok(())
    }
}

#[async_trait]
impl NotifierSink for DiscordSink {
    async fn send(&self, channel_id: &str, text: &str) -> reddisc_core::Result<()> {
        self.post_message(channel_id, text)
            .await
            .map_err(EgressError::into_sink_error)
    }
}

/// Cut a message to the content limit on a character boundary
pub fn truncate_message(text: &str) -> &str {
    match text.char_indices().nth(MAX_MESSAGE_CHARS) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}
