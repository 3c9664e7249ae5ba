use reddisc_core::source::ChannelQuery;
use reddisc_egress::{DiscordConfig, RedditConfig, reddit::user_agent};
use reddisc_observability::LoggingConfig;
use reddisc_routing::MonitorConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_tenants_path")]
    pub tenants_path: String,

    #[serde(default)]
    pub monitor: MonitorSettings,

    #[serde(default)]
    pub reddit: RedditSettings,

    #[serde(default)]
    pub discord: DiscordSettings,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub metrics: MetricsSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSettings {
    #[serde(default = "default_idle_interval_secs")]
    pub idle_interval_secs: u64,

    /// Empty fetches tolerated by the first subscription
    #[serde(default = "default_pause_after")]
    pub pause_after: u32,

    /// Empty fetches tolerated by subscriptions issued after a config change
    #[serde(default)]
    pub resubscribe_pause_after: u32,

    /// Streamed when no tenant subscribes to anything (e.g. `TheDragonPrince`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_query: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditSettings {
    #[serde(default = "default_reddit_base_url")]
    pub base_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default = "default_fetch_limit")]
    pub fetch_limit: u32,

    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordSettings {
    #[serde(default = "default_discord_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub bot_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSettings {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_metrics_listen")]
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tenants_path: default_tenants_path(),
            monitor: MonitorSettings::default(),
            reddit: RedditSettings::default(),
            discord: DiscordSettings::default(),
            logging: LoggingConfig::default(),
            metrics: MetricsSettings::default(),
        }
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            idle_interval_secs: default_idle_interval_secs(),
            pause_after: default_pause_after(),
            resubscribe_pause_after: 0,
            fallback_query: None,
        }
    }
}

impl Default for RedditSettings {
    fn default() -> Self {
        Self {
            base_url: default_reddit_base_url(),
            access_token: None,
            user_agent: None,
            app_id: None,
            username: None,
            fetch_limit: default_fetch_limit(),
            max_backoff_secs: default_max_backoff_secs(),
        }
    }
}

impl Default for DiscordSettings {
    fn default() -> Self {
        Self {
            base_url: default_discord_base_url(),
            bot_token: String::new(),
        }
    }
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: default_metrics_listen(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(String),

    #[error("Failed to parse config file: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl ServerConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(format!("{}: {}", path.display(), e)))?;

        let config = if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            toml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(format!("TOML parse error: {}", e)))?
        } else {
            // Default to YAML
            serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(format!("YAML parse error: {}", e)))?
        };

        Ok(config)
    }

    /// Merge environment variables into config (env vars take precedence)
    pub fn merge_env(&mut self) {
        self.merge_vars(|name| std::env::var(name).ok());
    }

    fn merge_vars(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(val) = var("REDDISC_TENANTS") {
            self.tenants_path = val;
        }

        if let Some(val) = var("REDDISC_IDLE_INTERVAL_SECS") {
            match val.parse::<u64>() {
                Ok(secs) => self.monitor.idle_interval_secs = secs,
                Err(_) => eprintln!(
                    "Warning: Invalid REDDISC_IDLE_INTERVAL_SECS '{}', using {}",
                    val, self.monitor.idle_interval_secs
                ),
            }
        }

        // Reddit credentials
        if let Some(val) = var("REDDISC_RED_TOKEN") {
            self.reddit.access_token = Some(val);
        }

        if let Some(val) = var("REDDISC_RED_APP_ID") {
            self.reddit.app_id = Some(val);
        }

        if let Some(val) = var("REDDISC_RED_USER") {
            self.reddit.username = Some(val);
        }

        // Discord credentials
        if let Some(val) = var("REDDISC_DISCORD_TOKEN") {
            self.discord.bot_token = val;
        }

        if let Some(val) = var("REDDISC_LOG_LEVEL") {
            self.logging.level = val;
        }
    }

    /// Check settings that would otherwise fail later at the first request
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.discord.bot_token.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "discord.bot_token is required (or set REDDISC_DISCORD_TOKEN)".to_string(),
            ));
        }

        if self.reddit.fetch_limit == 0 || self.reddit.fetch_limit > 100 {
            return Err(ConfigError::ValidationError(format!(
                "reddit.fetch_limit must be between 1 and 100, got {}",
                self.reddit.fetch_limit
            )));
        }

        if self.metrics.enabled {
            self.metrics_addr()?;
        }

        Ok(())
    }

    /// Tenant file path with `~` and environment variables expanded
    pub fn tenants_path(&self) -> Result<PathBuf, ConfigError> {
        shellexpand::full(&self.tenants_path)
            .map(|expanded| PathBuf::from(expanded.as_ref()))
            .map_err(|e| ConfigError::ValidationError(format!("tenants_path: {}", e)))
    }

    pub fn metrics_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.metrics.listen.parse().map_err(|e| {
            ConfigError::ValidationError(format!(
                "metrics.listen '{}' is not a socket address: {}",
                self.metrics.listen, e
            ))
        })
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            idle_interval: Duration::from_secs(self.monitor.idle_interval_secs),
            pause_after: self.monitor.pause_after,
            resubscribe_pause_after: self.monitor.resubscribe_pause_after,
            fallback_query: self
                .monitor
                .fallback_query
                .as_deref()
                .map(ChannelQuery::parse)
                .filter(|q| !q.is_empty()),
        }
    }

    pub fn reddit_config(&self) -> RedditConfig {
        let mut config = RedditConfig {
            fetch_limit: self.reddit.fetch_limit,
            max_backoff_secs: self.reddit.max_backoff_secs,
            ..RedditConfig::new().with_base_url(&self.reddit.base_url)
        };

        if let Some(token) = &self.reddit.access_token {
            config = config.with_access_token(token);
        }

        let agent = match (&self.reddit.user_agent, &self.reddit.app_id, &self.reddit.username) {
            (Some(agent), _, _) => Some(agent.clone()),
            (None, Some(app_id), Some(username)) => Some(user_agent(app_id, username)),
            _ => None,
        };
        if let Some(agent) = agent {
            config = config.with_user_agent(agent);
        }

        config
    }

    pub fn discord_config(&self) -> DiscordConfig {
        DiscordConfig::new(&self.discord.bot_token).with_base_url(&self.discord.base_url)
    }
}

fn default_tenants_path() -> String {
    "./tenants.yaml".to_string()
}

fn default_idle_interval_secs() -> u64 {
    5
}

fn default_pause_after() -> u32 {
    16
}

fn default_reddit_base_url() -> String {
    "https://www.reddit.com".to_string()
}

fn default_fetch_limit() -> u32 {
    100
}

fn default_max_backoff_secs() -> u64 {
    16
}

fn default_discord_base_url() -> String {
    "https://discord.com/api/v10".to_string()
}

fn default_metrics_listen() -> String {
    "127.0.0.1:9187".to_string()
}
