//! Shared HTTP client utilities

use crate::{EgressError, Result};
use reqwest::{Client, ClientBuilder};
use std::time::Duration;
use tracing::{debug, warn};

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,

    /// Maximum number of idle connections per host
    pub pool_max_idle_per_host: usize,

    /// Maximum number of retries for transient errors
    pub max_retries: u32,

    /// Delay before the first retry; doubles on every further attempt
    pub retry_base_delay_ms: u64,

    /// User agent string
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            connect_timeout_secs: 10,
            pool_max_idle_per_host: 8,
            max_retries: 3,
            retry_base_delay_ms: 100,
            user_agent: format!("RedDisc/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Create a configured HTTP client with connection pooling
pub fn create_client(config: &HttpClientConfig) -> Result<Client> {
    ClientBuilder::new()
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        // Reddit and Discord drop idle keep-alive connections after ~60s
        .pool_idle_timeout(Duration::from_secs(50))
        .user_agent(&config.user_agent)
        .tcp_keepalive(Duration::from_secs(60))
        .build()
        .map_err(|e| EgressError::Config(format!("Failed to create HTTP client: {}", e)))
}

/// Retry policy for transient errors.
///
/// Rate-limit responses wait at least as long as the server asked.
pub async fn with_retry<F, Fut, T>(config: &HttpClientConfig, operation: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let max_retries = config.max_retries;
    let mut delay = Duration::ZERO;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            debug!(
                "Retrying request after {}ms (attempt {}/{})",
                delay.as_millis(),
                attempt,
                max_retries
            );
            tokio::time::sleep(delay).await;
        }

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_retryable() && attempt < max_retries => {
                warn!("Request failed (attempt {}/{}): {}", attempt + 1, max_retries + 1, e);
                delay = backoff_delay(config.retry_base_delay_ms, attempt);
                if let EgressError::RateLimitExceeded {
                    retry_after_secs: Some(secs),
                } = e
                {
                    delay = delay.max(Duration::from_secs(secs));
                }
            }
            Err(e) => return Err(e),
        }
    }

    Err(EgressError::Config(
        "Retry loop exited unexpectedly".to_string(),
    ))
}

/// Exponential backoff: base, 2*base, 4*base, ...
fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    Duration::from_millis(base_ms.saturating_mul(2u64.saturating_pow(attempt)))
}

/// Turn a non-success response into an error, reading the body for context
pub(crate) async fn error_for_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status.as_u16() == 429 {
        let retry_after_secs = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(crate::parse_retry_after);
        return Err(EgressError::RateLimitExceeded { retry_after_secs });
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unable to read error body".to_string());
    Err(EgressError::Provider {
        status_code: status.as_u16(),
        body,
    })
}
