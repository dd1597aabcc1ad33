//! Service configuration passed at construction.
//!
//! Configuration is an explicit value handed to [`Publisher`] and
//! [`Subscriber`] constructors and is immutable for the lifetime of the
//! session object. There is no process-wide account state.
//!
//! [`Publisher`]: crate::Publisher
//! [`Subscriber`]: crate::Subscriber

use std::time::Duration;

use url::Url;
use uuid::Uuid;

use crate::retry;

/// Timeout applied to each Topic Authority request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Immutable configuration for one publisher or subscriber.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Base URL of the Topic Authority endpoint.
    pub base_url: Url,
    /// Access token sent as `x-api-key` on bootstrap requests.
    pub access_token: String,
    /// Device identifier sent as `device_id` on bootstrap requests.
    pub device_identifier: Uuid,
    /// Value of the `User-Agent` header on bootstrap requests.
    pub user_agent: String,
    /// Maximum retryable failures before a failure becomes terminal.
    pub max_retries: u32,
    /// Fixed delay between retry attempts.
    pub retry_delay: Duration,
}

impl ServiceConfig {
    /// Creates a configuration with default device identifier, user agent,
    /// and retry parameters.
    pub fn new(base_url: Url, access_token: impl Into<String>) -> Self {
        Self {
            base_url,
            access_token: access_token.into(),
            device_identifier: Uuid::new_v4(),
            user_agent: default_user_agent(),
            max_retries: retry::DEFAULT_MAX_RETRIES,
            retry_delay: retry::DEFAULT_RETRY_DELAY,
        }
    }

    /// Overrides the generated device identifier.
    pub fn with_device_identifier(mut self, device_identifier: Uuid) -> Self {
        self.device_identifier = device_identifier;
        self
    }

    /// Overrides the default `User-Agent` header value.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Overrides the retry bound and delay shared by bootstrap and
    /// reconnect paths.
    pub fn with_retry(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }

    /// Whether an access token is present at all.
    pub(crate) fn is_authenticated(&self) -> bool {
        !self.access_token.trim().is_empty()
    }
}

fn default_user_agent() -> String {
    format!(
        "{}/{} ({} {})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_url() -> Url {
        "https://tracking.example.com/".parse().unwrap()
    }

    #[test]
    fn defaults_are_populated() {
        let config = ServiceConfig::new(base_url(), "token");
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay, Duration::from_secs(5));
        assert!(config.user_agent.starts_with("livetrack/"));
        assert!(config.is_authenticated());
    }

    #[test]
    fn blank_token_is_not_authenticated() {
        assert!(!ServiceConfig::new(base_url(), "").is_authenticated());
        assert!(!ServiceConfig::new(base_url(), "   ").is_authenticated());
    }

    #[test]
    fn builders_override_defaults() {
        let id = Uuid::new_v4();
        let config = ServiceConfig::new(base_url(), "token")
            .with_device_identifier(id)
            .with_user_agent("app/1.0")
            .with_retry(5, Duration::from_millis(100));
        assert_eq!(config.device_identifier, id);
        assert_eq!(config.user_agent, "app/1.0");
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.retry_delay, Duration::from_millis(100));
    }
}
