//! Builder for the stooq connector.

use std::time::Duration;

use tickd_types::RateLimitConfig;

use crate::StooqConnector;
use crate::adapter::DEFAULT_BASE_URL;

/// Builder for [`StooqConnector`]. The base URL override exists so tests
/// can point the connector at a local mock server.
pub struct StooqBuilder {
    base_url: String,
    client: Option<reqwest::Client>,
    request_timeout: Duration,
    rate_limit: RateLimitConfig,
}

impl Default for StooqBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StooqBuilder {
    /// Builder with production defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            client: None,
            request_timeout: Duration::from_secs(15),
            rate_limit: RateLimitConfig {
                max_requests: 60,
                window: Duration::from_secs(60),
                min_delay: Duration::from_millis(100),
            },
        }
    }

    /// Override the download endpoint (tests).
    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Use a pre-built HTTP client (shared pools, proxies).
    #[must_use]
    pub fn client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Per-request timeout.
    #[must_use]
    pub const fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Declared pacing for callers.
    #[must_use]
    pub fn rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    /// Build the connector.
    #[must_use]
    pub fn build(self) -> StooqConnector {
        StooqConnector {
            base_url: self.base_url,
            client: self.client.unwrap_or_default(),
            request_timeout: self.request_timeout,
            rate_limit: self.rate_limit,
        }
    }
}
