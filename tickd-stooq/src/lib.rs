//! Stooq connector: free end-of-day OHLCV history over plain CSV
//! downloads. History capability only; stooq has no streaming feed.
#![warn(missing_docs)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tickd_core::connector::{HistoryProvider, TickdConnector};
use tickd_core::registry::{Plugin, RegistryBuilder};
use tickd_core::TickdError;
use tickd_types::{DailyBar, RateLimitConfig, canonicalize_symbol};

pub mod adapter;
mod builder;

pub use builder::StooqBuilder;

/// Stooq historical connector.
pub struct StooqConnector {
    pub(crate) base_url: String,
    pub(crate) client: reqwest::Client,
    pub(crate) request_timeout: Duration,
    pub(crate) rate_limit: RateLimitConfig,
}

impl StooqConnector {
    /// Connector with production defaults.
    #[must_use]
    pub fn new() -> Self {
        StooqBuilder::new().build()
    }

    /// Start building a customized connector.
    #[must_use]
    pub fn builder() -> StooqBuilder {
        StooqBuilder::new()
    }
}

impl Default for StooqConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl TickdConnector for StooqConnector {
    fn id(&self) -> &'static str {
        "tickd-stooq"
    }

    fn display_name(&self) -> &'static str {
        "Stooq"
    }

    fn as_history_provider(&self) -> Option<&dyn HistoryProvider> {
        Some(self as &dyn HistoryProvider)
    }
}

#[async_trait]
impl HistoryProvider for StooqConnector {
    async fn daily_bars(
        &self,
        symbol: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<DailyBar>, TickdError> {
        let canonical = canonicalize_symbol(symbol);
        if canonical.is_empty() {
            return Err(TickdError::InvalidArg("empty symbol".to_string()));
        }
        adapter::fetch_daily_csv(
            &self.client,
            &self.base_url,
            &canonical,
            from,
            to,
            self.request_timeout,
        )
        .await
    }

    async fn is_available(&self) -> bool {
        // A HEAD against the site root is the cheapest liveness signal
        // stooq offers.
        self.client
            .head(&self.base_url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    fn rate_limit(&self) -> RateLimitConfig {
        self.rate_limit.clone()
    }
}

/// Plugin wiring the stooq connector into a provider registry. Stooq needs
/// no credentials; the plugin only declares its HTTP client requirement.
pub struct StooqPlugin;

impl Plugin for StooqPlugin {
    fn plugin_id(&self) -> &'static str {
        "tickd-stooq"
    }

    fn display_name(&self) -> &'static str {
        "Stooq end-of-day data"
    }

    fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    fn register(&self, registry: &mut RegistryBuilder) -> Result<(), TickdError> {
        registry.require_http_client("stooq");
        registry.add_provider(Arc::new(StooqConnector::new()))
    }
}
