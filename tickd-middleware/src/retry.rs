//! Retry connector wrapper: bounded exponential backoff on transient
//! failures.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tickd_core::connector::{HistoryProvider, StreamingProvider, TickdConnector};
use tickd_core::normalize::EventIngress;
use tickd_core::session::jitter_wait;
use tickd_core::{Middleware, TickdError, delegate_connector_accessors};
use tickd_types::{DailyBar, RetryConfig, SubscriptionId, SymbolSubscription};

/// Wrapper that retries transient failures of its inner connector.
///
/// Only errors classified transient by [`TickdError::is_transient`] are
/// retried (network faults, 5xx, 429, timeouts). A provider-supplied
/// Retry-After hint overrides the computed backoff for that attempt.
pub struct RetryConnector {
    inner: Arc<dyn TickdConnector>,
    config: RetryConfig,
}

impl RetryConnector {
    /// Create a retrying wrapper around an existing connector.
    #[must_use]
    pub const fn new(inner: Arc<dyn TickdConnector>, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    fn delay_for_attempt(&self, attempt: u32, err: &TickdError) -> Duration {
        if let TickdError::RateLimited {
            retry_after_ms: Some(ms),
            ..
        } = err
        {
            return Duration::from_millis(*ms);
        }
        let b = &self.config.backoff;
        let factor = u64::from(b.factor.max(1));
        let mut delay = b.min_backoff_ms;
        for _ in 0..attempt.min(16) {
            delay = delay.saturating_mul(factor);
            if delay >= b.max_backoff_ms {
                break;
            }
        }
        Duration::from_millis(jitter_wait(
            delay.min(b.max_backoff_ms),
            u32::from(b.jitter_percent),
        ))
    }

    async fn with_retries<T, F, Fut>(&self, mut call: F) -> Result<T, TickdError>
    where
        F: FnMut() -> Fut + Send,
        Fut: core::future::Future<Output = Result<T, TickdError>> + Send,
    {
        let mut attempt = 0u32;
        loop {
            match call().await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_transient() && attempt + 1 < self.config.max_attempts => {
                    let delay = self.delay_for_attempt(attempt, &e);
                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        provider = self.inner.id(),
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "retrying transient provider failure"
                    );
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl TickdConnector for RetryConnector {
    fn id(&self) -> &'static str {
        self.inner.id()
    }

    fn display_name(&self) -> &'static str {
        self.inner.display_name()
    }

    fn priority(&self) -> u32 {
        self.inner.priority()
    }

    fn streaming_capabilities(&self) -> tickd_types::StreamingCapabilities {
        self.inner.streaming_capabilities()
    }

    delegate_connector_accessors!(inner);
}

#[async_trait]
impl StreamingProvider for RetryConnector {
    async fn connect(&self, ingress: EventIngress) -> Result<(), TickdError> {
        let inner = self
            .inner
            .as_streaming_provider()
            .ok_or_else(|| TickdError::unsupported("connect"))?;
        self.with_retries(|| inner.connect(ingress.clone())).await
    }

    async fn disconnect(&self) -> Result<(), TickdError> {
        let inner = self
            .inner
            .as_streaming_provider()
            .ok_or_else(|| TickdError::unsupported("connect"))?;
        inner.disconnect().await
    }

    async fn subscribe_market_depth(
        &self,
        sub: &SymbolSubscription,
    ) -> Result<SubscriptionId, TickdError> {
        // Subscription retries are the coordinator's job: a vendor error is
        // remembered as a pending id and re-attempted on reconciliation.
        let inner = self
            .inner
            .as_streaming_provider()
            .ok_or_else(|| TickdError::unsupported("stream-depth"))?;
        inner.subscribe_market_depth(sub).await
    }

    async fn unsubscribe_market_depth(&self, id: SubscriptionId) -> Result<(), TickdError> {
        let inner = self
            .inner
            .as_streaming_provider()
            .ok_or_else(|| TickdError::unsupported("stream-depth"))?;
        inner.unsubscribe_market_depth(id).await
    }

    async fn subscribe_trades(
        &self,
        sub: &SymbolSubscription,
    ) -> Result<SubscriptionId, TickdError> {
        let inner = self
            .inner
            .as_streaming_provider()
            .ok_or_else(|| TickdError::unsupported("stream-trades"))?;
        inner.subscribe_trades(sub).await
    }

    async fn unsubscribe_trades(&self, id: SubscriptionId) -> Result<(), TickdError> {
        let inner = self
            .inner
            .as_streaming_provider()
            .ok_or_else(|| TickdError::unsupported("stream-trades"))?;
        inner.unsubscribe_trades(id).await
    }
}

#[async_trait]
impl HistoryProvider for RetryConnector {
    async fn daily_bars(
        &self,
        symbol: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<DailyBar>, TickdError> {
        let inner = self
            .inner
            .as_history_provider()
            .ok_or_else(|| TickdError::unsupported("daily-bars"))?;
        self.with_retries(|| inner.daily_bars(symbol, from, to)).await
    }

    async fn adjusted_daily_bars(
        &self,
        symbol: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<DailyBar>, TickdError> {
        let inner = self
            .inner
            .as_history_provider()
            .ok_or_else(|| TickdError::unsupported("adjusted-daily-bars"))?;
        self.with_retries(|| inner.adjusted_daily_bars(symbol, from, to))
            .await
    }

    async fn is_available(&self) -> bool {
        match self.inner.as_history_provider() {
            Some(inner) => inner.is_available().await,
            None => false,
        }
    }

    fn rate_limit(&self) -> tickd_types::RateLimitConfig {
        self.inner
            .as_history_provider()
            .map_or_else(tickd_types::RateLimitConfig::default, |inner| {
                inner.rate_limit()
            })
    }
}

#[async_trait]
impl Middleware for RetryConnector {
    fn apply(self: Box<Self>, _inner: Arc<dyn TickdConnector>) -> Arc<dyn TickdConnector> {
        unreachable!("RetryConnector is already applied")
    }

    fn name(&self) -> &'static str {
        "RetryConnector"
    }

    fn config_json(&self) -> serde_json::Value {
        serde_json::json!({
            "max_attempts": self.config.max_attempts,
            "min_backoff_ms": self.config.backoff.min_backoff_ms,
            "max_backoff_ms": self.config.backoff.max_backoff_ms,
        })
    }
}

/// Middleware config for constructing a [`RetryConnector`].
pub struct RetryMiddleware {
    /// Attempt budget and backoff schedule.
    pub config: RetryConfig,
}

impl RetryMiddleware {
    /// Wrap connectors with the given retry configuration.
    #[must_use]
    pub const fn new(config: RetryConfig) -> Self {
        Self { config }
    }
}

impl Middleware for RetryMiddleware {
    fn apply(self: Box<Self>, inner: Arc<dyn TickdConnector>) -> Arc<dyn TickdConnector> {
        Arc::new(RetryConnector::new(inner, self.config))
    }

    fn name(&self) -> &'static str {
        "RetryConnector"
    }

    fn config_json(&self) -> serde_json::Value {
        serde_json::json!({
            "max_attempts": self.config.max_attempts,
            "min_backoff_ms": self.config.backoff.min_backoff_ms,
            "max_backoff_ms": self.config.backoff.max_backoff_ms,
        })
    }
}
