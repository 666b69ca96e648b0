//! Circuit breaker connector wrapper.
//!
//! Three states: Closed (normal), Open (calls fail fast), HalfOpen (a
//! single probe call is admitted; its outcome closes or re-opens the
//! breaker).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::NaiveDate;
use tickd_core::connector::{HistoryProvider, StreamingProvider, TickdConnector};
use tickd_core::normalize::EventIngress;
use tickd_core::{Middleware, TickdError, delegate_connector_accessors};
use tickd_types::{CircuitBreakerConfig, DailyBar, SubscriptionId, SymbolSubscription};

const STATE_CLOSED: u8 = 0;
const STATE_OPEN: u8 = 1;
const STATE_HALF_OPEN: u8 = 2;

/// Wrapper that fails fast once its inner connector keeps failing.
pub struct CircuitBreakerConnector {
    inner: Arc<dyn TickdConnector>,
    config: CircuitBreakerConfig,
    state: AtomicU8,
    failure_count: AtomicU32,
    opened_at_ms: AtomicU64,
    probe_in_flight: AtomicBool,
}

impl CircuitBreakerConnector {
    /// Create a new breaker around an existing connector.
    #[must_use]
    pub fn new(inner: Arc<dyn TickdConnector>, config: CircuitBreakerConfig) -> Self {
        Self {
            inner,
            config,
            state: AtomicU8::new(STATE_CLOSED),
            failure_count: AtomicU32::new(0),
            opened_at_ms: AtomicU64::new(0),
            probe_in_flight: AtomicBool::new(false),
        }
    }

    fn now_ms() -> u64 {
        u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
    }

    fn current_state(&self) -> u8 {
        let state = self.state.load(Ordering::Acquire);
        if state == STATE_OPEN {
            let elapsed = Self::now_ms().saturating_sub(self.opened_at_ms.load(Ordering::Acquire));
            let break_ms =
                u64::try_from(self.config.break_duration.as_millis()).unwrap_or(u64::MAX);
            if elapsed >= break_ms {
                self.state.store(STATE_HALF_OPEN, Ordering::Release);
                return STATE_HALF_OPEN;
            }
        }
        state
    }

    /// Human-readable state, for logs and tests.
    #[must_use]
    pub fn state_name(&self) -> &'static str {
        match self.current_state() {
            STATE_OPEN => "open",
            STATE_HALF_OPEN => "half_open",
            _ => "closed",
        }
    }

    /// Gate a call. `Err(CircuitOpen)` when the breaker is open or a probe
    /// is already in flight.
    fn admit(&self) -> Result<(), TickdError> {
        match self.current_state() {
            STATE_CLOSED => Ok(()),
            STATE_HALF_OPEN => {
                if self
                    .probe_in_flight
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    Ok(())
                } else {
                    Err(self.open_error())
                }
            }
            _ => Err(self.open_error()),
        }
    }

    fn open_error(&self) -> TickdError {
        let elapsed = Self::now_ms().saturating_sub(self.opened_at_ms.load(Ordering::Acquire));
        let break_ms = u64::try_from(self.config.break_duration.as_millis()).unwrap_or(u64::MAX);
        TickdError::CircuitOpen {
            provider: self.inner.id().to_string(),
            reset_in_ms: break_ms.saturating_sub(elapsed).max(1),
        }
    }

    fn record_success(&self) {
        self.failure_count.store(0, Ordering::Release);
        self.state.store(STATE_CLOSED, Ordering::Release);
        self.probe_in_flight.store(false, Ordering::Release);
    }

    fn record_failure(&self) {
        let was_half_open = self.state.load(Ordering::Acquire) == STATE_HALF_OPEN;
        let failures = self.failure_count.fetch_add(1, Ordering::AcqRel) + 1;
        if was_half_open || failures >= self.config.failure_threshold {
            self.state.store(STATE_OPEN, Ordering::Release);
            self.opened_at_ms.store(Self::now_ms(), Ordering::Release);
        }
        self.probe_in_flight.store(false, Ordering::Release);
    }

    async fn guard<T, F>(&self, fut: F) -> Result<T, TickdError>
    where
        F: core::future::Future<Output = Result<T, TickdError>> + Send,
    {
        self.admit()?;
        match fut.await {
            Ok(v) => {
                self.record_success();
                Ok(v)
            }
            Err(e) => {
                self.record_failure();
                Err(e)
            }
        }
    }
}

impl TickdConnector for CircuitBreakerConnector {
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
impl StreamingProvider for CircuitBreakerConnector {
    async fn connect(&self, ingress: EventIngress) -> Result<(), TickdError> {
        let inner = self
            .inner
            .as_streaming_provider()
            .ok_or_else(|| TickdError::unsupported("connect"))?;
        self.guard(inner.connect(ingress)).await
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
        let inner = self
            .inner
            .as_streaming_provider()
            .ok_or_else(|| TickdError::unsupported("stream-depth"))?;
        self.guard(inner.subscribe_market_depth(sub)).await
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
        self.guard(inner.subscribe_trades(sub)).await
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
impl HistoryProvider for CircuitBreakerConnector {
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
        self.guard(inner.daily_bars(symbol, from, to)).await
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
        self.guard(inner.adjusted_daily_bars(symbol, from, to)).await
    }

    async fn is_available(&self) -> bool {
        if self.current_state() == STATE_OPEN {
            return false;
        }
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
impl Middleware for CircuitBreakerConnector {
    fn apply(self: Box<Self>, _inner: Arc<dyn TickdConnector>) -> Arc<dyn TickdConnector> {
        unreachable!("CircuitBreakerConnector is already applied")
    }

    fn name(&self) -> &'static str {
        "CircuitBreakerConnector"
    }

    fn config_json(&self) -> serde_json::Value {
        serde_json::json!({
            "failure_threshold": self.config.failure_threshold,
            "break_duration_ms":
                u64::try_from(self.config.break_duration.as_millis()).unwrap_or(u64::MAX),
        })
    }
}

/// Middleware config for constructing a [`CircuitBreakerConnector`].
pub struct CircuitBreakerMiddleware {
    /// Thresholds and timing.
    pub config: CircuitBreakerConfig,
}

impl CircuitBreakerMiddleware {
    /// Wrap connectors with the given breaker configuration.
    #[must_use]
    pub const fn new(config: CircuitBreakerConfig) -> Self {
        Self { config }
    }

    /// Conventional defaults (5 failures, 30 s break).
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            config: CircuitBreakerConfig::default(),
        }
    }
}

impl Middleware for CircuitBreakerMiddleware {
    fn apply(self: Box<Self>, inner: Arc<dyn TickdConnector>) -> Arc<dyn TickdConnector> {
        Arc::new(CircuitBreakerConnector::new(inner, self.config))
    }

    fn name(&self) -> &'static str {
        "CircuitBreakerConnector"
    }

    fn config_json(&self) -> serde_json::Value {
        serde_json::json!({
            "failure_threshold": self.config.failure_threshold,
            "break_duration_ms":
                u64::try_from(self.config.break_duration.as_millis()).unwrap_or(u64::MAX),
        })
    }
}
