//! Token-bucket rate limiting connector wrapper.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tickd_core::connector::TickdConnector;
use tickd_core::middleware::CallContext;
use tickd_core::{Middleware, TickdError, delegate_connector_accessors, delegate_provider_impls};
use tickd_types::RateLimitConfig;

struct LimiterRuntime {
    calls_in_window: u64,
    window_start: Instant,
    last_request: Option<Instant>,
}

/// Wrapper that paces outbound calls: at most `max_requests` per sliding
/// window, never two requests closer than `min_delay`.
///
/// [`acquire`](Self::acquire) blocks until a slot is available; dropping
/// the future cancels the wait.
pub struct RateLimitConnector {
    inner: Arc<dyn TickdConnector>,
    config: RateLimitConfig,
    runtime: Mutex<LimiterRuntime>,
}

impl RateLimitConnector {
    /// Create a new rate-limited wrapper around an existing connector.
    #[must_use]
    pub fn new(inner: Arc<dyn TickdConnector>, config: RateLimitConfig) -> Self {
        Self {
            inner,
            config,
            runtime: Mutex::new(LimiterRuntime {
                calls_in_window: 0,
                window_start: Instant::now(),
                last_request: None,
            }),
        }
    }

    /// Access the inner connector.
    #[must_use]
    pub fn inner(&self) -> &Arc<dyn TickdConnector> {
        &self.inner
    }

    /// Time to wait before the next slot, or `None` when one was taken.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    fn try_acquire(&self) -> Option<Duration> {
        let mut rt = self.runtime.lock().expect("mutex poisoned");
        let now = Instant::now();

        if now.duration_since(rt.window_start) >= self.config.window {
            rt.calls_in_window = 0;
            rt.window_start = now;
        }

        if let Some(last) = rt.last_request {
            let since = now.duration_since(last);
            if since < self.config.min_delay {
                return Some(self.config.min_delay - since);
            }
        }

        if rt.calls_in_window >= self.config.max_requests {
            let elapsed = now.duration_since(rt.window_start);
            return Some(self.config.window.saturating_sub(elapsed));
        }

        rt.calls_in_window += 1;
        rt.last_request = Some(now);
        None
    }

    /// Wait until a request slot is available and take it.
    pub async fn acquire(&self) {
        loop {
            match self.try_acquire() {
                None => return,
                Some(wait) => tokio::time::sleep(wait.max(Duration::from_millis(1))).await,
            }
        }
    }
}

impl TickdConnector for RateLimitConnector {
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
impl Middleware for RateLimitConnector {
    fn apply(self: Box<Self>, _inner: Arc<dyn TickdConnector>) -> Arc<dyn TickdConnector> {
        unreachable!("RateLimitConnector is already applied")
    }

    fn name(&self) -> &'static str {
        "RateLimitConnector"
    }

    fn config_json(&self) -> serde_json::Value {
        serde_json::json!({
            "max_requests": self.config.max_requests,
            "window_ms": u64::try_from(self.config.window.as_millis()).unwrap_or(u64::MAX),
            "min_delay_ms": u64::try_from(self.config.min_delay.as_millis()).unwrap_or(u64::MAX),
        })
    }

    async fn pre_call(&self, _ctx: &CallContext) -> Result<(), TickdError> {
        self.acquire().await;
        Ok(())
    }
}

delegate_provider_impls!(RateLimitConnector, inner);

/// Middleware config for constructing a [`RateLimitConnector`].
pub struct RateLimitMiddleware {
    /// Pacing configuration.
    pub config: RateLimitConfig,
}

impl RateLimitMiddleware {
    /// Wrap connectors with the given pacing configuration.
    #[must_use]
    pub const fn new(config: RateLimitConfig) -> Self {
        Self { config }
    }
}

impl Middleware for RateLimitMiddleware {
    fn apply(self: Box<Self>, inner: Arc<dyn TickdConnector>) -> Arc<dyn TickdConnector> {
        Arc::new(RateLimitConnector::new(inner, self.config))
    }

    fn name(&self) -> &'static str {
        "RateLimitConnector"
    }

    fn config_json(&self) -> serde_json::Value {
        serde_json::json!({
            "max_requests": self.config.max_requests,
            "window_ms": u64::try_from(self.config.window.as_millis()).unwrap_or(u64::MAX),
            "min_delay_ms": u64::try_from(self.config.min_delay.as_millis()).unwrap_or(u64::MAX),
        })
    }
}
