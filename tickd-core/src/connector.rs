use async_trait::async_trait;
use chrono::NaiveDate;

use crate::TickdError;
use crate::normalize::EventIngress;
pub use tickd_types::ProviderKey;
use tickd_types::{
    DailyBar, RateLimitConfig, StreamingCapabilities, SubscriptionId, SymbolSubscription,
};

/// Focused role trait for connectors that emit live market data.
///
/// Adapters never propagate vendor exceptions into their dispatcher: every
/// failure is mapped to an error return here or to an in-band integrity
/// event through the [`EventIngress`] handed to [`connect`](Self::connect).
#[async_trait]
pub trait StreamingProvider: Send + Sync {
    /// Establish the vendor session and start emitting events through
    /// `ingress`. Idempotent: connecting an already-connected provider is a
    /// no-op.
    async fn connect(&self, ingress: EventIngress) -> Result<(), TickdError>;

    /// Tear the session down. Idempotent.
    async fn disconnect(&self) -> Result<(), TickdError>;

    /// Subscribe to L2 depth for a symbol.
    ///
    /// Returns a positive subscription id, or `-1` when the provider is
    /// currently unavailable — the caller remembers the intent and retries
    /// once the provider reconnects.
    async fn subscribe_market_depth(
        &self,
        sub: &SymbolSubscription,
    ) -> Result<SubscriptionId, TickdError>;

    /// Cancel a depth subscription by id.
    async fn unsubscribe_market_depth(&self, id: SubscriptionId) -> Result<(), TickdError>;

    /// Subscribe to trade prints for a symbol. Same id contract as
    /// [`subscribe_market_depth`](Self::subscribe_market_depth).
    async fn subscribe_trades(
        &self,
        sub: &SymbolSubscription,
    ) -> Result<SubscriptionId, TickdError>;

    /// Cancel a trade subscription by id.
    async fn unsubscribe_trades(&self, id: SubscriptionId) -> Result<(), TickdError>;
}

/// Focused role trait for connectors that provide historical daily bars.
#[async_trait]
pub trait HistoryProvider: Send + Sync {
    /// Fetch daily bars for `symbol`, ascending by session date and
    /// deduplicated. `from`/`to` are inclusive; `None` means the provider's
    /// full available range.
    async fn daily_bars(
        &self,
        symbol: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<DailyBar>, TickdError>;

    /// Fetch daily bars adjusted for corporate actions.
    ///
    /// Default: unsupported.
    async fn adjusted_daily_bars(
        &self,
        symbol: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<DailyBar>, TickdError> {
        let _ = (symbol, from, to);
        Err(TickdError::unsupported("adjusted-daily-bars"))
    }

    /// Cheap availability probe; `false` keeps the composite provider from
    /// dispatching here.
    async fn is_available(&self) -> bool {
        true
    }

    /// Outbound request limits the caller must respect.
    fn rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig::default()
    }
}

/// Main connector trait implemented by provider crates. Exposes capability
/// discovery.
pub trait TickdConnector: Send + Sync {
    /// A stable identifier used in failover rules and registry lookups
    /// (e.g., "tickd-stooq", "tickd-mock").
    fn id(&self) -> &'static str;

    /// Canonical provider key constructed from the static id.
    fn key(&self) -> ProviderKey {
        ProviderKey::new(self.id())
    }

    /// Human-friendly vendor string.
    fn display_name(&self) -> &'static str {
        "unknown"
    }

    /// Relative preference when several providers cover the same feed;
    /// lower is better.
    fn priority(&self) -> u32 {
        0
    }

    /// Streaming feature flags and limits this connector advertises.
    fn streaming_capabilities(&self) -> StreamingCapabilities {
        StreamingCapabilities::default()
    }

    /// Advertise streaming capability by returning a usable trait object
    /// reference when supported.
    fn as_streaming_provider(&self) -> Option<&dyn StreamingProvider> {
        None
    }

    /// Advertise history capability by returning a usable trait object
    /// reference when supported.
    fn as_history_provider(&self) -> Option<&dyn HistoryProvider> {
        None
    }
}

/// Generate `as_*_provider` accessors for a wrapper that implements
/// `TickdConnector` by delegating to an inner field.
#[macro_export]
macro_rules! delegate_connector_accessors {
    ($inner:ident) => {
        fn as_streaming_provider(&self) -> Option<&dyn $crate::connector::StreamingProvider> {
            if self.$inner.as_streaming_provider().is_some() {
                Some(self as &dyn $crate::connector::StreamingProvider)
            } else {
                None
            }
        }
        fn as_history_provider(&self) -> Option<&dyn $crate::connector::HistoryProvider> {
            if self.$inner.as_history_provider().is_some() {
                Some(self as &dyn $crate::connector::HistoryProvider)
            } else {
                None
            }
        }
    };
}

/// Generate both provider trait impls for a wrapper type `$self_ty`,
/// delegating to an inner field `$inner` and applying middleware hooks.
#[macro_export]
macro_rules! delegate_provider_impls {
    ($self_ty:ty, $inner:ident) => {
        #[async_trait::async_trait]
        impl $crate::connector::StreamingProvider for $self_ty {
            async fn connect(
                &self,
                ingress: $crate::normalize::EventIngress,
            ) -> Result<(), $crate::TickdError> {
                let ctx = $crate::middleware::CallContext::new(
                    tickd_types::Capability::Connect,
                    self.$inner.id(),
                );
                <Self as $crate::Middleware>::pre_call(self, &ctx).await?;
                let inner = self
                    .$inner
                    .as_streaming_provider()
                    .ok_or_else(|| $crate::TickdError::unsupported("connect"))?;
                inner
                    .connect(ingress)
                    .await
                    .map_err(|e| <Self as $crate::Middleware>::map_error(self, e, &ctx))
            }

            async fn disconnect(&self) -> Result<(), $crate::TickdError> {
                let inner = self
                    .$inner
                    .as_streaming_provider()
                    .ok_or_else(|| $crate::TickdError::unsupported("connect"))?;
                inner.disconnect().await
            }

            async fn subscribe_market_depth(
                &self,
                sub: &tickd_types::SymbolSubscription,
            ) -> Result<tickd_types::SubscriptionId, $crate::TickdError> {
                let ctx = $crate::middleware::CallContext::new(
                    tickd_types::Capability::StreamDepth,
                    self.$inner.id(),
                );
                <Self as $crate::Middleware>::pre_call(self, &ctx).await?;
                let inner = self
                    .$inner
                    .as_streaming_provider()
                    .ok_or_else(|| $crate::TickdError::unsupported("stream-depth"))?;
                inner
                    .subscribe_market_depth(sub)
                    .await
                    .map_err(|e| <Self as $crate::Middleware>::map_error(self, e, &ctx))
            }

            async fn unsubscribe_market_depth(
                &self,
                id: tickd_types::SubscriptionId,
            ) -> Result<(), $crate::TickdError> {
                let inner = self
                    .$inner
                    .as_streaming_provider()
                    .ok_or_else(|| $crate::TickdError::unsupported("stream-depth"))?;
                inner.unsubscribe_market_depth(id).await
            }

            async fn subscribe_trades(
                &self,
                sub: &tickd_types::SymbolSubscription,
            ) -> Result<tickd_types::SubscriptionId, $crate::TickdError> {
                let ctx = $crate::middleware::CallContext::new(
                    tickd_types::Capability::StreamTrades,
                    self.$inner.id(),
                );
                <Self as $crate::Middleware>::pre_call(self, &ctx).await?;
                let inner = self
                    .$inner
                    .as_streaming_provider()
                    .ok_or_else(|| $crate::TickdError::unsupported("stream-trades"))?;
                inner
                    .subscribe_trades(sub)
                    .await
                    .map_err(|e| <Self as $crate::Middleware>::map_error(self, e, &ctx))
            }

            async fn unsubscribe_trades(
                &self,
                id: tickd_types::SubscriptionId,
            ) -> Result<(), $crate::TickdError> {
                let inner = self
                    .$inner
                    .as_streaming_provider()
                    .ok_or_else(|| $crate::TickdError::unsupported("stream-trades"))?;
                inner.unsubscribe_trades(id).await
            }
        }

        #[async_trait::async_trait]
        impl $crate::connector::HistoryProvider for $self_ty {
            async fn daily_bars(
                &self,
                symbol: &str,
                from: Option<chrono::NaiveDate>,
                to: Option<chrono::NaiveDate>,
            ) -> Result<Vec<tickd_types::DailyBar>, $crate::TickdError> {
                let ctx = $crate::middleware::CallContext::new(
                    tickd_types::Capability::DailyBars,
                    self.$inner.id(),
                );
                <Self as $crate::Middleware>::pre_call(self, &ctx).await?;
                let inner = self
                    .$inner
                    .as_history_provider()
                    .ok_or_else(|| $crate::TickdError::unsupported("daily-bars"))?;
                inner
                    .daily_bars(symbol, from, to)
                    .await
                    .map_err(|e| <Self as $crate::Middleware>::map_error(self, e, &ctx))
            }

            async fn adjusted_daily_bars(
                &self,
                symbol: &str,
                from: Option<chrono::NaiveDate>,
                to: Option<chrono::NaiveDate>,
            ) -> Result<Vec<tickd_types::DailyBar>, $crate::TickdError> {
                let ctx = $crate::middleware::CallContext::new(
                    tickd_types::Capability::AdjustedDailyBars,
                    self.$inner.id(),
                );
                <Self as $crate::Middleware>::pre_call(self, &ctx).await?;
                let inner = self
                    .$inner
                    .as_history_provider()
                    .ok_or_else(|| $crate::TickdError::unsupported("adjusted-daily-bars"))?;
                inner
                    .adjusted_daily_bars(symbol, from, to)
                    .await
                    .map_err(|e| <Self as $crate::Middleware>::map_error(self, e, &ctx))
            }

            async fn is_available(&self) -> bool {
                match self.$inner.as_history_provider() {
                    Some(inner) => inner.is_available().await,
                    None => false,
                }
            }

            fn rate_limit(&self) -> tickd_types::RateLimitConfig {
                self.$inner
                    .as_history_provider()
                    .map_or_else(tickd_types::RateLimitConfig::default, |inner| {
                        inner.rate_limit()
                    })
            }
        }
    };
}
