//! Composite historical provider: ordered fan-out with fallback.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use tickd_core::connector::{HistoryProvider, TickdConnector};
use tickd_core::pipeline::EventPipeline;
use tickd_core::TickdError;
use tickd_types::{DailyBar, Event, IntegrityKind};

/// Canonical-symbol lookup consulted once before dispatch.
pub trait SymbolResolver: Send + Sync {
    /// Resolve a raw symbol to the canonical form providers expect, or
    /// `None` to pass the input through unchanged.
    fn resolve(&self, raw: &str) -> Option<String>;
}

/// Resolver that trims and uppercases, the canonical form every bundled
/// provider accepts.
pub struct CanonicalResolver;

impl SymbolResolver for CanonicalResolver {
    fn resolve(&self, raw: &str) -> Option<String> {
        Some(tickd_types::canonicalize_symbol(raw))
    }
}

/// Cross-validation settings: closes of the two highest-priority providers
/// are compared; divergence beyond the tolerance emits an integrity event
/// but the primary data is returned.
#[derive(Debug, Clone, Copy)]
pub struct CrossValidation {
    /// Allowed relative divergence in basis points.
    pub tolerance_bps: u32,
}

/// Wraps an ordered list of historical providers. The highest-priority
/// provider is tried first; an empty result or error moves to the next; a
/// successful fetch short-circuits.
pub struct CompositeHistoryProvider {
    providers: Vec<Arc<dyn TickdConnector>>,
    resolver: Option<Box<dyn SymbolResolver>>,
    cross_validation: Option<CrossValidation>,
    pipeline: Option<EventPipeline>,
}

impl CompositeHistoryProvider {
    /// Composite over history-capable connectors, sorted by
    /// [`TickdConnector::priority`] (stable for equal priorities).
    #[must_use]
    pub fn over(mut providers: Vec<Arc<dyn TickdConnector>>) -> Self {
        providers.retain(|p| p.as_history_provider().is_some());
        providers.sort_by_key(|p| p.priority());
        Self {
            providers,
            resolver: None,
            cross_validation: None,
            pipeline: None,
        }
    }

    /// Attach a symbol resolver.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Box<dyn SymbolResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Enable cross-validation against the next backing provider.
    #[must_use]
    pub const fn with_cross_validation(mut self, cv: CrossValidation) -> Self {
        self.cross_validation = Some(cv);
        self
    }

    /// Attach a pipeline for in-band integrity events.
    #[must_use]
    pub fn with_pipeline(mut self, pipeline: EventPipeline) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Number of backing providers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether no backing providers are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    async fn emit_integrity(&self, symbol: &str, condition: IntegrityKind, detail: String) {
        if let Some(pipeline) = &self.pipeline {
            let _ = pipeline
                .publish(Event::integrity("composite", symbol, condition, detail, 0))
                .await;
        }
    }

    async fn cross_validate(
        &self,
        symbol: &str,
        primary_idx: usize,
        primary: &[DailyBar],
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        cv: CrossValidation,
    ) {
        let Some(secondary) = self.providers.get(primary_idx + 1) else {
            return;
        };
        let Some(history) = secondary.as_history_provider() else {
            return;
        };
        let Ok(reference) = history.daily_bars(symbol, from, to).await else {
            return;
        };

        let tolerance = Decimal::from(cv.tolerance_bps) / Decimal::from(10_000);
        for bar in primary {
            let Some(other) = reference.iter().find(|b| b.session == bar.session) else {
                continue;
            };
            if other.close.is_zero() {
                continue;
            }
            let divergence = ((bar.close - other.close) / other.close).abs();
            if divergence > tolerance {
                self.emit_integrity(
                    symbol,
                    IntegrityKind::CrossValidation,
                    format!(
                        "{symbol} {} close diverges: {} vs {} ({})",
                        bar.session,
                        bar.close,
                        other.close,
                        secondary.id()
                    ),
                )
                .await;
                return;
            }
        }
    }
}

impl TickdConnector for CompositeHistoryProvider {
    fn id(&self) -> &'static str {
        "composite"
    }

    fn display_name(&self) -> &'static str {
        "Composite"
    }

    fn as_history_provider(&self) -> Option<&dyn HistoryProvider> {
        Some(self as &dyn HistoryProvider)
    }
}

#[async_trait]
impl HistoryProvider for CompositeHistoryProvider {
    async fn daily_bars(
        &self,
        symbol: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<DailyBar>, TickdError> {
        let resolved = self
            .resolver
            .as_ref()
            .and_then(|r| r.resolve(symbol))
            .unwrap_or_else(|| symbol.to_string());

        let mut errors: Vec<TickdError> = Vec::new();
        for (idx, provider) in self.providers.iter().enumerate() {
            let history = provider
                .as_history_provider()
                .expect("filtered at construction");
            if !history.is_available().await {
                continue;
            }
            match history.daily_bars(&resolved, from, to).await {
                Ok(bars) if bars.is_empty() => {
                    errors.push(TickdError::not_found(format!(
                        "daily bars for {resolved} via {}",
                        provider.id()
                    )));
                }
                Ok(bars) => {
                    if let Some(cv) = self.cross_validation {
                        self.cross_validate(&resolved, idx, &bars, from, to, cv)
                            .await;
                    }
                    return Ok(bars);
                }
                Err(e) => errors.push(e),
            }
        }

        if errors.is_empty() {
            return Err(TickdError::unsupported("daily-bars"));
        }
        if errors
            .iter()
            .all(|e| matches!(e, TickdError::NotFound { .. }))
        {
            return Err(TickdError::not_found(format!("daily bars for {resolved}")));
        }
        Err(TickdError::AllProvidersFailed(errors))
    }

    async fn is_available(&self) -> bool {
        for provider in &self.providers {
            if let Some(history) = provider.as_history_provider()
                && history.is_available().await
            {
                return true;
            }
        }
        false
    }
}
