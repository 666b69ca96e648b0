//! Builder for composing connectors with middleware layers.
//!
//! # Middleware Ordering Convention
//!
//! Middleware layers form an "onion" around the raw connector:
//!
//! ```text
//! Caller
//!     ↓
//! Retry (outermost - re-drives the whole stack on transient failures)
//!     ↓
//! CircuitBreaker (fails fast once the connector keeps failing)
//!     ↓
//! RateLimit (paces what actually reaches the wire)
//!     ↓
//! Raw Connector
//! ```
//!
//! ## Storage vs Application Order
//!
//! The `layers` vector stores middleware in **outermost-first** order, and
//! they are **applied in reverse** during `build()` to construct the
//! nesting: `layers[0](layers[1](...(raw)))`. [`StackManifest`] reports the
//! same outermost-first order.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tickd_core::connector::TickdConnector;
use tickd_core::middleware::{MiddlewareDescriptor, ValidationContext};
use tickd_core::{Middleware, TickdError};
use tickd_types::{CircuitBreakerConfig, RateLimitConfig, RetryConfig};

/// One layer of a composed connector, as reported for inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerManifest {
    /// Middleware name as reported by [`Middleware::name`].
    pub name: String,
    /// Depth in the onion: 0 is outermost (first to see a request).
    pub position: usize,
    /// Configuration snapshot from [`Middleware::config_json`].
    pub config: serde_json::Value,
}

/// Serializable description of a composed connector: the provider id and
/// its middleware layers, outermost first.
///
/// Derived from the builder's live [`MiddlewareDescriptor`]s, so it always
/// reflects what [`ConnectorBuilder::build`] would actually compose.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackManifest {
    /// Id of the raw connector at the center of the onion.
    pub provider: String,
    /// Middleware layers, outermost first.
    pub layers: Vec<LayerManifest>,
}

impl StackManifest {
    /// Layer names in onion order, outermost first.
    #[must_use]
    pub fn layer_names(&self) -> Vec<&str> {
        self.layers.iter().map(|l| l.name.as_str()).collect()
    }

    /// Whether a layer with the given middleware name is present.
    #[must_use]
    pub fn has_layer(&self, name: &str) -> bool {
        self.layers.iter().any(|l| l.name == name)
    }
}

/// Generic middleware builder for composing a connector with layered
/// wrappers.
///
/// The builder stores middleware descriptors (which track type information)
/// and validates dependencies before building the final stack.
pub struct ConnectorBuilder {
    raw: Arc<dyn TickdConnector>,
    /// Middleware layers in outermost-first order.
    layers: Vec<MiddlewareDescriptor>,
}

impl ConnectorBuilder {
    /// Create a new builder from a raw, unwrapped connector.
    #[must_use]
    pub fn new(raw: Arc<dyn TickdConnector>) -> Self {
        Self {
            raw,
            layers: Vec::new(),
        }
    }

    /// Reorder layers to satisfy the ordering policy:
    /// Retry (outermost) -> CircuitBreaker -> RateLimit -> others (stable
    /// among themselves).
    fn enforce_ordering(&mut self) {
        self.layers.sort_by_key(|d| match d.name() {
            "RetryConnector" => 0,
            "CircuitBreakerConnector" => 1,
            "RateLimitConnector" => 2,
            _ => 3,
        });
    }

    /// Add or replace the retry layer.
    #[must_use]
    pub fn with_retry(mut self, cfg: RetryConfig) -> Self {
        self.layers.retain(|d| d.name() != "RetryConnector");
        self.layers.push(MiddlewareDescriptor::new(
            crate::retry::RetryMiddleware::new(cfg),
        ));
        self.enforce_ordering();
        self
    }

    /// Add or replace the circuit breaker layer.
    #[must_use]
    pub fn with_circuit_breaker(mut self, cfg: CircuitBreakerConfig) -> Self {
        self.layers.retain(|d| d.name() != "CircuitBreakerConnector");
        self.layers.push(MiddlewareDescriptor::new(
            crate::breaker::CircuitBreakerMiddleware::new(cfg),
        ));
        self.enforce_ordering();
        self
    }

    /// Add or replace the rate limit layer.
    #[must_use]
    pub fn with_rate_limit(mut self, cfg: RateLimitConfig) -> Self {
        self.layers.retain(|d| d.name() != "RateLimitConnector");
        self.layers.push(MiddlewareDescriptor::new(
            crate::limiter::RateLimitMiddleware::new(cfg),
        ));
        self.enforce_ordering();
        self
    }

    /// Remove the retry layer if present.
    #[must_use]
    pub fn without_retry(mut self) -> Self {
        self.layers.retain(|d| d.name() != "RetryConnector");
        self
    }

    /// Remove the circuit breaker layer if present.
    #[must_use]
    pub fn without_circuit_breaker(mut self) -> Self {
        self.layers.retain(|d| d.name() != "CircuitBreakerConnector");
        self
    }

    /// Remove the rate limit layer if present.
    #[must_use]
    pub fn without_rate_limit(mut self) -> Self {
        self.layers.retain(|d| d.name() != "RateLimitConnector");
        self
    }

    /// Export the current middleware stack configuration for inspection.
    ///
    /// Returns a [`StackManifest`] built from the live descriptors,
    /// preserving the outermost-first ordering convention.
    #[must_use]
    pub fn to_stack(&self) -> StackManifest {
        StackManifest {
            provider: self.raw.id().to_string(),
            layers: self
                .layers
                .iter()
                .enumerate()
                .map(|(position, desc)| LayerManifest {
                    name: desc.name().to_string(),
                    position,
                    config: desc.middleware().config_json(),
                })
                .collect(),
        }
    }

    /// Validate the middleware stack without building.
    ///
    /// Calls `validate()` on each middleware, innermost to outermost, which
    /// matches the application order and allows middleware to check what is
    /// already "inside".
    ///
    /// # Errors
    /// Returns `TickdError::InvalidMiddlewareStack` if validation fails.
    pub fn validate(&self) -> Result<(), TickdError> {
        for (idx, desc) in self.layers.iter().enumerate().rev() {
            let ctx = ValidationContext::new(&self.layers, idx);
            desc.middleware().validate(&ctx)?;
        }
        Ok(())
    }

    /// Build the wrapped connector according to the captured stack.
    ///
    /// Applies middleware layers in reverse order (innermost to outermost)
    /// to construct the nesting, after validating the stack.
    ///
    /// # Errors
    /// Returns `TickdError::InvalidMiddlewareStack` if validation fails.
    pub fn build(self) -> Result<Arc<dyn TickdConnector>, TickdError> {
        self.validate()?;

        let mut acc: Arc<dyn TickdConnector> = Arc::clone(&self.raw);
        for desc in self.layers.into_iter().rev() {
            acc = desc.into_middleware().apply(acc);
        }
        Ok(acc)
    }

    /// Add an arbitrary middleware layer at the outermost position.
    ///
    /// The middleware type is tracked via `TypeId` to enable dependency
    /// checking and validation.
    #[must_use]
    pub fn layer<M: Middleware + 'static>(mut self, layer: M) -> Self {
        self.layers.insert(0, MiddlewareDescriptor::new(layer));
        self
    }
}
