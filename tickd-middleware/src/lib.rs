//! Resilience middleware wrappers for tickd connectors.
//!
//! - [`retry`]: exponential-backoff retry on transient failures.
//! - [`breaker`]: circuit breaker gating a persistently failing connector.
//! - [`limiter`]: token-bucket rate limiter with min-inter-request delay.
//! - [`builder`]: validated composition of the above into an onion.

pub mod breaker;
pub mod builder;
pub mod limiter;
pub mod retry;

pub use breaker::{CircuitBreakerConnector, CircuitBreakerMiddleware};
pub use builder::{ConnectorBuilder, LayerManifest, StackManifest};
pub use limiter::{RateLimitConnector, RateLimitMiddleware};
pub use retry::{RetryConnector, RetryMiddleware};
