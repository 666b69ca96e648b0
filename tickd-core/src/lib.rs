//! tickd-core
//!
//! Core traits and runtime machinery shared across the tickd collector.
//!
//! - `connector`: the `TickdConnector` trait and capability provider traits.
//! - `pipeline`: the bounded multi-producer / single-consumer event pipeline.
//! - `normalize`: the boundary normalizer and per-key sequence gate.
//! - `registry`: plugin discovery and the process-wide provider registry.
//! - `session`: the streaming session state machine and transport driver.
//! - `sink`: the durable event sink contract.
#![warn(missing_docs)]

/// Connector capability traits and the primary `TickdConnector` interface.
pub mod connector;
/// Middleware trait for wrapping connectors.
pub mod middleware;
/// Boundary normalizer and sequence gate.
pub mod normalize;
/// Bounded event pipeline with batching and periodic flush.
pub mod pipeline;
/// Plugin registration and provider registry.
pub mod registry;
/// Streaming session state machine and transport driver.
pub mod session;
/// Durable event sink contract.
pub mod sink;
/// Internal stream utilities used by `SessionHandle` and tests.
pub mod stream;

pub use connector::{HistoryProvider, StreamingProvider, TickdConnector};
pub use middleware::Middleware;
pub use normalize::{EventIngress, SequenceGate};
pub use pipeline::{EventPipeline, PublishOutcome};
pub use registry::{Plugin, ProviderRegistry, RegistryBuilder};
pub use sink::{EventSink, SinkError};
pub use stream::SessionHandle;
pub use tickd_types::TickdError;
