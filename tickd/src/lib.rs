//! tickd
//!
//! Multi-provider market data collection service. Streaming and historical
//! vendor connectors feed a normalizing, backpressured event pipeline that
//! persists canonical events durably, with hot-reconcilable subscriptions,
//! health-scored failover, and a bulk backfill path.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tickd::Collector;
//! use tickd_types::{FailoverConfig, FailoverRule, SymbolSubscription, SymbolSubscriptionSet};
//!
//! let primary = Arc::new(tickd_mock::MockConnector::named("feed-a"));
//! let backup = Arc::new(tickd_mock::MockConnector::named("feed-b"));
//!
//! let collector = Collector::builder()
//!     .with_connector(primary)
//!     .with_connector(backup)
//!     .failover(FailoverConfig {
//!         rules: vec![FailoverRule::new("equities", "feed-a", vec!["feed-b".into()])],
//!         ..FailoverConfig::default()
//!     })
//!     .build()?;
//!
//! collector.start().await?;
//! collector
//!     .apply(&SymbolSubscriptionSet::new(vec![SymbolSubscription::new("AAPL")]))
//!     .await?;
//! ```
#![warn(missing_docs)]

/// Historical backfill orchestration.
pub mod backfill;
/// Collector facade and builder.
pub mod collector;
/// Composite historical provider with ordered fallback.
pub mod composite;
/// Subscription reconciliation.
pub mod coordinator;
/// Streaming failover supervision.
pub mod failover;
/// Connection health monitoring.
pub mod health;
/// Bundled concrete sinks.
pub mod sink;

pub use backfill::BackfillOrchestrator;
pub use collector::{Collector, CollectorBuilder};
pub use composite::{CanonicalResolver, CompositeHistoryProvider, CrossValidation, SymbolResolver};
pub use coordinator::{ReconcileReport, SubscriptionCoordinator};
pub use failover::FailoverSupervisor;
pub use health::ConnectionHealthMonitor;
pub use sink::JsonlSink;
pub use tickd_core::TickdError;
