//! Tickd-specific data transfer objects and configuration primitives shared
//! across the collector workspace.
#![warn(missing_docs)]

mod backfill;
mod bar;
mod capability;
mod config;
mod connector;
mod error;
mod event;
mod failover;
mod health;
mod subscription;

pub use backfill::{BackfillRequest, BackfillRun, SymbolBackfillResult};
pub use bar::DailyBar;
pub use capability::{Capability, StreamingCaps, StreamingCapabilities};
pub use config::{
    BackfillConfig, BackoffConfig, BackpressurePolicy, CircuitBreakerConfig, FailoverConfig,
    HealthMonitorConfig, PipelineConfig, RateLimitConfig, RetryConfig, SessionConfig,
    SessionProfile, StorageConfig,
};
pub use connector::ProviderKey;
pub use error::TickdError;
pub use event::{
    AggressorSide, DepthLevel, Event, EventKind, EventPayload, IntegrityKind, OptionRight,
    SCHEMA_VERSION, SYSTEM_SYMBOL, Tier, canonicalize_symbol, is_valid_symbol, next_monotonic,
};
pub use failover::{FailoverEvent, FailoverRule, FailoverRuleState};
pub use health::{ConnectionEvent, ProviderHealth, ProviderHealthSnapshot};
pub use subscription::{
    PENDING_SUBSCRIPTION, SubscriptionId, SymbolSubscription, SymbolSubscriptionSet,
};
