//! Configuration types shared across the collector and connectors.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Backpressure policy applied by the event pipeline when its queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum BackpressurePolicy {
    /// Discard the oldest undrained event and surface a coalesced overflow
    /// integrity event. Publishers never block. Default for live streams.
    #[default]
    DropOldest,
    /// Suspend the publisher until space is available, honoring
    /// cancellation. Default for historical backfill.
    Block,
}

/// Configuration for the event pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Bounded queue capacity.
    pub capacity: usize,
    /// Maximum number of events handed to the sink per batch.
    pub batch_size: usize,
    /// Maximum time the consumer waits to fill a batch.
    pub batch_interval: Duration,
    /// Interval of the forced flush under low traffic.
    pub periodic_flush: Duration,
    /// Policy applied when the queue is full.
    pub backpressure: BackpressurePolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            capacity: 20_000,
            batch_size: 256,
            batch_interval: Duration::from_millis(200),
            periodic_flush: Duration::from_secs(1),
            backpressure: BackpressurePolicy::DropOldest,
        }
    }
}

/// Exponential backoff configuration for reconnecting streaming sessions
/// and for sink write retries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Minimum backoff delay in milliseconds.
    pub min_backoff_ms: u64,
    /// Maximum backoff delay in milliseconds.
    pub max_backoff_ms: u64,
    /// Exponential factor to increase delay after each failure (>= 1).
    pub factor: u32,
    /// Random jitter percentage [0, 100] added to each delay.
    pub jitter_percent: u8,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            min_backoff_ms: 2_000,
            max_backoff_ms: 30_000,
            factor: 2,
            jitter_percent: 20,
        }
    }
}

/// Hardening profile selecting reconnect persistence for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum SessionProfile {
    /// Give up after 10 reconnect attempts.
    #[default]
    Default,
    /// Keep trying for 20 attempts before closing.
    Resilient,
}

/// Configuration for a vendor streaming session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Reconnect backoff schedule.
    pub backoff: BackoffConfig,
    /// Maximum reconnect attempts before the session closes for good.
    pub max_reconnect_attempts: u32,
    /// Interval between outbound pings.
    pub heartbeat_interval: Duration,
    /// Silence after which the connection is considered stale.
    pub heartbeat_timeout: Duration,
    /// Deadline applied to individual connect/subscribe operations.
    pub operation_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffConfig::default(),
            max_reconnect_attempts: 10,
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(10),
            operation_timeout: Duration::from_secs(15),
        }
    }
}

impl SessionConfig {
    /// Build a config for the given hardening profile.
    #[must_use]
    pub fn for_profile(profile: SessionProfile) -> Self {
        let mut cfg = Self::default();
        if matches!(profile, SessionProfile::Resilient) {
            cfg.max_reconnect_attempts = 20;
        }
        cfg
    }
}

/// Configuration for the connection health monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthMonitorConfig {
    /// How often registered connections are inspected.
    pub check_interval: Duration,
    /// Expected heartbeat cadence used to compute missed counts.
    pub heartbeat_interval: Duration,
    /// Missed heartbeats after which the connection is declared lost.
    pub lost_threshold: u32,
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(30),
            lost_threshold: 3,
        }
    }
}

/// Configuration for the streaming failover supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailoverConfig {
    /// Master switch; a disabled supervisor never evaluates rules.
    pub enable: bool,
    /// Interval between rule evaluations.
    pub health_check_interval: Duration,
    /// Rules evaluated each cycle.
    pub rules: Vec<crate::failover::FailoverRule>,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            enable: true,
            health_check_interval: Duration::from_secs(10),
            rules: Vec::new(),
        }
    }
}

/// Configuration for historical backfill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackfillConfig {
    /// Provider id to fetch from; "composite" selects the fan-out provider.
    pub provider: String,
    /// Fall back through the composite provider chain on failure.
    pub enable_fallback: bool,
    /// Resolve canonical symbols before dispatching to providers.
    pub enable_symbol_resolution: bool,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            provider: "composite".to_string(),
            enable_fallback: true,
            enable_symbol_resolution: false,
        }
    }
}

/// Configuration for the default file sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for sink files and the status file.
    pub data_root: std::path::PathBuf,
    /// Gzip-compress sink files.
    pub compress: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_root: std::path::PathBuf::from("data"),
            compress: false,
        }
    }
}

/// Token-bucket rate limit declaration over a sliding window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum number of requests that may start within a single window.
    pub max_requests: u64,
    /// Duration of the accounting window.
    pub window: Duration,
    /// Minimum delay between consecutive requests.
    pub min_delay: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 60,
            window: Duration::from_secs(60),
            min_delay: Duration::ZERO,
        }
    }
}

/// Retry configuration for transient provider failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum attempts, including the first call.
    pub max_attempts: u32,
    /// Backoff schedule between attempts.
    pub backoff: BackoffConfig,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffConfig {
                min_backoff_ms: 250,
                max_backoff_ms: 10_000,
                factor: 2,
                jitter_percent: 20,
            },
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that trip the breaker open.
    pub failure_threshold: u32,
    /// How long the breaker stays open before admitting a probe.
    pub break_duration: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            break_duration: Duration::from_secs(30),
        }
    }
}
