//! Per-provider health accounting used by the failover supervisor, and the
//! connection-level events emitted by the health monitor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum number of recent issue strings retained per provider.
const MAX_RECENT_ISSUES: usize = 16;

/// Mutable health state for a single provider.
///
/// Exists for the lifetime of the provider's registration with the failover
/// supervisor.
#[derive(Debug, Clone, Default)]
pub struct ProviderHealth {
    /// Number of consecutive failed calls/sessions.
    pub consecutive_failures: u32,
    /// Number of consecutive successes since the last failure.
    pub consecutive_successes: u32,
    /// Wall clock of the most recent failure.
    pub last_failure_at: Option<DateTime<Utc>>,
    /// Wall clock of the most recent success.
    pub last_success_at: Option<DateTime<Utc>>,
    /// Sum of all recorded latencies in milliseconds.
    pub total_latency_ms: u64,
    /// Number of latency samples recorded.
    pub latency_samples: u64,
    /// Bounded ring of recent issue strings, newest last.
    pub recent_issues: Vec<String>,
}

impl ProviderHealth {
    /// Record a successful call, optionally with an observed latency.
    pub fn record_success(&mut self, latency_ms: Option<u64>) {
        self.consecutive_failures = 0;
        self.consecutive_successes = self.consecutive_successes.saturating_add(1);
        self.last_success_at = Some(Utc::now());
        if let Some(ms) = latency_ms {
            self.total_latency_ms = self.total_latency_ms.saturating_add(ms);
            self.latency_samples += 1;
        }
    }

    /// Record a failed call with a short issue description.
    pub fn record_failure(&mut self, issue: impl Into<String>) {
        self.consecutive_successes = 0;
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_failure_at = Some(Utc::now());
        self.recent_issues.push(issue.into());
        if self.recent_issues.len() > MAX_RECENT_ISSUES {
            let excess = self.recent_issues.len() - MAX_RECENT_ISSUES;
            self.recent_issues.drain(..excess);
        }
    }

    /// Rolling average latency in milliseconds, if any samples exist.
    #[must_use]
    pub fn avg_latency_ms(&self) -> Option<f64> {
        if self.latency_samples == 0 {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        Some(self.total_latency_ms as f64 / self.latency_samples as f64)
    }

    /// Immutable snapshot for status queries.
    #[must_use]
    pub fn snapshot(&self, provider: &str) -> ProviderHealthSnapshot {
        ProviderHealthSnapshot {
            provider: provider.to_string(),
            consecutive_failures: self.consecutive_failures,
            consecutive_successes: self.consecutive_successes,
            last_failure_at: self.last_failure_at,
            last_success_at: self.last_success_at,
            avg_latency_ms: self.avg_latency_ms(),
            recent_issues: self.recent_issues.clone(),
        }
    }
}

/// Serializable snapshot of provider health for status queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderHealthSnapshot {
    /// Provider id.
    pub provider: String,
    /// Consecutive failed calls/sessions.
    pub consecutive_failures: u32,
    /// Consecutive successes since the last failure.
    pub consecutive_successes: u32,
    /// Wall clock of the most recent failure.
    pub last_failure_at: Option<DateTime<Utc>>,
    /// Wall clock of the most recent success.
    pub last_success_at: Option<DateTime<Utc>>,
    /// Rolling average latency in milliseconds.
    pub avg_latency_ms: Option<f64>,
    /// Recent issue strings, newest last.
    pub recent_issues: Vec<String>,
}

/// Connection-level events emitted by the health monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
#[non_exhaustive]
pub enum ConnectionEvent {
    /// A heartbeat window elapsed without a ping.
    HeartbeatMissed {
        /// Connection id.
        id: String,
        /// Number of consecutive missed heartbeat windows.
        missed_count: u32,
    },
    /// Missed heartbeats crossed the lost threshold.
    ConnectionLost {
        /// Connection id.
        id: String,
        /// Short description of why the connection is considered lost.
        reason: String,
    },
    /// Data resumed after a loss.
    ConnectionRecovered {
        /// Connection id.
        id: String,
    },
}
