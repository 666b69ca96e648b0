//! Failover rule configuration and runtime state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A streaming failover rule: which provider is primary for a slice of the
/// feed, which providers back it up, and the thresholds that drive
/// switching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailoverRule {
    /// Stable rule identifier.
    pub id: String,
    /// Provider that should be active when healthy.
    pub primary_provider_id: String,
    /// Ordered backups, most preferred first.
    pub backup_provider_ids: Vec<String>,
    /// Consecutive failures of the active provider that trigger failover.
    pub failover_threshold: u32,
    /// Consecutive successes of the primary required to fail back.
    pub recovery_threshold: u32,
    /// Average latency above which the active provider is considered
    /// unhealthy; 0 disables the latency check.
    pub max_latency_ms: u64,
}

impl FailoverRule {
    /// Rule with the given primary and backups and conventional thresholds
    /// (3 failures out, 3 successes back).
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        primary: impl Into<String>,
        backups: Vec<String>,
    ) -> Self {
        Self {
            id: id.into(),
            primary_provider_id: primary.into(),
            backup_provider_ids: backups,
            failover_threshold: 3,
            recovery_threshold: 3,
            max_latency_ms: 0,
        }
    }

    /// The full candidate list in election order: primary first, then
    /// backups.
    #[must_use]
    pub fn candidates(&self) -> Vec<&str> {
        std::iter::once(self.primary_provider_id.as_str())
            .chain(self.backup_provider_ids.iter().map(String::as_str))
            .collect()
    }
}

/// Runtime state of one failover rule. Lives for the lifetime of the
/// supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailoverRuleState {
    /// Provider currently elected for this rule.
    pub current_active: String,
    /// Whether the rule is currently failed over away from its primary.
    pub is_in_failover: bool,
    /// Wall clock of the most recent switch in either direction.
    pub last_switch_at: Option<DateTime<Utc>>,
    /// Total number of switches since startup.
    pub switch_count: u64,
}

impl FailoverRuleState {
    /// Initial state: the primary is active.
    #[must_use]
    pub fn new(primary: impl Into<String>) -> Self {
        Self {
            current_active: primary.into(),
            is_in_failover: false,
            last_switch_at: None,
            switch_count: 0,
        }
    }
}

/// Events emitted by the failover supervisor, in switch order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
#[non_exhaustive]
pub enum FailoverEvent {
    /// The active provider for a rule was switched away from.
    FailoverTriggered {
        /// Rule id.
        rule_id: String,
        /// Provider that was active before the switch.
        from: String,
        /// Provider elected as the new active.
        to: String,
        /// Why the switch happened.
        reason: String,
    },
    /// The rule returned to its primary provider.
    FailoverRecovered {
        /// Rule id.
        rule_id: String,
        /// Backup that was active during the failover.
        from: String,
        /// The primary provider, active again.
        to: String,
    },
}
