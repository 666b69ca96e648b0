//! Pure failover election logic, directly unit-testable.

use std::collections::HashMap;

use tickd_types::{FailoverRule, FailoverRuleState, ProviderHealth};

/// Decision for one rule in one evaluation cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleOutcome {
    /// Nothing to do.
    Hold,
    /// Switch the active provider away from `from`.
    Failover {
        /// Provider that was active.
        from: String,
        /// Elected replacement.
        to: String,
        /// Why the switch happened.
        reason: String,
    },
    /// The primary recovered; switch back.
    Recover {
        /// Backup that was active.
        from: String,
        /// The primary provider.
        to: String,
    },
    /// A switch is warranted but no healthy candidate exists.
    NoHealthyBackup {
        /// The provider left active.
        active: String,
    },
}

fn failures_of(health: &HashMap<String, ProviderHealth>, provider: &str) -> u32 {
    health
        .get(provider)
        .map_or(0, |h| h.consecutive_failures)
}

/// Evaluate one rule against current health.
///
/// A provider with no recorded health is treated as healthy: it has never
/// been seen failing.
#[must_use]
pub fn evaluate_rule(
    rule: &FailoverRule,
    state: &FailoverRuleState,
    health: &HashMap<String, ProviderHealth>,
) -> RuleOutcome {
    let active = state.current_active.as_str();

    if state.is_in_failover {
        let primary_successes = health
            .get(&rule.primary_provider_id)
            .map_or(0, |h| h.consecutive_successes);
        if primary_successes >= rule.recovery_threshold {
            return RuleOutcome::Recover {
                from: active.to_string(),
                to: rule.primary_provider_id.clone(),
            };
        }
        return RuleOutcome::Hold;
    }

    let active_failures = failures_of(health, active);
    let latency_breach = rule.max_latency_ms > 0
        && health
            .get(active)
            .and_then(ProviderHealth::avg_latency_ms)
            .is_some_and(|avg| avg > rule.max_latency_ms as f64);

    let should_failover = active_failures >= rule.failover_threshold || latency_breach;
    if !should_failover {
        return RuleOutcome::Hold;
    }

    let reason = if latency_breach {
        format!(
            "average latency above {} ms on {active}",
            rule.max_latency_ms
        )
    } else {
        format!("{active_failures} consecutive failures on {active}")
    };

    let candidate = rule
        .candidates()
        .into_iter()
        .filter(|p| *p != active)
        .find(|p| failures_of(health, p) < rule.failover_threshold);

    match candidate {
        Some(to) => RuleOutcome::Failover {
            from: active.to_string(),
            to: to.to_string(),
            reason,
        },
        None => RuleOutcome::NoHealthyBackup {
            active: active.to_string(),
        },
    }
}
