//! Streaming failover supervisor: health scoring, active-provider election,
//! automatic failover and recovery.

pub mod rules;

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use chrono::Utc;
use tickd_core::pipeline::EventPipeline;
use tickd_core::stream::SessionHandle;
use tickd_core::TickdError;
use tickd_types::{
    Event, FailoverConfig, FailoverEvent, FailoverRule, FailoverRuleState, IntegrityKind,
    ProviderHealth, ProviderHealthSnapshot, SYSTEM_SYMBOL,
};
use tokio::sync::{broadcast, oneshot};

use rules::{RuleOutcome, evaluate_rule};

struct SupervisorState {
    health: HashMap<String, ProviderHealth>,
    rule_states: HashMap<String, FailoverRuleState>,
}

struct SupervisorInner {
    cfg: FailoverConfig,
    /// All rule and health state sits behind one outer lock so every
    /// evaluation cycle sees a consistent view and the emitted events form
    /// a total order consistent with the switches.
    state: StdMutex<SupervisorState>,
    events: broadcast::Sender<FailoverEvent>,
    pipeline: Option<EventPipeline>,
}

/// Rule-based failover supervisor.
///
/// Providers report in through [`record_failure`](FailoverSupervisor::record_failure)
/// and [`record_success`](FailoverSupervisor::record_success); a periodic
/// task (or [`evaluate_all`](FailoverSupervisor::evaluate_all) directly)
/// elects active providers. Listeners receive [`FailoverEvent`]s outside
/// any lock.
pub struct FailoverSupervisor {
    inner: Arc<SupervisorInner>,
}

impl FailoverSupervisor {
    /// Supervisor over the configured rules.
    #[must_use]
    pub fn new(cfg: FailoverConfig) -> Self {
        Self::with_pipeline_opt(cfg, None)
    }

    /// Supervisor that also surfaces integrity events (no healthy backup)
    /// in-band on the given pipeline.
    #[must_use]
    pub fn with_pipeline(cfg: FailoverConfig, pipeline: EventPipeline) -> Self {
        Self::with_pipeline_opt(cfg, Some(pipeline))
    }

    fn with_pipeline_opt(cfg: FailoverConfig, pipeline: Option<EventPipeline>) -> Self {
        let rule_states = cfg
            .rules
            .iter()
            .map(|r| (r.id.clone(), FailoverRuleState::new(&r.primary_provider_id)))
            .collect();
        let (events, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(SupervisorInner {
                cfg,
                state: StdMutex::new(SupervisorState {
                    health: HashMap::new(),
                    rule_states,
                }),
                events,
                pipeline,
            }),
        }
    }

    /// Record a failed call or session for a provider.
    pub fn record_failure(&self, provider: &str, issue: impl Into<String>) {
        let mut state = self.inner.state.lock().expect("mutex poisoned");
        state
            .health
            .entry(provider.to_string())
            .or_default()
            .record_failure(issue);
    }

    /// Record a successful call for a provider, optionally with latency.
    pub fn record_success(&self, provider: &str, latency_ms: Option<u64>) {
        let mut state = self.inner.state.lock().expect("mutex poisoned");
        state
            .health
            .entry(provider.to_string())
            .or_default()
            .record_success(latency_ms);
    }

    /// Evaluate every rule once and apply the decisions.
    ///
    /// Returns the events emitted this cycle, in rule order. Broadcast
    /// subscribers and the integrity pipeline are notified after the state
    /// lock is released.
    pub async fn evaluate_all(&self) -> Vec<FailoverEvent> {
        let mut emitted: Vec<FailoverEvent> = Vec::new();
        let mut no_backup: Vec<String> = Vec::new();
        {
            let mut state = self.inner.state.lock().expect("mutex poisoned");
            for rule in &self.inner.cfg.rules {
                let Some(rule_state) = state.rule_states.get(&rule.id) else {
                    continue;
                };
                match evaluate_rule(rule, rule_state, &state.health) {
                    RuleOutcome::Hold => {}
                    RuleOutcome::Failover { from, to, reason } => {
                        let rs = state
                            .rule_states
                            .get_mut(&rule.id)
                            .expect("checked above");
                        rs.current_active = to.clone();
                        rs.is_in_failover = true;
                        rs.last_switch_at = Some(Utc::now());
                        rs.switch_count += 1;
                        emitted.push(FailoverEvent::FailoverTriggered {
                            rule_id: rule.id.clone(),
                            from,
                            to,
                            reason,
                        });
                    }
                    RuleOutcome::Recover { from, to } => {
                        let rs = state
                            .rule_states
                            .get_mut(&rule.id)
                            .expect("checked above");
                        rs.current_active = to.clone();
                        rs.is_in_failover = false;
                        rs.last_switch_at = Some(Utc::now());
                        rs.switch_count += 1;
                        emitted.push(FailoverEvent::FailoverRecovered {
                            rule_id: rule.id.clone(),
                            from,
                            to,
                        });
                    }
                    RuleOutcome::NoHealthyBackup { active } => {
                        no_backup.push(format!(
                            "rule {}: no healthy backup, keeping {active}",
                            rule.id
                        ));
                    }
                }
            }
        }

        for event in &emitted {
            let _ = self.inner.events.send(event.clone());
        }
        if let Some(pipeline) = &self.inner.pipeline {
            for detail in no_backup {
                let _ = pipeline
                    .publish(Event::integrity(
                        "failover",
                        SYSTEM_SYMBOL,
                        IntegrityKind::NoHealthyBackup,
                        detail,
                        0,
                    ))
                    .await;
            }
        }
        emitted
    }

    /// Manually switch a rule to `target`, bypassing health scoring.
    ///
    /// # Errors
    /// `NotFound` for an unknown rule; `InvalidArg` when `target` is not in
    /// the rule's candidate list.
    pub fn force_failover(&self, rule_id: &str, target: &str) -> Result<(), TickdError> {
        let rule = self
            .inner
            .cfg
            .rules
            .iter()
            .find(|r| r.id == rule_id)
            .ok_or_else(|| TickdError::not_found(format!("failover rule {rule_id}")))?;
        if !rule.candidates().contains(&target) {
            return Err(TickdError::InvalidArg(format!(
                "{target} is not a candidate of rule {rule_id}"
            )));
        }

        let event = {
            let mut state = self.inner.state.lock().expect("mutex poisoned");
            let rs = state
                .rule_states
                .get_mut(rule_id)
                .expect("state exists for every configured rule");
            let from = std::mem::replace(&mut rs.current_active, target.to_string());
            rs.is_in_failover = target != rule.primary_provider_id;
            rs.last_switch_at = Some(Utc::now());
            rs.switch_count += 1;
            FailoverEvent::FailoverTriggered {
                rule_id: rule_id.to_string(),
                from,
                to: target.to_string(),
                reason: "forced".to_string(),
            }
        };
        let _ = self.inner.events.send(event);
        Ok(())
    }

    /// Provider currently elected for a rule.
    #[must_use]
    pub fn active_provider_of(&self, rule_id: &str) -> Option<String> {
        let state = self.inner.state.lock().expect("mutex poisoned");
        state
            .rule_states
            .get(rule_id)
            .map(|rs| rs.current_active.clone())
    }

    /// Runtime state of one rule.
    #[must_use]
    pub fn rule_state(&self, rule_id: &str) -> Option<FailoverRuleState> {
        let state = self.inner.state.lock().expect("mutex poisoned");
        state.rule_states.get(rule_id).cloned()
    }

    /// Configured rules.
    #[must_use]
    pub fn rules(&self) -> &[FailoverRule] {
        &self.inner.cfg.rules
    }

    /// Health snapshot for one provider, if it has reported.
    #[must_use]
    pub fn health_snapshot(&self, provider: &str) -> Option<ProviderHealthSnapshot> {
        let state = self.inner.state.lock().expect("mutex poisoned");
        state.health.get(provider).map(|h| h.snapshot(provider))
    }

    /// Health snapshots for every provider that has reported.
    #[must_use]
    pub fn all_health_snapshots(&self) -> Vec<ProviderHealthSnapshot> {
        let state = self.inner.state.lock().expect("mutex poisoned");
        state
            .health
            .iter()
            .map(|(id, h)| h.snapshot(id))
            .collect()
    }

    /// Subscribe to failover events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<FailoverEvent> {
        self.inner.events.subscribe()
    }

    /// Spawn the periodic evaluation task. Returns a no-op finished handle
    /// when failover is disabled in configuration.
    #[must_use]
    pub fn start(&self) -> SessionHandle {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        if !self.inner.cfg.enable {
            return SessionHandle::new(tokio::spawn(async {}), stop_tx);
        }
        let supervisor = Self {
            inner: Arc::clone(&self.inner),
        };
        let join = tokio::spawn(async move {
            let mut tick = tokio::time::interval(supervisor.inner.cfg.health_check_interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = &mut stop_rx => return,
                    _ = tick.tick() => {
                        let _ = supervisor.evaluate_all().await;
                    }
                }
            }
        });
        SessionHandle::new(join, stop_tx)
    }
}

impl Clone for FailoverSupervisor {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
