//! Streaming session core: a pure reconnect/heartbeat state machine and the
//! driver task that runs it over an abstract wire transport.
//!
//! Vendor adapters plug a [`StreamTransport`] in and get the full session
//! lifecycle — handshake, heartbeats, degraded detection, jittered
//! exponential reconnect, and subscription replay — without touching the
//! wire format.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::TickdError;
use crate::normalize::EventIngress;
use crate::stream::SessionHandle;
use tickd_types::{
    Event, IntegrityKind, SYSTEM_SYMBOL, SessionConfig, SubscriptionId, SymbolSubscription,
};

/// Apply percentage jitter to a backoff delay.
#[must_use]
pub fn jitter_wait(base_ms: u64, jitter_percent: u32) -> u64 {
    let jitter_range = if jitter_percent == 0 {
        1
    } else {
        std::cmp::max(1, (base_ms.saturating_mul(u64::from(jitter_percent))) / 100)
    };
    let mut rng = rand::rng();
    base_ms + rng.random_range(0..jitter_range)
}

/// Which stream a subscription belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// Trade prints.
    Trades,
    /// L2 depth.
    Depth,
}

/// One frame received from the vendor wire.
#[derive(Debug)]
pub enum TransportFrame {
    /// A decoded market data event.
    Event(Event),
    /// Heartbeat response.
    Pong,
    /// The peer closed the connection cleanly.
    Closed,
}

/// Abstract vendor wire. Decoding vendor bytes into canonical events is the
/// transport's job; the session driver only sees frames.
#[async_trait]
pub trait StreamTransport: Send + Sync {
    /// Open (or re-open) the underlying connection and perform the
    /// handshake.
    async fn open(&self) -> Result<(), TickdError>;

    /// Receive the next frame. Returning an error signals a transport
    /// fault and triggers the reconnect path.
    async fn recv(&self) -> Result<TransportFrame, TickdError>;

    /// Send a heartbeat ping.
    async fn ping(&self) -> Result<(), TickdError>;

    /// Issue a subscription on the wire.
    async fn subscribe(
        &self,
        sub: &SymbolSubscription,
        stream: StreamKind,
    ) -> Result<SubscriptionId, TickdError>;

    /// Cancel a subscription on the wire.
    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), TickdError>;

    /// Close the connection.
    async fn close(&self);
}

/// Insertion-ordered record of live subscriptions, replayed after a
/// successful reconnect.
#[derive(Default)]
pub struct SubscriptionLedger {
    entries: StdMutex<Vec<LedgerEntry>>,
}

struct LedgerEntry {
    id: SubscriptionId,
    sub: SymbolSubscription,
    stream: StreamKind,
}

impl SubscriptionLedger {
    /// Empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a live subscription.
    pub fn insert(&self, id: SubscriptionId, sub: SymbolSubscription, stream: StreamKind) {
        let mut entries = self.entries.lock().expect("mutex poisoned");
        entries.push(LedgerEntry { id, sub, stream });
    }

    /// Forget a subscription by id. Returns whether it was present.
    pub fn remove(&self, id: SubscriptionId) -> bool {
        let mut entries = self.entries.lock().expect("mutex poisoned");
        let before = entries.len();
        entries.retain(|e| e.id != id);
        entries.len() != before
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().expect("mutex poisoned").len()
    }

    /// Whether no subscriptions are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot in insertion order for replay.
    fn replay_order(&self) -> Vec<(SubscriptionId, SymbolSubscription, StreamKind)> {
        self.entries
            .lock()
            .expect("mutex poisoned")
            .iter()
            .map(|e| (e.id, e.sub.clone(), e.stream))
            .collect()
    }

    /// Swap the vendor id of a replayed subscription.
    fn reassign(&self, old_id: SubscriptionId, new_id: SubscriptionId) {
        let mut entries = self.entries.lock().expect("mutex poisoned");
        if let Some(e) = entries.iter_mut().find(|e| e.id == old_id) {
            e.id = new_id;
        }
    }
}

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No transport open; nothing requested yet.
    Disconnected,
    /// Handshake in flight.
    Connecting,
    /// Healthy; counts consecutive missed heartbeat windows.
    Connected {
        /// Missed heartbeat windows so far (0 when healthy).
        missed_heartbeats: u32,
    },
    /// More than one heartbeat window missed; data may be stale.
    Degraded {
        /// Missed heartbeat windows so far.
        missed_heartbeats: u32,
    },
    /// Transport lost; waiting out the backoff before the next attempt.
    Reconnecting {
        /// 1-based reconnect attempt number.
        attempt: u32,
    },
    /// Terminal; the session will not reopen.
    Closed,
}

/// Inputs to the session state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Caller asked for the session to connect.
    ConnectRequested,
    /// Transport open + handshake succeeded.
    HandshakeSucceeded,
    /// Transport open or handshake failed.
    HandshakeFailed {
        /// Failure description.
        error: String,
    },
    /// A heartbeat window elapsed without a pong.
    HeartbeatTimeout,
    /// A pong (or data) arrived after missed windows.
    HeartbeatRestored,
    /// The transport errored or closed unexpectedly.
    TransportError {
        /// Failure description.
        error: String,
    },
    /// The reconnect backoff timer fired.
    ReconnectTick,
    /// Caller asked for the session to stop.
    DisconnectRequested,
}

/// Effects the driver must carry out after a transition.
#[derive(Debug, PartialEq, Eq)]
pub enum SessionAction {
    /// Open the transport and report the outcome as a handshake event.
    OpenTransport,
    /// Re-issue all live subscriptions in insertion order.
    ReplaySubscriptions,
    /// Emit an in-band `Integrity { ConnectionLost }` event.
    EmitConnectionLost {
        /// Human-readable reason.
        reason: String,
    },
    /// Arm the reconnect timer.
    ScheduleReconnect {
        /// Delay before the next attempt, already jittered.
        delay_ms: u64,
    },
    /// Close the transport.
    CloseTransport,
}

/// Pure reconnect/heartbeat state machine.
///
/// All timing and I/O live in the driver; transitions are a function of
/// `(state, event)` and are directly unit-testable.
#[derive(Debug)]
pub struct SessionMachine {
    /// Current state.
    pub state: SessionState,
    cfg: SessionConfig,
}

impl SessionMachine {
    /// New machine in `Disconnected`.
    #[must_use]
    pub fn new(cfg: SessionConfig) -> Self {
        Self {
            state: SessionState::Disconnected,
            cfg,
        }
    }

    fn reconnect_delay_ms(&self, attempt: u32) -> u64 {
        let base = self.cfg.backoff.min_backoff_ms;
        let factor = u64::from(self.cfg.backoff.factor.max(1));
        let exp = attempt.saturating_sub(1).min(16);
        let mut delay = base;
        for _ in 0..exp {
            delay = delay.saturating_mul(factor);
            if delay >= self.cfg.backoff.max_backoff_ms {
                break;
            }
        }
        let capped = delay.min(self.cfg.backoff.max_backoff_ms);
        jitter_wait(capped, u32::from(self.cfg.backoff.jitter_percent))
    }

    /// Apply one event, returning the actions the driver must perform.
    pub fn handle(&mut self, event: SessionEvent) -> Vec<SessionAction> {
        use SessionEvent as E;
        use SessionState as S;

        if matches!(self.state, S::Closed) {
            return Vec::new();
        }
        if matches!(event, E::DisconnectRequested) {
            self.state = S::Closed;
            return vec![SessionAction::CloseTransport];
        }

        match (self.state, event) {
            (S::Disconnected, E::ConnectRequested) => {
                self.state = S::Connecting;
                vec![SessionAction::OpenTransport]
            }
            (S::Connecting, E::HandshakeSucceeded) => {
                self.state = S::Connected {
                    missed_heartbeats: 0,
                };
                vec![SessionAction::ReplaySubscriptions]
            }
            (S::Connecting, E::HandshakeFailed { error }) => {
                self.state = S::Disconnected;
                vec![
                    SessionAction::CloseTransport,
                    SessionAction::EmitConnectionLost { reason: error },
                ]
            }
            (S::Connected { missed_heartbeats }, E::HeartbeatTimeout) => {
                let missed = missed_heartbeats + 1;
                if missed > 1 {
                    self.state = S::Degraded {
                        missed_heartbeats: missed,
                    };
                } else {
                    self.state = S::Connected {
                        missed_heartbeats: missed,
                    };
                }
                Vec::new()
            }
            (S::Degraded { missed_heartbeats }, E::HeartbeatTimeout) => {
                self.state = S::Degraded {
                    missed_heartbeats: missed_heartbeats + 1,
                };
                Vec::new()
            }
            (S::Connected { .. } | S::Degraded { .. }, E::HeartbeatRestored) => {
                self.state = S::Connected {
                    missed_heartbeats: 0,
                };
                Vec::new()
            }
            (S::Connected { .. } | S::Degraded { .. }, E::TransportError { error }) => {
                self.state = S::Reconnecting { attempt: 1 };
                vec![
                    SessionAction::CloseTransport,
                    SessionAction::EmitConnectionLost { reason: error },
                    SessionAction::ScheduleReconnect {
                        delay_ms: self.reconnect_delay_ms(1),
                    },
                ]
            }
            (S::Reconnecting { .. }, E::ReconnectTick) => vec![SessionAction::OpenTransport],
            (S::Reconnecting { .. }, E::HandshakeSucceeded) => {
                self.state = S::Connected {
                    missed_heartbeats: 0,
                };
                vec![SessionAction::ReplaySubscriptions]
            }
            (S::Reconnecting { attempt }, E::HandshakeFailed { error }) => {
                if attempt >= self.cfg.max_reconnect_attempts {
                    self.state = S::Closed;
                    vec![
                        SessionAction::CloseTransport,
                        SessionAction::EmitConnectionLost {
                            reason: format!(
                                "gave up after {attempt} reconnect attempts: {error}"
                            ),
                        },
                    ]
                } else {
                    let next = attempt + 1;
                    self.state = S::Reconnecting { attempt: next };
                    vec![SessionAction::ScheduleReconnect {
                        delay_ms: self.reconnect_delay_ms(next),
                    }]
                }
            }
            (state, _) => {
                self.state = state;
                Vec::new()
            }
        }
    }
}

/// Driver running a [`SessionMachine`] over a concrete transport.
pub struct SessionDriver;

impl SessionDriver {
    /// Spawn the session task. The returned handle stops the session
    /// gracefully on [`SessionHandle::stop`] and aborts it on drop.
    #[must_use]
    pub fn spawn(
        provider_id: &'static str,
        transport: Arc<dyn StreamTransport>,
        ledger: Arc<SubscriptionLedger>,
        cfg: SessionConfig,
        ingress: EventIngress,
    ) -> SessionHandle {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let join = tokio::spawn(async move {
            let mut sm = SessionMachine::new(cfg.clone());
            let mut pending: VecDeque<SessionEvent> = VecDeque::new();
            pending.push_back(SessionEvent::ConnectRequested);

            let mut heartbeat_tick = tokio::time::interval(cfg.heartbeat_interval);
            heartbeat_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut last_pong = Instant::now();
            let mut reconnect_timer: Option<std::pin::Pin<Box<tokio::time::Sleep>>> = None;

            loop {
                // Drain machine events before touching the wire again.
                while let Some(event) = pending.pop_front() {
                    for action in sm.handle(event) {
                        match action {
                            SessionAction::OpenTransport => match transport.open().await {
                                Ok(()) => {
                                    last_pong = Instant::now();
                                    pending.push_back(SessionEvent::HandshakeSucceeded);
                                }
                                Err(e) => pending.push_back(SessionEvent::HandshakeFailed {
                                    error: e.to_string(),
                                }),
                            },
                            SessionAction::ReplaySubscriptions => {
                                for (old_id, sub, stream) in ledger.replay_order() {
                                    match transport.subscribe(&sub, stream).await {
                                        Ok(new_id) => ledger.reassign(old_id, new_id),
                                        Err(e) => {
                                            #[cfg(feature = "tracing")]
                                            tracing::warn!(
                                                symbol = %sub.symbol,
                                                error = %e,
                                                "subscription replay failed"
                                            );
                                            let _ = e;
                                        }
                                    }
                                }
                            }
                            SessionAction::EmitConnectionLost { reason } => {
                                let _ = ingress
                                    .emit(Event::integrity(
                                        provider_id,
                                        SYSTEM_SYMBOL,
                                        IntegrityKind::ConnectionLost,
                                        reason,
                                        0,
                                    ))
                                    .await;
                            }
                            SessionAction::ScheduleReconnect { delay_ms } => {
                                reconnect_timer = Some(Box::pin(tokio::time::sleep(
                                    Duration::from_millis(delay_ms),
                                )));
                            }
                            SessionAction::CloseTransport => transport.close().await,
                        }
                    }
                }

                if matches!(sm.state, SessionState::Closed) {
                    return;
                }

                let receiving = matches!(
                    sm.state,
                    SessionState::Connected { .. } | SessionState::Degraded { .. }
                );

                tokio::select! {
                    biased;
                    _ = &mut stop_rx => {
                        pending.push_back(SessionEvent::DisconnectRequested);
                    }
                    frame = transport.recv(), if receiving => match frame {
                        Ok(TransportFrame::Event(ev)) => {
                            last_pong = Instant::now();
                            if matches!(sm.state, SessionState::Degraded { .. }) {
                                pending.push_back(SessionEvent::HeartbeatRestored);
                            }
                            let _ = ingress.emit(ev).await;
                        }
                        Ok(TransportFrame::Pong) => {
                            last_pong = Instant::now();
                            if matches!(sm.state, SessionState::Degraded { .. }) {
                                pending.push_back(SessionEvent::HeartbeatRestored);
                            }
                        }
                        Ok(TransportFrame::Closed) => {
                            pending.push_back(SessionEvent::TransportError {
                                error: "peer closed the connection".to_string(),
                            });
                        }
                        Err(e) => {
                            pending.push_back(SessionEvent::TransportError {
                                error: e.to_string(),
                            });
                        }
                    },
                    _ = heartbeat_tick.tick(), if receiving => {
                        let _ = transport.ping().await;
                        if last_pong.elapsed() > cfg.heartbeat_timeout + cfg.heartbeat_interval {
                            pending.push_back(SessionEvent::HeartbeatTimeout);
                        }
                    }
                    () = async { reconnect_timer.as_mut().unwrap().await }, if reconnect_timer.is_some() => {
                        reconnect_timer = None;
                        pending.push_back(SessionEvent::ReconnectTick);
                    }
                }
            }
        });
        SessionHandle::new(join, stop_tx)
    }
}
