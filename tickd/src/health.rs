//! Connection health monitor: per-connection heartbeat accounting and
//! loss/recovery events.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tickd_core::stream::SessionHandle;
use tickd_types::{ConnectionEvent, HealthMonitorConfig};
use tokio::sync::{broadcast, oneshot};
use tokio::time::Instant;

struct ConnState {
    last_data: Instant,
    last_heartbeat: Instant,
    reported_missed: u32,
    lost: bool,
    lost_at: Option<Instant>,
}

struct MonitorInner {
    cfg: HealthMonitorConfig,
    connections: StdMutex<HashMap<String, ConnState>>,
    events: broadcast::Sender<ConnectionEvent>,
}

impl MonitorInner {
    fn sweep(&self) {
        let now = Instant::now();
        let mut emissions: Vec<ConnectionEvent> = Vec::new();
        {
            let mut connections = self.connections.lock().expect("mutex poisoned");
            for (id, conn) in connections.iter_mut() {
                if conn.lost {
                    let recovered = conn
                        .lost_at
                        .is_some_and(|lost_at| conn.last_data > lost_at);
                    if recovered {
                        conn.lost = false;
                        conn.lost_at = None;
                        conn.reported_missed = 0;
                        conn.last_heartbeat = conn.last_data;
                        emissions.push(ConnectionEvent::ConnectionRecovered { id: id.clone() });
                    }
                    continue;
                }

                let silence = now.saturating_duration_since(conn.last_heartbeat);
                let interval = self.cfg.heartbeat_interval;
                if interval.is_zero() {
                    continue;
                }
                let missed =
                    u32::try_from(silence.as_millis() / interval.as_millis().max(1)).unwrap_or(0);
                if missed > conn.reported_missed {
                    conn.reported_missed = missed;
                    emissions.push(ConnectionEvent::HeartbeatMissed {
                        id: id.clone(),
                        missed_count: missed,
                    });
                }
                if missed >= self.cfg.lost_threshold {
                    conn.lost = true;
                    conn.lost_at = Some(now);
                    emissions.push(ConnectionEvent::ConnectionLost {
                        id: id.clone(),
                        reason: format!("{missed} heartbeat windows missed"),
                    });
                }
            }
        }
        // Deliver outside the lock.
        for event in emissions {
            let _ = self.events.send(event);
        }
    }
}

/// Periodically inspects registered connections and broadcasts
/// [`ConnectionEvent`]s. The failover supervisor is the primary subscriber.
pub struct ConnectionHealthMonitor {
    inner: Arc<MonitorInner>,
    _task: SessionHandle,
}

impl ConnectionHealthMonitor {
    /// Spawn the monitor's periodic task.
    #[must_use]
    pub fn spawn(cfg: HealthMonitorConfig) -> Self {
        let (events, _) = broadcast::channel(256);
        let inner = Arc::new(MonitorInner {
            cfg,
            connections: StdMutex::new(HashMap::new()),
            events,
        });

        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let task_inner = Arc::clone(&inner);
        let join = tokio::spawn(async move {
            let mut tick = tokio::time::interval(task_inner.cfg.check_interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = &mut stop_rx => return,
                    _ = tick.tick() => task_inner.sweep(),
                }
            }
        });

        Self {
            inner,
            _task: SessionHandle::new(join, stop_tx),
        }
    }

    /// Register a connection id; unknown ids are ignored by the recorders.
    pub fn register(&self, id: impl Into<String>) {
        self.handle().register(id);
    }

    /// Remove a connection from monitoring.
    pub fn deregister(&self, id: &str) {
        self.inner
            .connections
            .lock()
            .expect("mutex poisoned")
            .remove(id);
    }

    /// Record market data received on a connection. Data counts as
    /// liveness and drives loss recovery.
    pub fn record_data(&self, id: &str) {
        self.handle().record_data(id);
    }

    /// Record a heartbeat response on a connection.
    pub fn record_heartbeat(&self, id: &str) {
        self.handle().record_heartbeat(id);
    }

    /// Subscribe to connection events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.events.subscribe()
    }

    /// Lightweight cloneable handle for registering and recording from
    /// other tasks.
    #[must_use]
    pub fn handle(&self) -> MonitorHandle {
        MonitorHandle {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Force one inspection pass now. Used by tests to avoid waiting out
    /// the check interval.
    pub fn check_now(&self) {
        self.inner.sweep();
    }
}

/// Cloneable handle into the monitor for provider tasks.
#[derive(Clone)]
pub struct MonitorHandle {
    inner: Arc<MonitorInner>,
}

impl MonitorHandle {
    /// Register a connection id.
    pub fn register(&self, id: impl Into<String>) {
        let now = Instant::now();
        self.inner
            .connections
            .lock()
            .expect("mutex poisoned")
            .insert(
                id.into(),
                ConnState {
                    last_data: now,
                    last_heartbeat: now,
                    reported_missed: 0,
                    lost: false,
                    lost_at: None,
                },
            );
    }

    /// Record market data received on a connection.
    pub fn record_data(&self, id: &str) {
        let mut connections = self.inner.connections.lock().expect("mutex poisoned");
        if let Some(conn) = connections.get_mut(id) {
            conn.last_data = Instant::now();
            if !conn.lost {
                conn.last_heartbeat = conn.last_data;
                conn.reported_missed = 0;
            }
        }
    }

    /// Record a heartbeat response on a connection.
    pub fn record_heartbeat(&self, id: &str) {
        let mut connections = self.inner.connections.lock().expect("mutex poisoned");
        if let Some(conn) = connections.get_mut(id) {
            conn.last_heartbeat = Instant::now();
            if !conn.lost {
                conn.reported_missed = 0;
            }
        }
    }
}
