//! Collector facade: wires connectors, pipeline, coordinator, failover,
//! and backfill into one running service.

use std::sync::Arc;

use tickd_core::connector::TickdConnector;
use tickd_core::normalize::EventIngress;
use tickd_core::pipeline::{EventPipeline, MetricsSnapshot};
use tickd_core::registry::ProviderRegistry;
use tickd_core::sink::EventSink;
use tickd_core::stream::SessionHandle;
use tickd_core::TickdError;
use tickd_middleware::ConnectorBuilder;
use tickd_types::{
    BackfillConfig, BackfillRequest, BackfillRun, CircuitBreakerConfig, ConnectionEvent,
    FailoverConfig, FailoverEvent, HealthMonitorConfig, PipelineConfig, RetryConfig,
    StorageConfig, SymbolSubscriptionSet,
};
use tokio::sync::watch;

use crate::backfill::{BackfillOrchestrator, load_last_run};
use crate::coordinator::{ReconcileReport, SubscriptionCoordinator};
use crate::failover::FailoverSupervisor;
use crate::health::ConnectionHealthMonitor;
use crate::sink::JsonlSink;

/// Builder for constructing a [`Collector`] with custom configuration.
pub struct CollectorBuilder {
    connectors: Vec<Arc<dyn TickdConnector>>,
    pipeline: PipelineConfig,
    storage: StorageConfig,
    failover: FailoverConfig,
    health: HealthMonitorConfig,
    backfill: BackfillConfig,
    sink: Option<Box<dyn EventSink>>,
    mirror: Option<Box<dyn EventSink>>,
}

impl Default for CollectorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CollectorBuilder {
    /// Create a new builder with sensible defaults.
    ///
    /// Behavior and trade-offs:
    /// - Starts with no connectors; you must register at least one via
    ///   `with_connector`.
    /// - The default sink is the JSONL file sink under
    ///   `StorageConfig::data_root`; override with `sink` for parquet or
    ///   bus-backed deployments.
    /// - The default pipeline drops oldest under pressure, which fits live
    ///   low-value-per-tick streams; backfills publish with their own
    ///   blocking pipeline regardless.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connectors: Vec::new(),
            pipeline: PipelineConfig::default(),
            storage: StorageConfig::default(),
            failover: FailoverConfig::default(),
            health: HealthMonitorConfig::default(),
            backfill: BackfillConfig::default(),
            sink: None,
            mirror: None,
        }
    }

    /// Register a provider connector.
    ///
    /// Behavior and trade-offs:
    /// - Registration order is the tiebreak when no failover rule names a
    ///   primary: the first streaming-capable connector becomes active.
    /// - Duplicates are not deduplicated; avoid registering the same
    ///   connector twice.
    #[must_use]
    pub fn with_connector(mut self, c: Arc<dyn TickdConnector>) -> Self {
        self.connectors.push(c);
        self
    }

    /// Register a connector wrapped in the default resilience stack:
    /// retry, circuit breaker, and a rate limiter honoring the connector's
    /// own declared limits.
    ///
    /// Behavior and trade-offs:
    /// - Right for HTTP historical vendors whose transient failures should
    ///   be absorbed locally. Streaming reconnects are the session's job,
    ///   so pure streaming connectors rarely need this.
    ///
    /// # Errors
    /// Returns `InvalidMiddlewareStack` when the composed stack fails
    /// validation.
    pub fn with_resilient_connector(
        self,
        c: Arc<dyn TickdConnector>,
    ) -> Result<Self, TickdError> {
        let declared_limit = c
            .as_history_provider()
            .map(tickd_core::connector::HistoryProvider::rate_limit)
            .unwrap_or_default();
        let wrapped = ConnectorBuilder::new(c)
            .with_retry(RetryConfig::default())
            .with_circuit_breaker(CircuitBreakerConfig::default())
            .with_rate_limit(declared_limit)
            .build()?;
        Ok(self.with_connector(wrapped))
    }

    /// Configure the event pipeline.
    #[must_use]
    pub fn pipeline(mut self, cfg: PipelineConfig) -> Self {
        self.pipeline = cfg;
        self
    }

    /// Configure storage for the default sink and the backfill status file.
    #[must_use]
    pub fn storage(mut self, cfg: StorageConfig) -> Self {
        self.storage = cfg;
        self
    }

    /// Configure failover rules and the evaluation cadence.
    #[must_use]
    pub fn failover(mut self, cfg: FailoverConfig) -> Self {
        self.failover = cfg;
        self
    }

    /// Configure the connection health monitor.
    #[must_use]
    pub fn health(mut self, cfg: HealthMonitorConfig) -> Self {
        self.health = cfg;
        self
    }

    /// Configure backfill defaults (provider selection, fallback, symbol
    /// resolution) used by [`Collector::backfill_symbols`].
    #[must_use]
    pub fn backfill_defaults(mut self, cfg: BackfillConfig) -> Self {
        self.backfill = cfg;
        self
    }

    /// Replace the default JSONL sink.
    #[must_use]
    pub fn sink(mut self, sink: Box<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Mirror every batch to a secondary sink (e.g. a bus publisher).
    ///
    /// Behavior and trade-offs:
    /// - Mirror failures are counted but never fail or slow the primary
    ///   path; the mirror is best-effort by design of the pipeline.
    #[must_use]
    pub fn mirror(mut self, mirror: Box<dyn EventSink>) -> Self {
        self.mirror = Some(mirror);
        self
    }

    /// Build the collector and spawn its background tasks.
    ///
    /// # Errors
    /// - `InvalidArg` if no connectors have been registered.
    /// - `Config` if a failover rule references an unregistered provider.
    /// - `Data` if the persisted backfill status file exists but is
    ///   corrupted (startup aborts rather than overwriting evidence).
    pub fn build(self) -> Result<Collector, TickdError> {
        if self.connectors.is_empty() {
            return Err(TickdError::InvalidArg(
                "no connectors registered; add at least one via with_connector(...)".to_string(),
            ));
        }

        let known: std::collections::HashSet<&str> =
            self.connectors.iter().map(|c| c.id()).collect();
        for rule in &self.failover.rules {
            let mut referenced: Vec<&str> = vec![rule.primary_provider_id.as_str()];
            referenced.extend(rule.backup_provider_ids.iter().map(String::as_str));
            for id in referenced {
                if !known.contains(id) {
                    return Err(TickdError::Config(format!(
                        "failover rule {} references unknown provider {id}",
                        rule.id
                    )));
                }
            }
        }

        let registry = Arc::new(ProviderRegistry::from_connectors(self.connectors));
        let orchestrator = BackfillOrchestrator::new(Arc::clone(&registry), self.storage.clone())
            .with_defaults(self.backfill);
        // A corrupted status file is a fatal configuration problem; refuse
        // to start over it.
        load_last_run(&orchestrator.status_path())?;

        let sink = self
            .sink
            .unwrap_or_else(|| Box::new(JsonlSink::new(self.storage.clone())));
        let pipeline = EventPipeline::spawn_with_mirror(self.pipeline, sink, self.mirror);
        let ingress = EventIngress::new(pipeline.clone());

        let supervisor = FailoverSupervisor::with_pipeline(self.failover, pipeline.clone());
        let monitor = ConnectionHealthMonitor::spawn(self.health);

        let active = Self::initial_active(&registry, &supervisor);
        let coordinator = active.map(SubscriptionCoordinator::new).map(Arc::new);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Collector {
            registry,
            pipeline,
            ingress,
            supervisor,
            monitor,
            coordinator,
            orchestrator,
            tasks: std::sync::Mutex::new(Vec::new()),
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// Initial active streaming provider: the primary of the first rule
    /// when it is streaming-capable, otherwise the first streaming
    /// connector in registration order.
    fn initial_active(
        registry: &Arc<ProviderRegistry>,
        supervisor: &FailoverSupervisor,
    ) -> Option<Arc<dyn TickdConnector>> {
        if let Some(rule) = supervisor.rules().first()
            && let Some(primary) = registry.get(&rule.primary_provider_id)
            && primary.as_streaming_provider().is_some()
        {
            return Some(primary);
        }
        registry.streaming().into_iter().next()
    }
}

/// The running collection service.
pub struct Collector {
    registry: Arc<ProviderRegistry>,
    pipeline: EventPipeline,
    ingress: EventIngress,
    supervisor: FailoverSupervisor,
    monitor: ConnectionHealthMonitor,
    coordinator: Option<Arc<SubscriptionCoordinator>>,
    orchestrator: BackfillOrchestrator,
    tasks: std::sync::Mutex<Vec<SessionHandle>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Collector {
    /// Start building a new `Collector` instance.
    #[must_use]
    pub fn builder() -> CollectorBuilder {
        CollectorBuilder::new()
    }

    /// Connect the active streaming provider and start the supervision
    /// loops: periodic failover evaluation, health-event scoring, and
    /// re-pointing subscriptions when a failover fires.
    ///
    /// # Errors
    /// Propagates the active provider's `connect` failure. Idempotent
    /// otherwise: already-running loops are not duplicated.
    pub async fn start(&self) -> Result<(), TickdError> {
        if let Some(coordinator) = &self.coordinator {
            // Connect whatever provider the coordinator currently points at.
            let active = self.active_streaming_provider();
            if let Some(provider) = active {
                self.monitor.register(provider.id());
                if let Some(streaming) = provider.as_streaming_provider() {
                    streaming.connect(self.ingress.clone()).await?;
                }
            }

            {
                let mut tasks = self.tasks.lock().expect("mutex poisoned");
                if !tasks.is_empty() {
                    return Ok(());
                }
                tasks.push(self.supervisor.start());
                tasks.push(self.spawn_health_scoring());
                tasks.push(self.spawn_failover_reactions(Arc::clone(coordinator)));
            }
        }
        Ok(())
    }

    fn active_streaming_provider(&self) -> Option<Arc<dyn TickdConnector>> {
        if let Some(rule) = self.supervisor.rules().first()
            && let Some(active) = self.supervisor.active_provider_of(&rule.id)
        {
            return self.registry.get(&active);
        }
        self.registry.streaming().into_iter().next()
    }

    /// Forward health-monitor events into failover health scoring.
    fn spawn_health_scoring(&self) -> SessionHandle {
        let mut events = self.monitor.subscribe();
        let supervisor = self.supervisor.clone();
        let mut shutdown = self.shutdown_rx.clone();
        let join = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.wait_for(|stopped| *stopped) => return,
                    event = events.recv() => match event {
                        Ok(ConnectionEvent::ConnectionLost { id, reason }) => {
                            supervisor.record_failure(&id, reason);
                        }
                        Ok(ConnectionEvent::ConnectionRecovered { id }) => {
                            supervisor.record_success(&id, None);
                        }
                        Ok(ConnectionEvent::HeartbeatMissed { .. }) => {}
                        Ok(_) => {}
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
                    },
                }
            }
        });
        SessionHandle::new_abort_only(join)
    }

    /// React to failover switches by re-pointing the coordinator at the
    /// newly elected provider.
    fn spawn_failover_reactions(&self, coordinator: Arc<SubscriptionCoordinator>) -> SessionHandle {
        let mut events = self.supervisor.subscribe();
        let registry = Arc::clone(&self.registry);
        let ingress = self.ingress.clone();
        let monitor_registrar = self.monitor_registrar();
        let mut shutdown = self.shutdown_rx.clone();
        let join = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = async { let _ = shutdown.wait_for(|stopped| *stopped).await; } => return,
                    event = events.recv() => match event {
                        Ok(FailoverEvent::FailoverTriggered { to, .. }
                            | FailoverEvent::FailoverRecovered { to, .. }) => {
                            let Some(provider) = registry.get(&to) else {
                                continue;
                            };
                            if let Some(streaming) = provider.as_streaming_provider()
                                && let Err(_e) = streaming.connect(ingress.clone()).await
                            {
                                #[cfg(feature = "tracing")]
                                tracing::warn!(provider = %to, error = %_e, "connect after failover failed");
                            }
                            monitor_registrar(provider.id());
                            let _ = coordinator.repoint(provider).await;
                        }
                        Ok(_) => {}
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
                    },
                }
            }
        });
        SessionHandle::new_abort_only(join)
    }

    fn monitor_registrar(&self) -> impl Fn(&str) + Send + 'static {
        let monitor = self.monitor.handle();
        move |id: &str| monitor.register(id)
    }

    /// Apply a (re)loaded symbol configuration.
    ///
    /// # Errors
    /// `Unsupported` when no streaming-capable connector is registered.
    pub async fn apply(
        &self,
        config: &SymbolSubscriptionSet,
    ) -> Result<ReconcileReport, TickdError> {
        let coordinator = self
            .coordinator
            .as_ref()
            .ok_or_else(|| TickdError::unsupported("stream-trades"))?;
        Ok(coordinator.apply(config).await)
    }

    /// Run a historical backfill through the shared pipeline.
    ///
    /// # Errors
    /// See [`BackfillOrchestrator::run`].
    pub async fn backfill(&self, request: BackfillRequest) -> Result<BackfillRun, TickdError> {
        self.orchestrator
            .run(request, &self.pipeline, &self.shutdown_rx)
            .await
    }

    /// Backfill `symbols` using the configured backfill defaults.
    ///
    /// # Errors
    /// See [`BackfillOrchestrator::run`].
    pub async fn backfill_symbols(
        &self,
        symbols: Vec<String>,
        from: Option<chrono::NaiveDate>,
        to: Option<chrono::NaiveDate>,
    ) -> Result<BackfillRun, TickdError> {
        let request = self.orchestrator.request_from_defaults(symbols, from, to);
        self.backfill(request).await
    }

    /// Block until everything published so far is durable.
    ///
    /// # Errors
    /// Returns the sink's terminal error, if one occurred.
    pub async fn flush(&self) -> Result<(), TickdError> {
        self.pipeline.flush().await
    }

    /// Stop supervision loops, drain the pipeline, and close the sink.
    ///
    /// # Errors
    /// Returns the final flush/close error from the sink.
    pub async fn shutdown(&self) -> Result<(), TickdError> {
        let _ = self.shutdown_tx.send(true);
        let tasks: Vec<SessionHandle> = {
            let mut guard = self.tasks.lock().expect("mutex poisoned");
            guard.drain(..).collect()
        };
        for task in tasks {
            task.stop().await;
        }
        if let Some(provider) = self.active_streaming_provider()
            && let Some(streaming) = provider.as_streaming_provider()
        {
            let _ = streaming.disconnect().await;
        }
        self.pipeline.close().await
    }

    /// Pipeline counter snapshot.
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.pipeline.metrics()
    }

    /// The failover supervisor (force switches, snapshots, subscriptions).
    #[must_use]
    pub fn supervisor(&self) -> &FailoverSupervisor {
        &self.supervisor
    }

    /// The connection health monitor.
    #[must_use]
    pub fn monitor(&self) -> &ConnectionHealthMonitor {
        &self.monitor
    }

    /// The subscription coordinator, when a streaming connector exists.
    #[must_use]
    pub fn coordinator(&self) -> Option<&Arc<SubscriptionCoordinator>> {
        self.coordinator.as_ref()
    }

    /// The provider registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// The normalizing ingress adapters emit through.
    #[must_use]
    pub fn ingress(&self) -> &EventIngress {
        &self.ingress
    }
}
