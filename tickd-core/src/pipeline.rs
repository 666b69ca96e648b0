//! Bounded multi-producer / single-consumer event pipeline.
//!
//! Producers publish canonical events from vendor callback tasks; a single
//! consumer drains them in batches into the sink. A single consumer keeps
//! FIFO order across all producers, which preserves per-`(source, symbol,
//! kind)` order because producers already emit monotonically.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::{Notify, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::TickdError;
use crate::sink::{EventSink, SinkError};
use tickd_types::{
    BackpressurePolicy, Event, IntegrityKind, PipelineConfig, SYSTEM_SYMBOL,
};

/// Source id stamped on events the pipeline itself emits.
const PIPELINE_SOURCE: &str = "pipeline";

/// Maximum attempts for a retryable sink write before the batch is dropped.
const MAX_WRITE_ATTEMPTS: u32 = 5;

/// Result of a publish attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The event was accepted.
    Published,
    /// The event was accepted but the queue was full and the oldest
    /// undrained event was discarded (drop-oldest policy only).
    Overflowed,
    /// The pipeline is closed; the event was discarded.
    Closed,
}

/// Result of pushing into the bounded queue.
#[derive(Debug)]
pub enum PushResult {
    /// Enqueued with room to spare.
    Queued,
    /// Enqueued; the oldest undrained event was discarded to make room.
    QueuedDroppingOldest,
    /// Queue full under the block policy; the caller must wait and retry.
    Full(Event),
}

/// Synchronous bounded queue core used by the pipeline.
///
/// Overflow drops are coalesced: however many events were discarded since
/// the last drain, a single `Integrity { condition: Overflow, dropped }`
/// event is emitted ahead of the next drained batch.
#[derive(Debug)]
pub struct OverflowQueue {
    capacity: usize,
    policy: BackpressurePolicy,
    deque: VecDeque<Event>,
    dropped_pending: u64,
}

impl OverflowQueue {
    /// Create a queue with the given capacity and backpressure policy.
    #[must_use]
    pub fn new(capacity: usize, policy: BackpressurePolicy) -> Self {
        Self {
            capacity: capacity.max(1),
            policy,
            deque: VecDeque::with_capacity(capacity.min(4096)),
            dropped_pending: 0,
        }
    }

    /// Push an event, applying the backpressure policy when full.
    pub fn push(&mut self, event: Event) -> PushResult {
        if self.deque.len() < self.capacity {
            self.deque.push_back(event);
            return PushResult::Queued;
        }
        match self.policy {
            BackpressurePolicy::DropOldest => {
                self.deque.pop_front();
                self.dropped_pending += 1;
                self.deque.push_back(event);
                PushResult::QueuedDroppingOldest
            }
            BackpressurePolicy::Block => PushResult::Full(event),
            _ => unreachable!("BackpressurePolicy is non_exhaustive across crates"),
        }
    }

    /// Drain up to `max` events. When drops occurred since the last drain,
    /// the returned batch starts with one coalesced overflow integrity
    /// event.
    pub fn drain(&mut self, max: usize) -> Vec<Event> {
        let mut out = Vec::new();
        if self.dropped_pending > 0 {
            out.push(Event::integrity(
                PIPELINE_SOURCE,
                SYSTEM_SYMBOL,
                IntegrityKind::Overflow,
                "queue overflow; oldest events discarded",
                self.dropped_pending,
            ));
            self.dropped_pending = 0;
        }
        while out.len() < max {
            match self.deque.pop_front() {
                Some(ev) => out.push(ev),
                None => break,
            }
        }
        out
    }

    /// Number of queued events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.deque.len()
    }

    /// Whether no events (and no pending overflow marker) are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deque.is_empty() && self.dropped_pending == 0
    }
}

/// Monotonic counters exposed by the pipeline.
#[derive(Debug, Default)]
struct Counters {
    published: AtomicU64,
    dropped: AtomicU64,
    batches: AtomicU64,
    events_written: AtomicU64,
    sink_failures: AtomicU64,
}

/// Point-in-time view of the pipeline counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Events accepted by `publish`.
    pub published: u64,
    /// Events discarded under drop-oldest backpressure.
    pub dropped: u64,
    /// Batches handed to the sink.
    pub batches: u64,
    /// Events durably written.
    pub events_written: u64,
    /// Batches lost to sink failures.
    pub sink_failures: u64,
}

struct Shared {
    queue: StdMutex<OverflowQueue>,
    data_available: Notify,
    space_available: Notify,
    closed: AtomicBool,
    terminal: StdMutex<Option<String>>,
    counters: Counters,
}

impl Shared {
    fn terminal_error(&self) -> Option<TickdError> {
        self.terminal
            .lock()
            .expect("mutex poisoned")
            .as_ref()
            .map(|msg| TickdError::SinkTerminal(msg.clone()))
    }
}

enum Command {
    Flush(oneshot::Sender<Result<(), TickdError>>),
    Close(oneshot::Sender<Result<(), TickdError>>),
}

/// Cloneable handle to a running event pipeline.
pub struct EventPipeline {
    shared: Arc<Shared>,
    cmd_tx: mpsc::Sender<Command>,
    shutdown_rx: watch::Receiver<bool>,
    consumer: Arc<StdMutex<Option<JoinHandle<()>>>>,
}

impl Clone for EventPipeline {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            cmd_tx: self.cmd_tx.clone(),
            shutdown_rx: self.shutdown_rx.clone(),
            consumer: Arc::clone(&self.consumer),
        }
    }
}

impl EventPipeline {
    /// Spawn a pipeline draining into `sink`.
    #[must_use]
    pub fn spawn(cfg: PipelineConfig, sink: Box<dyn EventSink>) -> Self {
        Self::spawn_with_mirror(cfg, sink, None)
    }

    /// Spawn a pipeline that additionally mirrors every batch to a
    /// secondary sink (e.g. an external bus publisher). Mirror failures are
    /// counted but never block or fail the primary path.
    #[must_use]
    pub fn spawn_with_mirror(
        cfg: PipelineConfig,
        sink: Box<dyn EventSink>,
        mirror: Option<Box<dyn EventSink>>,
    ) -> Self {
        let shared = Arc::new(Shared {
            queue: StdMutex::new(OverflowQueue::new(cfg.capacity, cfg.backpressure)),
            data_available: Notify::new(),
            space_available: Notify::new(),
            closed: AtomicBool::new(false),
            terminal: StdMutex::new(None),
            counters: Counters::default(),
        });
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let consumer = tokio::spawn(consumer_loop(
            cfg,
            Arc::clone(&shared),
            sink,
            mirror,
            cmd_rx,
            shutdown_tx,
        ));
        Self {
            shared,
            cmd_tx,
            shutdown_rx,
            consumer: Arc::new(StdMutex::new(Some(consumer))),
        }
    }

    /// Publish one event.
    ///
    /// Under drop-oldest this never suspends: the call is O(1) and a full
    /// queue discards the oldest undrained event, reported as
    /// [`PublishOutcome::Overflowed`]. Under the block policy the call
    /// suspends until space frees up, returning `Err(Cancelled)` if the
    /// pipeline shuts down first.
    pub async fn publish(&self, event: Event) -> Result<PublishOutcome, TickdError> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Ok(PublishOutcome::Closed);
        }
        let mut pending = event;
        loop {
            let result = {
                let mut q = self.shared.queue.lock().expect("mutex poisoned");
                q.push(pending)
            };
            match result {
                PushResult::Queued => {
                    self.shared.counters.published.fetch_add(1, Ordering::Relaxed);
                    self.shared.data_available.notify_one();
                    return Ok(PublishOutcome::Published);
                }
                PushResult::QueuedDroppingOldest => {
                    self.shared.counters.published.fetch_add(1, Ordering::Relaxed);
                    self.shared.counters.dropped.fetch_add(1, Ordering::Relaxed);
                    self.shared.data_available.notify_one();
                    return Ok(PublishOutcome::Overflowed);
                }
                PushResult::Full(ev) => {
                    pending = ev;
                    let mut shutdown = self.shutdown_rx.clone();
                    tokio::select! {
                        () = self.shared.space_available.notified() => {}
                        _ = shutdown.wait_for(|stopped| *stopped) => {
                            return Err(TickdError::Cancelled);
                        }
                    }
                    if self.shared.closed.load(Ordering::Acquire) {
                        return Err(TickdError::Cancelled);
                    }
                }
            }
        }
    }

    /// Block until every previously published event is durable in the sink.
    ///
    /// # Errors
    /// Returns the sink's terminal error, if one has occurred, so callers
    /// can decide to abort.
    pub async fn flush(&self) -> Result<(), TickdError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Flush(tx))
            .await
            .map_err(|_| TickdError::Cancelled)?;
        rx.await.map_err(|_| TickdError::Cancelled)?
    }

    /// Flush remaining events, close the sink, and stop the consumer.
    ///
    /// # Errors
    /// Returns the sink's terminal error when the final flush failed.
    pub async fn close(&self) -> Result<(), TickdError> {
        let (tx, rx) = oneshot::channel();
        if self.cmd_tx.send(Command::Close(tx)).await.is_err() {
            // Consumer already gone; nothing left to close.
            return Ok(());
        }
        let result = rx.await.map_err(|_| TickdError::Cancelled)?;
        let handle = self.consumer.lock().expect("mutex poisoned").take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        result
    }

    /// Current counter values.
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        let c = &self.shared.counters;
        MetricsSnapshot {
            published: c.published.load(Ordering::Relaxed),
            dropped: c.dropped.load(Ordering::Relaxed),
            batches: c.batches.load(Ordering::Relaxed),
            events_written: c.events_written.load(Ordering::Relaxed),
            sink_failures: c.sink_failures.load(Ordering::Relaxed),
        }
    }
}

struct SinkState {
    sink: Box<dyn EventSink>,
    mirror: Option<Box<dyn EventSink>>,
    /// Set while consecutive writes are failing so at most one
    /// `SinkFailure` marker is queued per failure streak. Without this a
    /// failing sink would re-fail its own marker batch forever.
    failure_streak: bool,
}

async fn consumer_loop(
    cfg: PipelineConfig,
    shared: Arc<Shared>,
    sink: Box<dyn EventSink>,
    mirror: Option<Box<dyn EventSink>>,
    mut cmd_rx: mpsc::Receiver<Command>,
    shutdown_tx: watch::Sender<bool>,
) {
    let mut sinks = SinkState {
        sink,
        mirror,
        failure_streak: false,
    };
    let mut flush_tick = tokio::time::interval(cfg.periodic_flush);
    flush_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        let has_data = !shared.queue.lock().expect("mutex poisoned").is_empty();
        if has_data {
            let batch = collect_batch(&cfg, &shared).await;
            if !batch.is_empty() {
                write_batch(&shared, &mut sinks, &batch).await;
            }
            continue;
        }

        tokio::select! {
            biased;
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(Command::Flush(reply)) => {
                        let result = drain_all_and_flush(&cfg, &shared, &mut sinks).await;
                        let _ = reply.send(result);
                    }
                    Some(Command::Close(reply)) => {
                        shared.closed.store(true, Ordering::Release);
                        let _ = shutdown_tx.send(true);
                        let mut result = drain_all_and_flush(&cfg, &shared, &mut sinks).await;
                        if let Err(e) = sinks.sink.close().await {
                            result = result.and(Err(TickdError::SinkTerminal(e.to_string())));
                        }
                        if let Some(m) = sinks.mirror.as_mut() {
                            let _ = m.close().await;
                        }
                        let _ = reply.send(result);
                        return;
                    }
                    None => {
                        // Every handle dropped without close(); drain what's
                        // left and stop.
                        let _ = drain_all_and_flush(&cfg, &shared, &mut sinks).await;
                        let _ = sinks.sink.close().await;
                        return;
                    }
                }
            }
            () = shared.data_available.notified() => {}
            _ = flush_tick.tick() => {
                if let Err(e) = sinks.sink.flush().await {
                    note_sink_error(&shared, &e);
                }
            }
        }
    }
}

/// Fill a batch up to `batch_size`, waiting at most `batch_interval` for
/// stragglers.
async fn collect_batch(cfg: &PipelineConfig, shared: &Arc<Shared>) -> Vec<Event> {
    let drain = |max: usize| {
        let mut q = shared.queue.lock().expect("mutex poisoned");
        let events = q.drain(max);
        drop(q);
        if !events.is_empty() {
            shared.space_available.notify_waiters();
        }
        events
    };

    let mut batch = drain(cfg.batch_size);
    let deadline = Instant::now() + cfg.batch_interval;
    while batch.len() < cfg.batch_size {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        tokio::select! {
            () = shared.data_available.notified() => {
                batch.extend(drain(cfg.batch_size - batch.len()));
            }
            () = tokio::time::sleep_until(deadline) => break,
        }
    }
    batch
}

async fn drain_all_and_flush(
    cfg: &PipelineConfig,
    shared: &Arc<Shared>,
    sinks: &mut SinkState,
) -> Result<(), TickdError> {
    loop {
        let batch = {
            let mut q = shared.queue.lock().expect("mutex poisoned");
            q.drain(cfg.batch_size)
        };
        if batch.is_empty() {
            break;
        }
        shared.space_available.notify_waiters();
        write_batch(shared, sinks, &batch).await;
    }
    if let Err(e) = sinks.sink.flush().await {
        note_sink_error(shared, &e);
    }
    shared.terminal_error().map_or(Ok(()), Err)
}

/// Write one batch, retrying retryable sink errors with bounded exponential
/// backoff. Terminal errors (or an exhausted retry budget) surface an
/// in-band `Integrity { SinkFailure }` event; the batch is dropped so the
/// pipeline never head-of-line blocks the whole process.
async fn write_batch(shared: &Arc<Shared>, sinks: &mut SinkState, batch: &[Event]) {
    let mut delay = Duration::from_millis(50);
    let mut attempts = 0u32;
    loop {
        match sinks.sink.write(batch).await {
            Ok(()) => {
                sinks.failure_streak = false;
                shared.counters.batches.fetch_add(1, Ordering::Relaxed);
                shared
                    .counters
                    .events_written
                    .fetch_add(batch.len() as u64, Ordering::Relaxed);
                break;
            }
            Err(e) if e.is_retryable() && attempts + 1 < MAX_WRITE_ATTEMPTS => {
                attempts += 1;
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(Duration::from_secs(5));
            }
            Err(e) => {
                note_sink_error(shared, &e);
                shared.counters.sink_failures.fetch_add(1, Ordering::Relaxed);
                if !sinks.failure_streak {
                    sinks.failure_streak = true;
                    let marker = Event::integrity(
                        PIPELINE_SOURCE,
                        SYSTEM_SYMBOL,
                        IntegrityKind::SinkFailure,
                        e.to_string(),
                        batch.len() as u64,
                    );
                    let mut q = shared.queue.lock().expect("mutex poisoned");
                    let _ = q.push(marker);
                }
                break;
            }
        }
    }
    if let Some(m) = sinks.mirror.as_mut()
        && m.write(batch).await.is_err()
    {
        shared.counters.sink_failures.fetch_add(1, Ordering::Relaxed);
    }
}

fn note_sink_error(shared: &Arc<Shared>, e: &SinkError) {
    if let SinkError::Terminal(msg) = e {
        let mut guard = shared.terminal.lock().expect("mutex poisoned");
        if guard.is_none() {
            *guard = Some(msg.clone());
        }
    }
    #[cfg(feature = "tracing")]
    tracing::warn!(error = %e, "sink write failed");
}
