//! Boundary normalizer applied between vendor adapters and the pipeline,
//! plus the per-key sequence gate that suppresses duplicates and flags
//! gaps.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::TickdError;
use crate::pipeline::{EventPipeline, PublishOutcome};
use tickd_types::{
    AggressorSide, Event, EventKind, EventPayload, IntegrityKind, Tier, canonicalize_symbol,
};

/// Map a vendor-reported side string to the canonical enum. Anything
/// outside buy/sell becomes [`AggressorSide::Unknown`]; downstream may
/// infer the side from BBO.
#[must_use]
pub fn side_from_vendor(raw: &str) -> AggressorSide {
    match raw.trim().to_ascii_lowercase().as_str() {
        "b" | "buy" | "bid" => AggressorSide::Buy,
        "s" | "sell" | "ask" | "offer" => AggressorSide::Sell,
        _ => AggressorSide::Unknown,
    }
}

/// Outcome of normalizing one event.
#[derive(Debug)]
pub enum Normalized {
    /// The event passed validation; the normalized form is returned.
    Accepted(Event),
    /// The event violated an invariant and was replaced by an integrity
    /// event describing the rejection.
    Rejected(Event),
}

/// Canonicalize an event at the adapter/pipeline boundary.
///
/// - symbol: trimmed, uppercased into `canonical_symbol` (identity when
///   already canonical);
/// - timestamp: the event model stores UTC instants, so the offset is
///   already zero; the instant is preserved;
/// - bars: OHLC-validated, violating bars are rejected with
///   `Integrity { InvalidBar }`;
/// - tier: marked [`Tier::Normalized`].
///
/// Idempotent: `normalize(normalize(x)) == normalize(x)`.
#[must_use]
pub fn normalize(mut event: Event) -> Normalized {
    if let EventPayload::Bar {
        open,
        high,
        low,
        close,
        ..
    } = &event.payload
    {
        let positive = *open > rust_decimal::Decimal::ZERO
            && *high > rust_decimal::Decimal::ZERO
            && *low > rust_decimal::Decimal::ZERO
            && *close > rust_decimal::Decimal::ZERO;
        let ordered = *low <= (*open).min(*close) && (*open).max(*close) <= *high;
        if !(positive && ordered) {
            let reject = Event::integrity(
                event.source.clone(),
                canonicalize_symbol(&event.symbol),
                IntegrityKind::InvalidBar,
                format!("discarded bar with incoherent ohlc for {}", event.symbol),
                1,
            );
            return Normalized::Rejected(reject);
        }
    }
    if event.kind != EventKind::Heartbeat {
        event.canonical_symbol = Some(canonicalize_symbol(&event.symbol));
    }
    event.tier = Tier::Normalized;
    Normalized::Accepted(event)
}

/// Verdict of the sequence gate for one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// First observation of the key, or the next expected sequence.
    Fresh,
    /// A gap precedes this sequence; the event is still admitted.
    Gap {
        /// Number of sequence values skipped.
        missing: u64,
    },
    /// Same sequence seen before; the event must be dropped.
    Duplicate,
    /// Sequence below the last admitted one; the event must be dropped.
    OutOfOrder,
}

type GateEntry = (u64, Instant);
type GateMap = HashMap<String, GateEntry>;
type GateState = Arc<Mutex<GateMap>>;

const REAPER_INTERVAL: Duration = Duration::from_secs(60 * 15);
const ENTRY_TTL: Duration = Duration::from_secs(60 * 60 * 24);

/// Tracks the last admitted sequence per `(source, symbol, kind)` key.
///
/// Entries idle for a day are reaped by a background task that holds only a
/// weak reference, so dropping the gate stops the reaper.
pub struct SequenceGate {
    state: GateState,
}

impl Default for SequenceGate {
    fn default() -> Self {
        Self::new()
    }
}

impl SequenceGate {
    /// Create a gate and spawn its reaper task.
    #[must_use]
    pub fn new() -> Self {
        let state: GateState = Arc::new(Mutex::new(HashMap::new()));

        let weak: Weak<Mutex<GateMap>> = Arc::downgrade(&state);

        tokio::spawn(async move {
            loop {
                tokio::time::sleep(REAPER_INTERVAL).await;
                if let Some(state_arc) = weak.upgrade() {
                    let mut guard = state_arc.lock().await;
                    let now = Instant::now();
                    guard.retain(|_, (_, last_seen)| now.duration_since(*last_seen) <= ENTRY_TTL);
                } else {
                    break;
                }
            }
        });

        Self { state }
    }

    fn key(event: &Event) -> String {
        format!(
            "{}|{}|{}",
            event.source,
            event.effective_symbol(),
            event.kind
        )
    }

    /// Judge an event's sequence. Events with `sequence == 0` (unassigned)
    /// are always fresh and not tracked.
    pub async fn admit(&self, event: &Event) -> Admission {
        if event.sequence == 0 {
            return Admission::Fresh;
        }
        use std::collections::hash_map::Entry;
        let mut guard = self.state.lock().await;
        let now = Instant::now();
        match guard.entry(Self::key(event)) {
            Entry::Occupied(mut e) => {
                let (prev, last_seen) = e.get_mut();
                *last_seen = now;
                if event.sequence == *prev {
                    return Admission::Duplicate;
                }
                if event.sequence < *prev {
                    return Admission::OutOfOrder;
                }
                let missing = event.sequence - *prev - 1;
                *prev = event.sequence;
                if missing > 0 {
                    Admission::Gap { missing }
                } else {
                    Admission::Fresh
                }
            }
            Entry::Vacant(e) => {
                e.insert((event.sequence, now));
                Admission::Fresh
            }
        }
    }

    /// Forget tracked keys for a source, e.g. after the upstream feed
    /// signals a sequence reset.
    pub async fn reset_source(&self, source: &str) {
        let prefix = format!("{source}|");
        let mut guard = self.state.lock().await;
        guard.retain(|k, _| !k.starts_with(&prefix));
    }
}

/// The single boundary through which adapters emit events: normalizer,
/// sequence gate, then pipeline publish.
#[derive(Clone)]
pub struct EventIngress {
    pipeline: EventPipeline,
    gate: Arc<SequenceGate>,
}

impl EventIngress {
    /// Build an ingress over a pipeline with a fresh gate.
    #[must_use]
    pub fn new(pipeline: EventPipeline) -> Self {
        Self {
            pipeline,
            gate: Arc::new(SequenceGate::new()),
        }
    }

    /// Build an ingress sharing an existing gate (one gate per collector,
    /// shared across providers, keeps keys distinct by source).
    #[must_use]
    pub fn with_gate(pipeline: EventPipeline, gate: Arc<SequenceGate>) -> Self {
        Self { pipeline, gate }
    }

    /// Normalize, gate, and publish one event.
    ///
    /// Duplicates and out-of-order events are dropped and replaced by
    /// integrity events; gaps admit the event after an integrity event
    /// flagging the missing range.
    pub async fn emit(&self, event: Event) -> Result<PublishOutcome, TickdError> {
        let event = match normalize(event) {
            Normalized::Accepted(ev) => ev,
            Normalized::Rejected(integrity) => return self.pipeline.publish(integrity).await,
        };
        match self.gate.admit(&event).await {
            Admission::Fresh => self.pipeline.publish(event).await,
            Admission::Gap { missing } => {
                let gap = Event::integrity(
                    event.source.clone(),
                    event.effective_symbol().to_string(),
                    IntegrityKind::SequenceGap,
                    format!("missing {missing} sequence value(s) before {}", event.sequence),
                    missing,
                );
                let _ = self.pipeline.publish(gap).await;
                self.pipeline.publish(event).await
            }
            Admission::Duplicate => {
                let dup = Event::integrity(
                    event.source.clone(),
                    event.effective_symbol().to_string(),
                    IntegrityKind::Duplicate,
                    format!("suppressed duplicate sequence {}", event.sequence),
                    1,
                );
                self.pipeline.publish(dup).await
            }
            Admission::OutOfOrder => {
                let ooo = Event::integrity(
                    event.source.clone(),
                    event.effective_symbol().to_string(),
                    IntegrityKind::OutOfOrder,
                    format!("dropped out-of-order sequence {}", event.sequence),
                    1,
                );
                self.pipeline.publish(ooo).await
            }
        }
    }

    /// Direct access to the underlying pipeline (flush barriers, metrics).
    #[must_use]
    pub fn pipeline(&self) -> &EventPipeline {
        &self.pipeline
    }

    /// The gate shared by this ingress.
    #[must_use]
    pub fn gate(&self) -> &Arc<SequenceGate> {
        &self.gate
    }
}
