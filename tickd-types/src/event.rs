//! Canonical event model shared by every provider adapter and sink.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Schema version stamped on every event produced by this crate version.
pub const SCHEMA_VERSION: u16 = 1;

/// Symbol used by events that are not scoped to any instrument (heartbeats,
/// process-level integrity signals).
pub const SYSTEM_SYMBOL: &str = "SYSTEM";

static MONOTONIC: AtomicU64 = AtomicU64::new(1);

/// Next value of the process-wide monotonic tick counter.
///
/// Strictly increasing within a single process; used to stamp
/// [`Event::received_monotonic`] so consumers can order events independently
/// of wall-clock adjustments.
#[must_use]
pub fn next_monotonic() -> u64 {
    MONOTONIC.fetch_add(1, Ordering::Relaxed)
}

/// Returns `true` when `s` is acceptable as a raw or canonical symbol:
/// non-empty, at most 32 characters, ASCII-graphic, no embedded whitespace.
#[must_use]
pub fn is_valid_symbol(s: &str) -> bool {
    !s.is_empty() && s.len() <= 32 && s.chars().all(|c| c.is_ascii_graphic())
}

/// Canonicalize a raw symbol: trim surrounding whitespace and uppercase.
///
/// Idempotent: canonicalizing an already-canonical symbol returns it
/// unchanged.
#[must_use]
pub fn canonicalize_symbol(s: &str) -> String {
    s.trim().to_ascii_uppercase()
}

/// Processing stage marker on an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum Tier {
    /// As emitted by the provider adapter, before normalization.
    #[default]
    Raw,
    /// After the normalizer has canonicalized symbol, timestamp, and side.
    Normalized,
    /// After downstream enrichment (outside the collector core).
    Enriched,
}

/// Trade aggressor side. Anything a vendor reports outside buy/sell is
/// mapped to [`AggressorSide::Unknown`] by the normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum AggressorSide {
    /// Buyer-initiated trade.
    Buy,
    /// Seller-initiated trade.
    Sell,
    /// Side not reported or not recognized; downstream may infer from BBO.
    #[default]
    Unknown,
}

/// Option right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionRight {
    /// Call option.
    Call,
    /// Put option.
    Put,
}

/// One price level of an L2 order book snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthLevel {
    /// Level price.
    pub price: Decimal,
    /// Aggregate size resting at this price.
    pub size: Decimal,
}

/// In-band data-quality and system conditions surfaced as events so
/// consumers can detect them inline with the data stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum IntegrityKind {
    /// The pipeline discarded events under drop-oldest backpressure.
    Overflow,
    /// The sink surfaced a terminal error; one or more batches were lost.
    SinkFailure,
    /// A gap was observed in per-key sequence numbers.
    SequenceGap,
    /// A duplicate `(source, symbol, kind, sequence)` event was suppressed.
    Duplicate,
    /// An event arrived with a sequence below the last admitted one.
    OutOfOrder,
    /// The upstream feed signalled a sequence reset; informational only.
    Reset,
    /// A provider connection was lost.
    ConnectionLost,
    /// Failover wanted to switch but found no healthy backup provider.
    NoHealthyBackup,
    /// A historical bar failed OHLC validation and was discarded.
    InvalidBar,
    /// Cross-validation between two providers diverged beyond tolerance.
    CrossValidation,
}

/// High-level classification of an event; determines the payload shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum EventKind {
    /// An executed trade print.
    Trade,
    /// Top-of-book quote update.
    BboQuote,
    /// Level-2 order book snapshot.
    L2Snapshot,
    /// Aggregated order-flow delta.
    OrderFlow,
    /// Daily bar fetched from a historical provider.
    HistoricalBar,
    /// Bar aggregated from the live stream.
    AggregateBar,
    /// Option quote update.
    OptionQuote,
    /// Option trade print.
    OptionTrade,
    /// Option greeks snapshot.
    OptionGreeks,
    /// Option chain metadata (expirations).
    OptionChain,
    /// Open interest update.
    OpenInterest,
    /// In-band integrity signal.
    Integrity,
    /// Connection heartbeat; carries no instrument.
    Heartbeat,
}

impl EventKind {
    /// Stable kebab-case identifier used for sink directory names and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trade => "trade",
            Self::BboQuote => "bbo-quote",
            Self::L2Snapshot => "l2-snapshot",
            Self::OrderFlow => "order-flow",
            Self::HistoricalBar => "historical-bar",
            Self::AggregateBar => "aggregate-bar",
            Self::OptionQuote => "option-quote",
            Self::OptionTrade => "option-trade",
            Self::OptionGreeks => "option-greeks",
            Self::OptionChain => "option-chain",
            Self::OpenInterest => "open-interest",
            Self::Integrity => "integrity",
            Self::Heartbeat => "heartbeat",
        }
    }

    /// Topic name used when mirroring events to an external bus.
    #[must_use]
    pub const fn topic(self) -> &'static str {
        match self {
            Self::Trade => "trade_occurred",
            Self::BboQuote => "bbo_quote_updated",
            Self::L2Snapshot => "l2_snapshot_received",
            Self::OrderFlow => "order_flow_updated",
            Self::HistoricalBar => "historical_bar_written",
            Self::AggregateBar => "aggregate_bar_closed",
            Self::OptionQuote => "option_quote_updated",
            Self::OptionTrade => "option_trade_occurred",
            Self::OptionGreeks => "option_greeks_updated",
            Self::OptionChain => "option_chain_updated",
            Self::OpenInterest => "open_interest_updated",
            Self::Integrity => "integrity_event_occurred",
            Self::Heartbeat => "connection_status_changed",
        }
    }
}

impl core::fmt::Display for EventKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event payload variants. The on-wire form carries a stable `"kind"` string
/// discriminator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[non_exhaustive]
pub enum EventPayload {
    /// Executed trade.
    Trade {
        /// Trade price; must be positive.
        price: Decimal,
        /// Trade size; must be at least one unit.
        size: Decimal,
        /// Aggressor side.
        aggressor: AggressorSide,
    },
    /// Best bid/offer.
    BboQuote {
        /// Best bid price.
        bid: Decimal,
        /// Size at the best bid.
        bid_size: Decimal,
        /// Best ask price.
        ask: Decimal,
        /// Size at the best ask.
        ask_size: Decimal,
    },
    /// Order book snapshot. Bids are non-increasing in price, asks
    /// non-decreasing.
    L2Snapshot {
        /// Bid side, best first.
        bids: Vec<DepthLevel>,
        /// Ask side, best first.
        asks: Vec<DepthLevel>,
    },
    /// Aggregated order flow over a window.
    OrderFlow {
        /// Signed buy-minus-sell volume.
        delta: Decimal,
        /// Buyer-initiated volume.
        buy_volume: Decimal,
        /// Seller-initiated volume.
        sell_volume: Decimal,
    },
    /// OHLCV bar; used by both historical and aggregate bar events.
    Bar {
        /// Open price.
        open: Decimal,
        /// High price.
        high: Decimal,
        /// Low price.
        low: Decimal,
        /// Close price.
        close: Decimal,
        /// Total volume.
        volume: Decimal,
        /// Trading session date.
        session: NaiveDate,
    },
    /// Option quote.
    OptionQuote {
        /// Strike price.
        strike: Decimal,
        /// Contract expiration date.
        expiry: NaiveDate,
        /// Call or put.
        right: OptionRight,
        /// Best bid.
        bid: Decimal,
        /// Best ask.
        ask: Decimal,
    },
    /// Option trade.
    OptionTrade {
        /// Strike price.
        strike: Decimal,
        /// Contract expiration date.
        expiry: NaiveDate,
        /// Call or put.
        right: OptionRight,
        /// Trade price.
        price: Decimal,
        /// Trade size in contracts.
        size: Decimal,
    },
    /// Option greeks snapshot.
    OptionGreeks {
        /// Delta.
        delta: f64,
        /// Gamma.
        gamma: f64,
        /// Theta.
        theta: f64,
        /// Vega.
        vega: f64,
        /// Implied volatility.
        implied_vol: f64,
    },
    /// Option chain metadata.
    OptionChain {
        /// Known expiration dates, ascending.
        expirations: Vec<NaiveDate>,
    },
    /// Open interest.
    OpenInterest {
        /// Outstanding contracts.
        contracts: u64,
    },
    /// In-band integrity signal.
    Integrity {
        /// The condition being signalled.
        condition: IntegrityKind,
        /// Human-readable detail.
        detail: String,
        /// Number of events affected (e.g. dropped under overflow); 0 when
        /// not applicable.
        dropped: u64,
    },
    /// Connection heartbeat.
    Heartbeat {},
}

impl EventPayload {
    /// The [`EventKind`] this payload naturally corresponds to.
    ///
    /// `Bar` payloads report [`EventKind::HistoricalBar`]; callers building
    /// aggregate bars set the kind explicitly.
    #[must_use]
    pub const fn natural_kind(&self) -> EventKind {
        match self {
            Self::Trade { .. } => EventKind::Trade,
            Self::BboQuote { .. } => EventKind::BboQuote,
            Self::L2Snapshot { .. } => EventKind::L2Snapshot,
            Self::OrderFlow { .. } => EventKind::OrderFlow,
            Self::Bar { .. } => EventKind::HistoricalBar,
            Self::OptionQuote { .. } => EventKind::OptionQuote,
            Self::OptionTrade { .. } => EventKind::OptionTrade,
            Self::OptionGreeks { .. } => EventKind::OptionGreeks,
            Self::OptionChain { .. } => EventKind::OptionChain,
            Self::OpenInterest { .. } => EventKind::OpenInterest,
            Self::Integrity { .. } => EventKind::Integrity,
            Self::Heartbeat {} => EventKind::Heartbeat,
        }
    }

    /// Whether this payload shape is valid for `kind`.
    #[must_use]
    pub const fn matches_kind(&self, kind: EventKind) -> bool {
        match self {
            Self::Bar { .. } => matches!(
                kind,
                EventKind::HistoricalBar | EventKind::AggregateBar
            ),
            _ => self.natural_kind() as u8 == kind as u8,
        }
    }
}

/// An immutable canonical market data event.
///
/// Events are created by provider adapters, normalized at the pipeline
/// boundary, and live only until they are drained into a sink batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Exchange timestamp when available, otherwise the vendor's receive
    /// time. Always UTC.
    pub timestamp: DateTime<Utc>,
    /// Wall-clock instant this process received the event.
    pub received_at: DateTime<Utc>,
    /// Process-monotonic tick counter; strictly non-decreasing.
    pub received_monotonic: u64,
    /// Raw symbol as reported by the provider.
    pub symbol: String,
    /// Canonical (uppercase, trimmed) symbol, set by the normalizer.
    pub canonical_symbol: Option<String>,
    /// Event classification; determines the payload shape.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Tagged payload.
    pub payload: EventPayload,
    /// Monotonic per `(source, symbol, kind)`; 0 means unassigned.
    pub sequence: u64,
    /// Provider id that produced the event.
    pub source: String,
    /// Version of the event schema.
    pub schema_version: u16,
    /// Processing stage marker.
    pub tier: Tier,
}

impl Event {
    /// Create a new raw event stamped with the current wall clock and the
    /// process-monotonic counter.
    #[must_use]
    pub fn new(
        kind: EventKind,
        symbol: impl Into<String>,
        source: impl Into<String>,
        payload: EventPayload,
    ) -> Self {
        let now = Utc::now();
        Self {
            timestamp: now,
            received_at: now,
            received_monotonic: next_monotonic(),
            symbol: symbol.into(),
            canonical_symbol: None,
            kind,
            payload,
            sequence: 0,
            source: source.into(),
            schema_version: SCHEMA_VERSION,
            tier: Tier::Raw,
        }
    }

    /// Set the exchange timestamp.
    #[must_use]
    pub fn at(mut self, ts: DateTime<Utc>) -> Self {
        self.timestamp = ts;
        self
    }

    /// Set the per-key sequence number.
    #[must_use]
    pub fn with_sequence(mut self, seq: u64) -> Self {
        self.sequence = seq;
        self
    }

    /// Set the processing tier.
    #[must_use]
    pub fn with_tier(mut self, tier: Tier) -> Self {
        self.tier = tier;
        self
    }

    /// Build a system heartbeat event. Heartbeats carry no symbol
    /// (`symbol == "SYSTEM"`) and `sequence == 0`.
    #[must_use]
    pub fn heartbeat(source: impl Into<String>) -> Self {
        Self::new(
            EventKind::Heartbeat,
            SYSTEM_SYMBOL,
            source,
            EventPayload::Heartbeat {},
        )
    }

    /// Build an integrity event scoped to `symbol` (use
    /// [`SYSTEM_SYMBOL`] for process-level conditions).
    #[must_use]
    pub fn integrity(
        source: impl Into<String>,
        symbol: impl Into<String>,
        condition: IntegrityKind,
        detail: impl Into<String>,
        dropped: u64,
    ) -> Self {
        Self::new(
            EventKind::Integrity,
            symbol,
            source,
            EventPayload::Integrity {
                condition,
                detail: detail.into(),
                dropped,
            },
        )
    }

    /// The symbol consumers should key on: canonical when present, raw
    /// otherwise.
    #[must_use]
    pub fn effective_symbol(&self) -> &str {
        self.canonical_symbol.as_deref().unwrap_or(&self.symbol)
    }

    /// Validate structural invariants of the payload for this event's kind.
    ///
    /// Returns a short description of the first violation found.
    pub fn validate(&self) -> Result<(), String> {
        if !self.payload.matches_kind(self.kind) {
            return Err(format!("payload does not match kind {}", self.kind));
        }
        match &self.payload {
            EventPayload::Trade { price, size, .. } => {
                if *price <= Decimal::ZERO {
                    return Err("trade price must be positive".into());
                }
                if *size < Decimal::ONE {
                    return Err("trade size must be >= 1".into());
                }
            }
            EventPayload::L2Snapshot { bids, asks } => {
                if bids.windows(2).any(|w| w[0].price < w[1].price) {
                    return Err("bid side must be non-increasing in price".into());
                }
                if asks.windows(2).any(|w| w[0].price > w[1].price) {
                    return Err("ask side must be non-decreasing in price".into());
                }
            }
            EventPayload::Heartbeat {} => {
                if self.symbol != SYSTEM_SYMBOL {
                    return Err("heartbeat must carry the SYSTEM symbol".into());
                }
                if self.sequence != 0 {
                    return Err("heartbeat sequence must be 0".into());
                }
            }
            _ => {}
        }
        Ok(())
    }
}
