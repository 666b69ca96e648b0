//! Bulk historical ingest request and result records.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A request to backfill daily bars for a set of symbols.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackfillRequest {
    /// Provider id to fetch from; "composite" selects the fan-out provider.
    pub provider_id: String,
    /// Symbols to ingest, in request order.
    pub symbols: Vec<String>,
    /// Inclusive start of the requested range; provider default when absent.
    pub from: Option<NaiveDate>,
    /// Inclusive end of the requested range; provider default when absent.
    pub to: Option<NaiveDate>,
    /// Route through the composite provider chain on failure.
    pub enable_fallback: bool,
}

/// Outcome of one symbol within a backfill run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolBackfillResult {
    /// Canonical symbol.
    pub symbol: String,
    /// Whether the fetch and publish succeeded.
    pub success: bool,
    /// Bars published for this symbol.
    pub bars_written: u64,
    /// Failure description when `success` is false.
    pub error: Option<String>,
}

/// Persisted record of a backfill run. One record overwrites the previous
/// in the status file after every run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackfillRun {
    /// Whether every symbol succeeded.
    pub success: bool,
    /// Provider id the run fetched from.
    pub provider: String,
    /// Symbols requested.
    pub symbols: Vec<String>,
    /// Inclusive range start, when specified.
    pub from: Option<NaiveDate>,
    /// Inclusive range end, when specified.
    pub to: Option<NaiveDate>,
    /// Total bars published across all symbols.
    pub bars_written: u64,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished (successfully or not).
    pub completed_at: DateTime<Utc>,
    /// Run-level failure description, when any.
    pub error: Option<String>,
    /// Per-symbol outcomes in request order.
    pub per_symbol_results: Vec<SymbolBackfillResult>,
}
