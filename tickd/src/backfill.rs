//! Historical backfill orchestrator: ordered bulk ingest with per-symbol
//! error isolation and persisted run records.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tickd_core::connector::TickdConnector;
use tickd_core::pipeline::EventPipeline;
use tickd_core::registry::ProviderRegistry;
use tickd_core::TickdError;
use tickd_types::{
    BackfillConfig, BackfillRequest, BackfillRun, DailyBar, Event, EventKind, StorageConfig,
    SymbolBackfillResult, Tier, canonicalize_symbol,
};
use tokio::sync::watch;

use crate::composite::{CanonicalResolver, CompositeHistoryProvider};

/// Provider id selecting the composite fan-out.
pub const COMPOSITE_PROVIDER_ID: &str = "composite";

/// Runs at most one backfill at a time; a second call while one is in
/// flight fails with `AlreadyRunning`.
pub struct BackfillOrchestrator {
    registry: Arc<ProviderRegistry>,
    storage: StorageConfig,
    defaults: BackfillConfig,
    gate: tokio::sync::Mutex<()>,
}

impl BackfillOrchestrator {
    /// Orchestrator fetching from `registry` and persisting run records
    /// under the configured data root.
    #[must_use]
    pub fn new(registry: Arc<ProviderRegistry>, storage: StorageConfig) -> Self {
        Self {
            registry,
            storage,
            defaults: BackfillConfig::default(),
            gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Override the configured backfill defaults (provider selection,
    /// fallback, symbol resolution).
    #[must_use]
    pub fn with_defaults(mut self, defaults: BackfillConfig) -> Self {
        self.defaults = defaults;
        self
    }

    /// Build a request for `symbols` from the configured defaults.
    #[must_use]
    pub fn request_from_defaults(
        &self,
        symbols: Vec<String>,
        from: Option<chrono::NaiveDate>,
        to: Option<chrono::NaiveDate>,
    ) -> BackfillRequest {
        BackfillRequest {
            provider_id: self.defaults.provider.clone(),
            symbols,
            from,
            to,
            enable_fallback: self.defaults.enable_fallback,
        }
    }

    /// Path of the persisted status record.
    #[must_use]
    pub fn status_path(&self) -> PathBuf {
        self.storage.data_root.join("_status").join("backfill.json")
    }

    /// Execute a backfill.
    ///
    /// One symbol's failure never aborts the run; the pipeline is flushed
    /// once at the end regardless of per-symbol outcomes, and the run
    /// record is always persisted. Cancellation stops between symbols and
    /// reports the partial result.
    ///
    /// # Errors
    /// `AlreadyRunning` when another backfill holds the gate; `NotFound` or
    /// `Unsupported` when the requested provider cannot serve history.
    pub async fn run(
        &self,
        request: BackfillRequest,
        pipeline: &EventPipeline,
        cancel: &watch::Receiver<bool>,
    ) -> Result<BackfillRun, TickdError> {
        let _guard = self.gate.try_lock().map_err(|_| TickdError::AlreadyRunning {
            what: "backfill".to_string(),
        })?;

        let started_at = Utc::now();
        let composite;
        let registered;
        let (provider, provider_id): (&dyn TickdConnector, String) =
            if request.provider_id == COMPOSITE_PROVIDER_ID || request.enable_fallback {
                let mut chained = CompositeHistoryProvider::over(self.registry.history())
                    .with_pipeline(pipeline.clone());
                if self.defaults.enable_symbol_resolution {
                    chained = chained.with_resolver(Box::new(CanonicalResolver));
                }
                composite = chained;
                (&composite, COMPOSITE_PROVIDER_ID.to_string())
            } else {
                registered = self.registry.get(&request.provider_id).ok_or_else(|| {
                    TickdError::not_found(format!("provider {}", request.provider_id))
                })?;
                (registered.as_ref(), request.provider_id.clone())
            };
        let history = provider
            .as_history_provider()
            .ok_or_else(|| TickdError::unsupported("daily-bars"))?;

        let mut per_symbol: Vec<SymbolBackfillResult> = Vec::new();
        let mut total_bars: u64 = 0;
        let mut cancelled = false;

        for raw_symbol in &request.symbols {
            if *cancel.borrow() {
                cancelled = true;
                break;
            }
            let symbol = canonicalize_symbol(raw_symbol);
            if symbol.is_empty() {
                continue;
            }

            match history.daily_bars(&symbol, request.from, request.to).await {
                Ok(bars) => {
                    let written = publish_bars(pipeline, &provider_id, &symbol, &bars).await;
                    total_bars += written;
                    per_symbol.push(SymbolBackfillResult {
                        symbol,
                        success: true,
                        bars_written: written,
                        error: None,
                    });
                }
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(symbol = %symbol, error = %e, "backfill symbol failed");
                    per_symbol.push(SymbolBackfillResult {
                        symbol,
                        success: false,
                        bars_written: 0,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        // One flush at the end, regardless of per-symbol outcomes.
        let flush_error = pipeline.flush().await.err().map(|e| e.to_string());

        let success =
            !cancelled && flush_error.is_none() && per_symbol.iter().all(|r| r.success);
        let error = if cancelled {
            Some("cancelled before completing all symbols".to_string())
        } else {
            flush_error
        };

        let run = BackfillRun {
            success,
            provider: provider_id,
            symbols: request.symbols.clone(),
            from: request.from,
            to: request.to,
            bars_written: total_bars,
            started_at,
            completed_at: Utc::now(),
            error,
            per_symbol_results: per_symbol,
        };

        if let Err(_e) = persist_run(&self.status_path(), &run) {
            #[cfg(feature = "tracing")]
            tracing::error!(error = %_e, "failed to persist backfill status");
        }
        Ok(run)
    }
}

/// Publish one symbol's bars ascending by session date, sequenced from 1.
async fn publish_bars(
    pipeline: &EventPipeline,
    provider_id: &str,
    symbol: &str,
    bars: &[DailyBar],
) -> u64 {
    let mut written = 0u64;
    for (idx, bar) in bars.iter().enumerate() {
        let timestamp = bar
            .session
            .and_hms_opt(0, 0, 0)
            .map_or_else(Utc::now, |dt| dt.and_utc());
        let event = Event::new(
            EventKind::HistoricalBar,
            symbol,
            provider_id,
            bar.to_payload(),
        )
        .at(timestamp)
        .with_sequence(idx as u64 + 1)
        .with_tier(Tier::Normalized);
        if pipeline.publish(event).await.is_ok() {
            written += 1;
        }
    }
    written
}

/// Write the run record atomically: serialize to a temp file in the same
/// directory, then rename over the target.
fn persist_run(path: &Path, run: &BackfillRun) -> Result<(), TickdError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| TickdError::Io(e.to_string()))?;
    }
    let contents =
        serde_json::to_string_pretty(run).map_err(|e| TickdError::Io(e.to_string()))?;
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, contents).map_err(|e| TickdError::Io(e.to_string()))?;
    std::fs::rename(&tmp_path, path).map_err(|e| TickdError::Io(e.to_string()))?;
    Ok(())
}

/// Load the last persisted run record, if any.
///
/// # Errors
/// `Io` when the file exists but cannot be read; `Data` when it exists but
/// does not parse (a corrupted status file).
pub fn load_last_run(path: &Path) -> Result<Option<BackfillRun>, TickdError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(TickdError::Io(e.to_string())),
    };
    serde_json::from_str(&contents)
        .map(Some)
        .map_err(|e| TickdError::Data(format!("corrupted backfill status: {e}")))
}
