//! Backfill daily bars from the mock provider into JSONL files.
//!
//! Run with: `cargo run -p tickd --example 01_backfill_to_jsonl`

use std::sync::Arc;

use tickd::Collector;
use tickd_mock::MockConnector;
use tickd_types::{BackfillRequest, StorageConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let collector = Collector::builder()
        .with_connector(Arc::new(MockConnector::new()))
        .storage(StorageConfig {
            data_root: std::path::PathBuf::from("target/example-data"),
            compress: false,
        })
        .build()?;

    let run = collector
        .backfill(BackfillRequest {
            provider_id: "tickd-mock".to_string(),
            symbols: vec!["SPY".to_string(), "AAPL".to_string()],
            from: chrono::NaiveDate::from_ymd_opt(2024, 1, 2),
            to: chrono::NaiveDate::from_ymd_opt(2024, 1, 31),
            enable_fallback: false,
        })
        .await?;

    println!(
        "backfill {}: {} bars across {} symbols",
        if run.success { "ok" } else { "failed" },
        run.bars_written,
        run.per_symbol_results.len()
    );
    for result in &run.per_symbol_results {
        println!(
            "  {} -> {} ({} bars)",
            result.symbol,
            if result.success { "ok" } else { "error" },
            result.bars_written
        );
    }

    collector.shutdown().await?;
    Ok(())
}
