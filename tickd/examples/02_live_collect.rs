//! Collect a few live trades from the mock streaming provider.
//!
//! Run with: `cargo run -p tickd --example 02_live_collect`

use std::sync::Arc;

use rust_decimal::Decimal;
use tickd::Collector;
use tickd_mock::MockConnector;
use tickd_types::{StorageConfig, SymbolSubscription, SymbolSubscriptionSet};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let feed = Arc::new(MockConnector::new());
    let collector = Collector::builder()
        .with_connector(feed.clone())
        .storage(StorageConfig {
            data_root: std::path::PathBuf::from("target/example-data"),
            compress: false,
        })
        .build()?;

    collector.start().await?;
    collector
        .apply(&SymbolSubscriptionSet::new(vec![SymbolSubscription::new(
            "AAPL",
        )]))
        .await?;

    for i in 0..10 {
        feed.emit_trade("AAPL", Decimal::from(190 + i), Decimal::from(100))
            .await;
    }
    collector.flush().await?;

    let metrics = collector.metrics();
    println!(
        "published={} written={} dropped={}",
        metrics.published, metrics.events_written, metrics.dropped
    );

    collector.shutdown().await?;
    Ok(())
}
