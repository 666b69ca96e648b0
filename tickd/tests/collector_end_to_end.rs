use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tickd::Collector;
use tickd_core::sink::{EventSink, SinkError};
use tickd_mock::MockConnector;
use tickd_types::{
    BackfillRequest, Event, EventKind, FailoverConfig, FailoverRule, PipelineConfig,
    StorageConfig, SymbolSubscription, SymbolSubscriptionSet,
};

#[derive(Clone, Default)]
struct RecordingSink {
    written: Arc<Mutex<Vec<Event>>>,
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn write(&mut self, batch: &[Event]) -> Result<(), SinkError> {
        self.written.lock().unwrap().extend_from_slice(batch);
        Ok(())
    }
    async fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
    async fn close(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

fn failover_cfg() -> FailoverConfig {
    FailoverConfig {
        enable: true,
        health_check_interval: Duration::from_secs(600),
        rules: vec![FailoverRule {
            id: "equities".to_string(),
            primary_provider_id: "feed-a".to_string(),
            backup_provider_ids: vec!["feed-b".to_string()],
            failover_threshold: 3,
            recovery_threshold: 2,
            max_latency_ms: 0,
        }],
    }
}

fn collector_fixture(
    dir: &tempfile::TempDir,
) -> (Collector, Arc<MockConnector>, Arc<MockConnector>, RecordingSink) {
    let primary = Arc::new(MockConnector::named("feed-a"));
    let backup = Arc::new(MockConnector::named("feed-b"));
    let sink = RecordingSink::default();

    let collector = Collector::builder()
        .with_connector(primary.clone())
        .with_connector(backup.clone())
        .pipeline(PipelineConfig {
            batch_interval: Duration::from_millis(5),
            ..PipelineConfig::default()
        })
        .storage(StorageConfig {
            data_root: dir.path().to_path_buf(),
            compress: false,
        })
        .failover(failover_cfg())
        .sink(Box::new(sink.clone()))
        .build()
        .expect("valid configuration");
    (collector, primary, backup, sink)
}

#[tokio::test(flavor = "multi_thread")]
async fn live_events_flow_from_provider_to_sink() {
    let dir = tempfile::tempdir().unwrap();
    let (collector, primary, _backup, sink) = collector_fixture(&dir);
    collector.start().await.unwrap();

    collector
        .apply(&SymbolSubscriptionSet::new(vec![SymbolSubscription::new(
            "AAPL",
        )]))
        .await
        .unwrap();

    for _ in 0..5 {
        primary
            .emit_trade("AAPL", Decimal::from(190), Decimal::ONE)
            .await;
    }
    collector.flush().await.unwrap();

    let written = sink.written.lock().unwrap().clone();
    let trades: Vec<&Event> = written.iter().filter(|e| e.kind == EventKind::Trade).collect();
    assert_eq!(trades.len(), 5);
    assert!(trades.iter().all(|e| e.canonical_symbol.as_deref() == Some("AAPL")));
    let seqs: Vec<u64> = trades.iter().map(|e| e.sequence).collect();
    assert_eq!(seqs, vec![1, 2, 3, 4, 5]);

    collector.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn failover_repoints_subscriptions_to_the_backup() {
    let dir = tempfile::tempdir().unwrap();
    let (collector, _primary, backup, _sink) = collector_fixture(&dir);
    collector.start().await.unwrap();

    collector
        .apply(&SymbolSubscriptionSet::new(vec![SymbolSubscription::new(
            "AAPL",
        )]))
        .await
        .unwrap();
    assert!(backup.controller().op_log().is_empty());

    let supervisor = collector.supervisor();
    for _ in 0..3 {
        supervisor.record_failure("feed-a", "connection lost");
    }
    let events = supervisor.evaluate_all().await;
    assert_eq!(events.len(), 1);
    assert_eq!(
        supervisor.active_provider_of("equities").as_deref(),
        Some("feed-b")
    );

    // The reaction task picks the broadcast up and repoints.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let log = backup.controller().op_log();
    assert!(
        log.iter().any(|op| op.starts_with("subscribe_trades AAPL")),
        "backup did not receive the re-pointed subscriptions: {log:?}"
    );
    assert!(backup.controller().is_connected());

    collector.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn backfill_runs_through_the_collector_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let (collector, _primary, _backup, sink) = collector_fixture(&dir);
    collector.start().await.unwrap();

    let run = collector
        .backfill(BackfillRequest {
            provider_id: "feed-a".to_string(),
            symbols: vec!["SPY".to_string()],
            from: chrono::NaiveDate::from_ymd_opt(2024, 1, 2),
            to: chrono::NaiveDate::from_ymd_opt(2024, 1, 10),
            enable_fallback: false,
        })
        .await
        .unwrap();
    assert!(run.success);
    assert!(run.bars_written > 0);

    let written = sink.written.lock().unwrap();
    let bars = written
        .iter()
        .filter(|e| e.kind == EventKind::HistoricalBar)
        .count();
    assert_eq!(bars as u64, run.bars_written);

    collector.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn resilient_connector_wrapper_preserves_capabilities() {
    let dir = tempfile::tempdir().unwrap();
    let sink = RecordingSink::default();
    let collector = Collector::builder()
        .with_resilient_connector(Arc::new(MockConnector::named("feed-a")))
        .unwrap()
        .storage(StorageConfig {
            data_root: dir.path().to_path_buf(),
            compress: false,
        })
        .sink(Box::new(sink.clone()))
        .build()
        .unwrap();

    let run = collector
        .backfill(BackfillRequest {
            provider_id: "feed-a".to_string(),
            symbols: vec!["SPY".to_string()],
            from: chrono::NaiveDate::from_ymd_opt(2024, 1, 2),
            to: chrono::NaiveDate::from_ymd_opt(2024, 1, 5),
            enable_fallback: false,
        })
        .await
        .unwrap();
    assert!(run.success);
    assert!(run.bars_written > 0);

    collector.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn build_rejects_rules_referencing_unknown_providers() {
    let primary = Arc::new(MockConnector::named("feed-a"));
    let mut cfg = failover_cfg();
    cfg.rules[0].backup_provider_ids = vec!["ghost".to_string()];

    let result = Collector::builder()
        .with_connector(primary)
        .failover(cfg)
        .build();
    assert!(matches!(result, Err(tickd::TickdError::Config(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn build_rejects_an_empty_connector_list() {
    let result = Collector::builder().build();
    assert!(matches!(result, Err(tickd::TickdError::InvalidArg(_))));
}
