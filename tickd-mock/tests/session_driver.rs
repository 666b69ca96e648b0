use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tickd_core::normalize::EventIngress;
use tickd_core::pipeline::EventPipeline;
use tickd_core::session::{
    SessionDriver, StreamKind, SubscriptionLedger, TransportFrame,
};
use tickd_core::sink::{EventSink, SinkError};
use tickd_core::TickdError;
use tickd_mock::transport::ScriptedTransport;
use tickd_types::{
    AggressorSide, BackoffConfig, BackpressurePolicy, Event, EventKind, EventPayload,
    IntegrityKind, PipelineConfig, SessionConfig, SymbolSubscription,
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

fn fast_session_config() -> SessionConfig {
    SessionConfig {
        backoff: BackoffConfig {
            min_backoff_ms: 10,
            max_backoff_ms: 50,
            factor: 2,
            jitter_percent: 0,
        },
        max_reconnect_attempts: 5,
        heartbeat_interval: Duration::from_secs(60),
        heartbeat_timeout: Duration::from_secs(10),
        operation_timeout: Duration::from_secs(1),
    }
}

fn ingress() -> (EventIngress, RecordingSink) {
    let sink = RecordingSink::default();
    let cfg = PipelineConfig {
        capacity: 1024,
        batch_size: 64,
        batch_interval: Duration::from_millis(5),
        periodic_flush: Duration::from_secs(60),
        backpressure: BackpressurePolicy::DropOldest,
    };
    let pipeline = EventPipeline::spawn(cfg, Box::new(sink.clone()));
    (EventIngress::new(pipeline), sink)
}

fn trade_frame(seq: u64) -> TransportFrame {
    TransportFrame::Event(
        Event::new(
            EventKind::Trade,
            "AAPL",
            "scripted",
            EventPayload::Trade {
                price: Decimal::from(42),
                size: Decimal::ONE,
                aggressor: AggressorSide::Buy,
            },
        )
        .with_sequence(seq),
    )
}

#[tokio::test(flavor = "multi_thread")]
async fn driver_delivers_frames_through_the_ingress() {
    let (transport, script) = ScriptedTransport::new();
    let ledger = Arc::new(SubscriptionLedger::new());
    let (ingress, sink) = ingress();

    let handle = SessionDriver::spawn(
        "scripted",
        transport.clone(),
        ledger,
        fast_session_config(),
        ingress.clone(),
    );

    script.push_frame(trade_frame(1));
    script.push_frame(trade_frame(2));
    tokio::time::sleep(Duration::from_millis(100)).await;
    ingress.pipeline().flush().await.unwrap();

    let written = sink.written.lock().unwrap().clone();
    let seqs: Vec<u64> = written
        .iter()
        .filter(|e| e.kind == EventKind::Trade)
        .map(|e| e.sequence)
        .collect();
    assert_eq!(seqs, vec![1, 2]);
    assert_eq!(transport.open_count(), 1);

    handle.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn transport_error_triggers_reconnect_and_replay_in_insertion_order() {
    let (transport, script) = ScriptedTransport::new();
    let ledger = Arc::new(SubscriptionLedger::new());
    // Two live subscriptions recorded before the disconnect, insertion
    // ordered.
    ledger.insert(7, SymbolSubscription::new("AAPL"), StreamKind::Trades);
    ledger.insert(8, SymbolSubscription::new("MSFT"), StreamKind::Depth);

    let (ingress, sink) = ingress();
    let handle = SessionDriver::spawn(
        "scripted",
        transport.clone(),
        ledger.clone(),
        fast_session_config(),
        ingress.clone(),
    );

    // First replay happens on the initial connect.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(transport.open_count(), 1);

    script.push_error(TickdError::Io("broken pipe".to_string()));
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(transport.open_count() >= 2, "driver must reconnect");
    let log = transport.subscribe_log();
    // Two replays, each in insertion order.
    assert_eq!(log.len(), 4);
    assert!(log[0].contains("AAPL") && log[1].contains("MSFT"));
    assert!(log[2].contains("AAPL") && log[3].contains("MSFT"));

    ingress.pipeline().flush().await.unwrap();
    let written = sink.written.lock().unwrap().clone();
    let lost = written.iter().any(|e| {
        matches!(
            e.payload,
            EventPayload::Integrity {
                condition: IntegrityKind::ConnectionLost,
                ..
            }
        )
    });
    assert!(lost, "disconnect must surface a ConnectionLost integrity event");

    handle.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn exhausted_reconnects_close_the_session() {
    let (transport, script) = ScriptedTransport::new();
    // Initial open succeeds, every reconnect fails.
    script.script_open(vec![
        Ok(()),
        Err(TickdError::Io("refused".to_string())),
        Err(TickdError::Io("refused".to_string())),
        Err(TickdError::Io("refused".to_string())),
        Err(TickdError::Io("refused".to_string())),
        Err(TickdError::Io("refused".to_string())),
    ]);

    let ledger = Arc::new(SubscriptionLedger::new());
    let (ingress, _sink) = ingress();
    let cfg = SessionConfig {
        max_reconnect_attempts: 3,
        ..fast_session_config()
    };
    let handle = SessionDriver::spawn("scripted", transport.clone(), ledger, cfg, ingress);

    tokio::time::sleep(Duration::from_millis(50)).await;
    script.push_error(TickdError::Io("broken pipe".to_string()));

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(handle.is_finished(), "driver task ends once the session closes");
    assert_eq!(transport.open_count(), 4, "initial open plus three reconnects");
}
