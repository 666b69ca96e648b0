use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tickd_core::normalize::EventIngress;
use tickd_core::pipeline::EventPipeline;
use tickd_core::sink::{EventSink, SinkError};
use tickd_types::{
    AggressorSide, BackpressurePolicy, Event, EventKind, EventPayload, IntegrityKind,
    PipelineConfig,
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

fn trade(seq: u64) -> Event {
    Event::new(
        EventKind::Trade,
        "AAPL",
        "mock",
        EventPayload::Trade {
            price: Decimal::from(10),
            size: Decimal::ONE,
            aggressor: AggressorSide::Buy,
        },
    )
    .with_sequence(seq)
}

fn ingress_over_recorder() -> (EventIngress, RecordingSink) {
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

fn integrity_kinds(written: &[Event]) -> Vec<IntegrityKind> {
    written
        .iter()
        .filter_map(|e| match &e.payload {
            EventPayload::Integrity { condition, .. } => Some(*condition),
            _ => None,
        })
        .collect()
}

#[tokio::test(flavor = "multi_thread")]
async fn duplicate_sequence_is_suppressed_with_integrity_event() {
    let (ingress, sink) = ingress_over_recorder();

    ingress.emit(trade(5)).await.unwrap();
    ingress.emit(trade(5)).await.unwrap();
    ingress.pipeline().flush().await.unwrap();

    let written = sink.written.lock().unwrap();
    let trades: Vec<_> = written.iter().filter(|e| e.kind == EventKind::Trade).collect();
    assert_eq!(trades.len(), 1, "second identical sequence must be dropped");
    assert_eq!(integrity_kinds(&written), vec![IntegrityKind::Duplicate]);
}

#[tokio::test(flavor = "multi_thread")]
async fn gap_is_flagged_but_event_admitted() {
    let (ingress, sink) = ingress_over_recorder();

    ingress.emit(trade(1)).await.unwrap();
    ingress.emit(trade(4)).await.unwrap();
    ingress.pipeline().flush().await.unwrap();

    let written = sink.written.lock().unwrap();
    let trades: Vec<u64> = written
        .iter()
        .filter(|e| e.kind == EventKind::Trade)
        .map(|e| e.sequence)
        .collect();
    assert_eq!(trades, vec![1, 4]);

    let gap = written
        .iter()
        .find_map(|e| match &e.payload {
            EventPayload::Integrity {
                condition: IntegrityKind::SequenceGap,
                dropped,
                ..
            } => Some(*dropped),
            _ => None,
        })
        .expect("gap integrity event");
    assert_eq!(gap, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn out_of_order_sequence_is_dropped() {
    let (ingress, sink) = ingress_over_recorder();

    ingress.emit(trade(7)).await.unwrap();
    ingress.emit(trade(3)).await.unwrap();
    ingress.pipeline().flush().await.unwrap();

    let written = sink.written.lock().unwrap();
    let trades: Vec<u64> = written
        .iter()
        .filter(|e| e.kind == EventKind::Trade)
        .map(|e| e.sequence)
        .collect();
    assert_eq!(trades, vec![7]);
    assert_eq!(integrity_kinds(&written), vec![IntegrityKind::OutOfOrder]);
}

#[tokio::test(flavor = "multi_thread")]
async fn unassigned_sequences_are_never_gated() {
    let (ingress, sink) = ingress_over_recorder();

    ingress.emit(trade(0)).await.unwrap();
    ingress.emit(trade(0)).await.unwrap();
    ingress.pipeline().flush().await.unwrap();

    let written = sink.written.lock().unwrap();
    let trades: Vec<_> = written.iter().filter(|e| e.kind == EventKind::Trade).collect();
    assert_eq!(trades.len(), 2);
    assert!(integrity_kinds(&written).is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn keys_are_scoped_per_source() {
    let (ingress, sink) = ingress_over_recorder();

    let mut other = trade(5);
    other.source = "other".to_string();
    ingress.emit(trade(5)).await.unwrap();
    ingress.emit(other).await.unwrap();
    ingress.pipeline().flush().await.unwrap();

    let written = sink.written.lock().unwrap();
    let trades: Vec<_> = written.iter().filter(|e| e.kind == EventKind::Trade).collect();
    assert_eq!(trades.len(), 2, "same sequence from another source is fresh");
}

#[tokio::test(flavor = "multi_thread")]
async fn reset_source_forgets_tracking() {
    let (ingress, sink) = ingress_over_recorder();

    ingress.emit(trade(9)).await.unwrap();
    ingress.gate().reset_source("mock").await;
    ingress.emit(trade(9)).await.unwrap();
    ingress.pipeline().flush().await.unwrap();

    let written = sink.written.lock().unwrap();
    let trades: Vec<_> = written.iter().filter(|e| e.kind == EventKind::Trade).collect();
    assert_eq!(trades.len(), 2);
}
