use rust_decimal::Decimal;
use tickd_core::pipeline::{OverflowQueue, PushResult};
use tickd_types::{
    AggressorSide, BackpressurePolicy, Event, EventKind, EventPayload, IntegrityKind,
};

fn trade(seq: u64) -> Event {
    Event::new(
        EventKind::Trade,
        "AAPL",
        "mock",
        EventPayload::Trade {
            price: Decimal::from(100),
            size: Decimal::ONE,
            aggressor: AggressorSide::Unknown,
        },
    )
    .with_sequence(seq)
}

#[test]
fn drop_oldest_keeps_newest_and_coalesces_one_overflow_marker() {
    let mut q = OverflowQueue::new(4, BackpressurePolicy::DropOldest);
    for seq in 1..=10 {
        match q.push(trade(seq)) {
            PushResult::Queued | PushResult::QueuedDroppingOldest => {}
            PushResult::Full(_) => panic!("drop-oldest must never report full"),
        }
    }
    assert_eq!(q.len(), 4);

    let drained = q.drain(256);
    let overflow_markers: Vec<_> = drained
        .iter()
        .filter(|e| {
            matches!(
                e.payload,
                EventPayload::Integrity {
                    condition: IntegrityKind::Overflow,
                    ..
                }
            )
        })
        .collect();
    assert_eq!(overflow_markers.len(), 1);
    match &overflow_markers[0].payload {
        EventPayload::Integrity { dropped, .. } => assert_eq!(*dropped, 6),
        other => panic!("unexpected payload: {other:?}"),
    }

    let first_data = drained
        .iter()
        .find(|e| e.kind == EventKind::Trade)
        .expect("data events survive");
    assert!(first_data.sequence >= 7);

    let data_seqs: Vec<u64> = drained
        .iter()
        .filter(|e| e.kind == EventKind::Trade)
        .map(|e| e.sequence)
        .collect();
    assert_eq!(data_seqs, vec![7, 8, 9, 10]);
}

#[test]
fn block_policy_reports_full_without_dropping() {
    let mut q = OverflowQueue::new(2, BackpressurePolicy::Block);
    assert!(matches!(q.push(trade(1)), PushResult::Queued));
    assert!(matches!(q.push(trade(2)), PushResult::Queued));
    match q.push(trade(3)) {
        PushResult::Full(ev) => assert_eq!(ev.sequence, 3),
        other => panic!("expected full, got {other:?}"),
    }
    assert_eq!(q.len(), 2);

    let drained = q.drain(1);
    assert_eq!(drained.len(), 1);
    assert_eq!(drained[0].sequence, 1);
    assert!(matches!(q.push(trade(3)), PushResult::Queued));
}

#[test]
fn drain_without_overflow_emits_no_marker() {
    let mut q = OverflowQueue::new(8, BackpressurePolicy::DropOldest);
    for seq in 1..=3 {
        let _ = q.push(trade(seq));
    }
    let drained = q.drain(256);
    assert_eq!(drained.len(), 3);
    assert!(drained.iter().all(|e| e.kind == EventKind::Trade));
}
