use chrono::NaiveDate;
use rust_decimal::Decimal;
use tickd_types::{AggressorSide, Event, EventKind, EventPayload, IntegrityKind};

fn trade_event() -> Event {
    Event::new(
        EventKind::Trade,
        "AAPL",
        "mock",
        EventPayload::Trade {
            price: Decimal::new(18934, 2),
            size: Decimal::from(100),
            aggressor: AggressorSide::Buy,
        },
    )
    .with_sequence(7)
}

#[test]
fn encode_then_decode_yields_equal_event() {
    let ev = trade_event();
    let json = serde_json::to_string(&ev).expect("serialize");
    let back: Event = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(ev, back);
}

#[test]
fn payload_carries_kind_discriminator() {
    let ev = trade_event();
    let value = serde_json::to_value(&ev).expect("serialize");
    assert_eq!(value["payload"]["kind"], "trade");
    assert_eq!(value["type"], "trade");
    assert_eq!(value["symbol"], "AAPL");
    assert_eq!(value["sequence"], 7);
    assert_eq!(value["source"], "mock");
}

#[test]
fn heartbeat_carries_system_symbol_and_zero_sequence() {
    let hb = Event::heartbeat("mock");
    assert_eq!(hb.symbol, "SYSTEM");
    assert_eq!(hb.sequence, 0);
    assert!(hb.validate().is_ok());
}

#[test]
fn trade_validation_rejects_non_positive_price() {
    let mut ev = trade_event();
    ev.payload = EventPayload::Trade {
        price: Decimal::ZERO,
        size: Decimal::ONE,
        aggressor: AggressorSide::Sell,
    };
    assert!(ev.validate().is_err());
}

#[test]
fn l2_side_ordering_is_enforced() {
    use tickd_types::DepthLevel;
    let bad_bids = Event::new(
        EventKind::L2Snapshot,
        "AAPL",
        "mock",
        EventPayload::L2Snapshot {
            bids: vec![
                DepthLevel { price: Decimal::from(100), size: Decimal::ONE },
                DepthLevel { price: Decimal::from(101), size: Decimal::ONE },
            ],
            asks: vec![],
        },
    );
    assert!(bad_bids.validate().is_err());
}

#[test]
fn bar_payload_is_valid_for_both_bar_kinds() {
    let bar = EventPayload::Bar {
        open: Decimal::from(10),
        high: Decimal::from(12),
        low: Decimal::from(9),
        close: Decimal::from(11),
        volume: Decimal::from(1000),
        session: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
    };
    assert!(bar.matches_kind(EventKind::HistoricalBar));
    assert!(bar.matches_kind(EventKind::AggregateBar));
    assert!(!bar.matches_kind(EventKind::Trade));
}

#[test]
fn integrity_event_round_trips() {
    let ev = Event::integrity("pipeline", "SYSTEM", IntegrityKind::Overflow, "queue full", 6);
    let json = serde_json::to_string(&ev).expect("serialize");
    let back: Event = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(ev, back);
    match back.payload {
        EventPayload::Integrity { condition, dropped, .. } => {
            assert_eq!(condition, IntegrityKind::Overflow);
            assert_eq!(dropped, 6);
        }
        other => panic!("unexpected payload: {other:?}"),
    }
}

#[test]
fn monotonic_counter_is_strictly_increasing() {
    let a = tickd_types::next_monotonic();
    let b = tickd_types::next_monotonic();
    assert!(b > a);
}
