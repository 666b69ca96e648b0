use chrono::NaiveDate;
use proptest::prelude::*;
use rust_decimal::Decimal;
use tickd_core::normalize::{Normalized, normalize, side_from_vendor};
use tickd_types::{
    AggressorSide, Event, EventKind, EventPayload, IntegrityKind, Tier,
};

fn trade(symbol: &str) -> Event {
    Event::new(
        EventKind::Trade,
        symbol,
        "mock",
        EventPayload::Trade {
            price: Decimal::from(10),
            size: Decimal::ONE,
            aggressor: AggressorSide::Buy,
        },
    )
}

#[test]
fn normalize_sets_canonical_symbol_and_tier() {
    let ev = trade(" aapl ");
    match normalize(ev) {
        Normalized::Accepted(norm) => {
            assert_eq!(norm.canonical_symbol.as_deref(), Some("AAPL"));
            assert_eq!(norm.tier, Tier::Normalized);
        }
        Normalized::Rejected(_) => panic!("valid trade rejected"),
    }
}

#[test]
fn incoherent_bar_is_rejected_with_invalid_bar_integrity() {
    let bad = Event::new(
        EventKind::HistoricalBar,
        "SPY",
        "mock",
        EventPayload::Bar {
            open: Decimal::from(10),
            high: Decimal::from(9), // high below open
            low: Decimal::from(8),
            close: Decimal::from(9),
            volume: Decimal::from(1),
            session: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
        },
    );
    match normalize(bad) {
        Normalized::Rejected(integrity) => match integrity.payload {
            EventPayload::Integrity { condition, .. } => {
                assert_eq!(condition, IntegrityKind::InvalidBar);
            }
            other => panic!("unexpected payload: {other:?}"),
        },
        Normalized::Accepted(_) => panic!("incoherent bar accepted"),
    }
}

#[test]
fn vendor_side_mapping_defaults_to_unknown() {
    assert_eq!(side_from_vendor("BUY"), AggressorSide::Buy);
    assert_eq!(side_from_vendor(" b "), AggressorSide::Buy);
    assert_eq!(side_from_vendor("Sell"), AggressorSide::Sell);
    assert_eq!(side_from_vendor("offer"), AggressorSide::Sell);
    assert_eq!(side_from_vendor("cross"), AggressorSide::Unknown);
    assert_eq!(side_from_vendor(""), AggressorSide::Unknown);
}

proptest! {
    // normalize(normalize(x)) == normalize(x) for accepted events.
    #[test]
    fn normalize_is_idempotent(raw in "[ ]{0,2}[a-zA-Z]{1,8}[ ]{0,2}") {
        let ev = trade(&raw);
        if let Normalized::Accepted(once) = normalize(ev) {
            match normalize(once.clone()) {
                Normalized::Accepted(twice) => prop_assert_eq!(once, twice),
                Normalized::Rejected(_) => prop_assert!(false, "accepted event rejected on second pass"),
            }
        }
    }
}
