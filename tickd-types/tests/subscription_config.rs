use proptest::prelude::*;
use tickd_types::{SymbolSubscription, canonicalize_symbol, is_valid_symbol};

#[test]
fn same_config_is_case_insensitive_on_routing_fields() {
    let mut a = SymbolSubscription::new("AAPL");
    a.exchange = "SMART".to_string();
    a.primary_exchange = "NASDAQ".to_string();
    let mut b = a.clone();
    b.exchange = "smart".to_string();
    b.primary_exchange = "Nasdaq".to_string();
    assert!(a.same_config(&b));
}

#[test]
fn flag_changes_are_detected() {
    let a = SymbolSubscription::new("AAPL");
    let mut b = a.clone();
    b.subscribe_depth = false;
    assert!(!a.same_config(&b));

    let mut c = a.clone();
    c.depth_levels = 5;
    assert!(!a.same_config(&c));
}

#[test]
fn currency_and_security_type_do_not_affect_equivalence() {
    let a = SymbolSubscription::new("AAPL");
    let mut b = a.clone();
    b.currency = "EUR".to_string();
    b.security_type = "FUT".to_string();
    assert!(a.same_config(&b));
}

proptest! {
    // Canonicalization is idempotent and closed over valid symbols.
    #[test]
    fn canonicalize_is_idempotent(s in "[ ]{0,2}[a-zA-Z0-9\\.]{1,12}[ ]{0,2}") {
        let once = canonicalize_symbol(&s);
        prop_assert_eq!(canonicalize_symbol(&once), once.clone());
        prop_assert!(is_valid_symbol(&once));
    }
}
