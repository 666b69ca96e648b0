use std::sync::Arc;

use tickd::SubscriptionCoordinator;
use tickd_mock::{MockConnector, SubscribeBehavior};
use tickd_types::{SubscriptionId, SymbolSubscription, SymbolSubscriptionSet, TickdError};

fn sub(symbol: &str, trades: bool, depth: bool) -> SymbolSubscription {
    let mut s = SymbolSubscription::new(symbol);
    s.subscribe_trades = trades;
    s.subscribe_depth = depth;
    s
}

fn set(subs: Vec<SymbolSubscription>) -> SymbolSubscriptionSet {
    SymbolSubscriptionSet::new(subs)
}

#[tokio::test]
async fn hot_reload_removes_old_and_adds_new_symbols() {
    let mock = Arc::new(MockConnector::new());
    let controller = mock.controller();
    let coordinator = SubscriptionCoordinator::new(mock.clone());

    let report = coordinator
        .apply(&set(vec![sub("AAPL", true, true)]))
        .await;
    assert_eq!(report.subscribed, vec!["AAPL".to_string()]);
    assert!(coordinator.depth_subscriptions().contains_key("AAPL"));
    assert!(coordinator.trade_subscriptions().contains_key("AAPL"));

    controller.clear_op_log();
    let report = coordinator
        .apply(&set(vec![sub("MSFT", false, true)]))
        .await;

    assert_eq!(report.removed, vec!["AAPL".to_string()]);
    assert_eq!(report.subscribed, vec!["MSFT".to_string()]);

    let depth = coordinator.depth_subscriptions();
    let trades = coordinator.trade_subscriptions();
    assert!(depth.contains_key("MSFT"));
    assert!(!depth.contains_key("AAPL"));
    assert!(
        !trades.contains_key("MSFT"),
        "trade stream was not requested for MSFT"
    );
    assert!(!trades.contains_key("AAPL"));

    let log = controller.op_log();
    assert!(log.iter().any(|op| op.starts_with("unsubscribe_depth")));
    assert!(log.iter().any(|op| op.starts_with("unsubscribe_trades")));
    assert!(log.iter().any(|op| op.starts_with("subscribe_depth MSFT")));
}

#[tokio::test]
async fn vendor_error_is_remembered_and_retried_on_next_apply() {
    let mock = Arc::new(MockConnector::new());
    let controller = mock.controller();
    let coordinator = SubscriptionCoordinator::new(mock.clone());

    controller.set_depth_subscribe_behavior(SubscribeBehavior::Fail(TickdError::provider(
        "tickd-mock",
        "session not ready",
    )));

    let config = set(vec![sub("AAPL", false, true)]);
    let report = coordinator.apply(&config).await;
    assert_eq!(report.failed.len(), 1);
    assert_eq!(
        coordinator.depth_subscriptions().get("AAPL"),
        Some(&(-1 as SubscriptionId)),
        "failed subscription is remembered as pending"
    );

    // Same config, provider recovered: the pending intent is retried.
    controller.set_depth_subscribe_behavior(SubscribeBehavior::Succeed);
    let report = coordinator.apply(&config).await;
    assert!(report.failed.is_empty());
    let id = coordinator.depth_subscriptions()["AAPL"];
    assert!(id > 0);
}

#[tokio::test]
async fn unavailable_provider_records_pending_intent_without_error() {
    let mock = Arc::new(MockConnector::new());
    let controller = mock.controller();
    let coordinator = SubscriptionCoordinator::new(mock.clone());

    controller.set_trade_subscribe_behavior(SubscribeBehavior::Unavailable);
    let report = coordinator.apply(&set(vec![sub("AAPL", true, false)])).await;
    assert!(report.failed.is_empty(), "unavailable is not a vendor error");
    assert_eq!(coordinator.trade_subscriptions()["AAPL"], -1);
}

#[tokio::test]
async fn per_symbol_failures_do_not_abort_the_reconciliation() {
    let mock = Arc::new(MockConnector::new());
    let controller = mock.controller();
    let coordinator = SubscriptionCoordinator::new(mock.clone());

    controller.set_depth_subscribe_behavior(SubscribeBehavior::Fail(TickdError::provider(
        "tickd-mock",
        "boom",
    )));
    let report = coordinator
        .apply(&set(vec![sub("AAPL", true, true), sub("MSFT", true, true)]))
        .await;

    // Depth failed for both, but the trade subscriptions still happened.
    assert_eq!(report.failed.len(), 2);
    assert!(coordinator.trade_subscriptions()["AAPL"] > 0);
    assert!(coordinator.trade_subscriptions()["MSFT"] > 0);
}

#[tokio::test]
async fn apply_is_idempotent_up_to_transient_ids() {
    let mock_a = Arc::new(MockConnector::named("feed-a"));
    let mock_b = Arc::new(MockConnector::named("feed-b"));
    let c1 = set(vec![sub("AAPL", true, true), sub("MSFT", true, false)]);
    let c2 = set(vec![sub("MSFT", true, true), sub("SPY", false, true)]);

    // apply(c2) after apply(c1) ...
    let sequential = SubscriptionCoordinator::new(mock_a.clone());
    sequential.apply(&c1).await;
    sequential.apply(&c2).await;

    // ... equals apply(c2) on an empty coordinator, up to ids.
    let fresh = SubscriptionCoordinator::new(mock_b.clone());
    fresh.apply(&c2).await;

    let keys = |m: std::collections::HashMap<String, SubscriptionId>| {
        let mut k: Vec<String> = m.into_keys().collect();
        k.sort();
        k
    };
    assert_eq!(
        keys(sequential.depth_subscriptions()),
        keys(fresh.depth_subscriptions())
    );
    assert_eq!(
        keys(sequential.trade_subscriptions()),
        keys(fresh.trade_subscriptions())
    );
}

#[tokio::test]
async fn config_change_resubscribes_with_new_parameters() {
    let mock = Arc::new(MockConnector::new());
    let controller = mock.controller();
    let coordinator = SubscriptionCoordinator::new(mock.clone());

    coordinator.apply(&set(vec![sub("AAPL", true, true)])).await;
    let first_depth = coordinator.depth_subscriptions()["AAPL"];

    let mut changed = sub("AAPL", true, true);
    changed.depth_levels = 5;
    controller.clear_op_log();
    let report = coordinator.apply(&set(vec![changed])).await;

    assert_eq!(report.updated, vec!["AAPL".to_string()]);
    let second_depth = coordinator.depth_subscriptions()["AAPL"];
    assert_ne!(first_depth, second_depth, "depth re-subscribed with new id");
    let log = controller.op_log();
    assert!(log.iter().any(|op| op.starts_with("unsubscribe_depth")));
}

#[tokio::test]
async fn case_insensitive_equal_configs_are_not_resubscribed() {
    let mock = Arc::new(MockConnector::new());
    let controller = mock.controller();
    let coordinator = SubscriptionCoordinator::new(mock.clone());

    let mut first = sub("AAPL", true, true);
    first.exchange = "SMART".to_string();
    coordinator.apply(&set(vec![first.clone()])).await;

    controller.clear_op_log();
    let mut second = first;
    second.exchange = "smart".to_string();
    let report = coordinator.apply(&set(vec![second])).await;

    assert!(report.updated.is_empty());
    assert!(controller.op_log().is_empty(), "no vendor calls for a no-op");
}

#[tokio::test]
async fn repoint_reissues_subscriptions_without_unsubscribing_old_provider() {
    let old = Arc::new(MockConnector::named("feed-a"));
    let new = Arc::new(MockConnector::named("feed-b"));
    let old_controller = old.controller();
    let new_controller = new.controller();

    let coordinator = SubscriptionCoordinator::new(old.clone());
    coordinator.apply(&set(vec![sub("AAPL", true, true)])).await;

    old_controller.clear_op_log();
    coordinator.repoint(new.clone()).await;

    assert!(
        old_controller.op_log().is_empty(),
        "the old provider is presumed unavailable; no unsubscribes"
    );
    let log = new_controller.op_log();
    assert!(log.iter().any(|op| op.starts_with("subscribe_depth AAPL")));
    assert!(log.iter().any(|op| op.starts_with("subscribe_trades AAPL")));
}
