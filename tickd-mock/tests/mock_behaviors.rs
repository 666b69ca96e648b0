use std::sync::Arc;

use tickd_core::connector::{HistoryProvider, TickdConnector};
use tickd_core::TickdError;
use tickd_mock::{MockBehavior, MockConnector};
use tickd_types::TickdError as Error;

#[tokio::test]
async fn fixture_bars_are_deterministic_ascending_and_deduplicated() {
    let mock = Arc::new(MockConnector::new());
    let history = mock.as_history_provider().expect("history capable");

    let a = history.daily_bars("SPY", None, None).await.unwrap();
    let b = history.daily_bars("SPY", None, None).await.unwrap();
    assert_eq!(a, b);
    assert!(!a.is_empty());
    assert!(a.windows(2).all(|w| w[0].session < w[1].session));
    assert!(a.iter().all(tickd_types::DailyBar::is_coherent));
}

#[tokio::test]
async fn magic_fail_symbol_forces_provider_error() {
    let mock = Arc::new(MockConnector::new());
    let history = mock.as_history_provider().unwrap();
    let err = history.daily_bars("FAIL", None, None).await.unwrap_err();
    assert!(matches!(err, TickdError::Provider { .. }));
}

#[tokio::test]
async fn magic_empty_symbol_returns_empty_series() {
    let mock = Arc::new(MockConnector::new());
    let history = mock.as_history_provider().unwrap();
    let bars = history.daily_bars("EMPTY", None, None).await.unwrap();
    assert!(bars.is_empty());
}

#[tokio::test]
async fn fail_times_behavior_recovers_after_budget() {
    let mock = Arc::new(MockConnector::new());
    let controller = mock.controller();
    controller.set_history_behavior(
        "IBM",
        MockBehavior::FailTimes(
            2,
            Error::Http {
                status: 503,
                msg: "upstream unavailable".to_string(),
            },
        ),
    );

    let history = mock.as_history_provider().unwrap();
    assert!(history.daily_bars("IBM", None, None).await.is_err());
    assert!(history.daily_bars("IBM", None, None).await.is_err());
    let bars = history.daily_bars("IBM", None, None).await.unwrap();
    assert!(!bars.is_empty());
}

#[tokio::test]
async fn scripted_return_overrides_fixtures() {
    let mock = Arc::new(MockConnector::new());
    let controller = mock.controller();
    controller.set_history_behavior("NVDA", MockBehavior::Return(Vec::new()));

    let history = mock.as_history_provider().unwrap();
    let bars = history.daily_bars("nvda", None, None).await.unwrap();
    assert!(bars.is_empty(), "scripted behavior keys on canonical symbol");
}
