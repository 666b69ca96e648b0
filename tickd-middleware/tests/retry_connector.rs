use std::sync::Arc;

use tickd_core::connector::{HistoryProvider, TickdConnector};
use tickd_middleware::RetryConnector;
use tickd_mock::{MockBehavior, MockConnector};
use tickd_types::{BackoffConfig, RetryConfig, TickdError};

fn fast_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        backoff: BackoffConfig {
            min_backoff_ms: 1,
            max_backoff_ms: 5,
            factor: 2,
            jitter_percent: 0,
        },
    }
}

#[tokio::test]
async fn transient_failures_are_retried_until_success() {
    let mock = Arc::new(MockConnector::new());
    mock.controller().set_history_behavior(
        "IBM",
        MockBehavior::FailTimes(
            2,
            TickdError::Http {
                status: 503,
                msg: "bad gateway".to_string(),
            },
        ),
    );
    let wrapped = RetryConnector::new(mock, fast_retry(3));

    let bars = wrapped
        .as_history_provider()
        .unwrap()
        .daily_bars("IBM", None, None)
        .await
        .expect("third attempt succeeds");
    assert!(!bars.is_empty());
}

#[tokio::test]
async fn retry_budget_is_bounded() {
    let mock = Arc::new(MockConnector::new());
    mock.controller().set_history_behavior(
        "IBM",
        MockBehavior::FailTimes(
            5,
            TickdError::Http {
                status: 503,
                msg: "bad gateway".to_string(),
            },
        ),
    );
    let wrapped = RetryConnector::new(mock, fast_retry(3));

    let err = wrapped
        .as_history_provider()
        .unwrap()
        .daily_bars("IBM", None, None)
        .await
        .unwrap_err();
    assert!(err.is_transient());
}

#[tokio::test]
async fn non_transient_failures_are_not_retried() {
    let mock = Arc::new(MockConnector::new());
    mock.controller().set_history_behavior(
        "IBM",
        MockBehavior::FailTimes(1, TickdError::not_found("daily bars for IBM")),
    );
    let wrapped = RetryConnector::new(mock, fast_retry(5));

    // A single failure budget plus no retry means the error surfaces as-is.
    let err = wrapped
        .as_history_provider()
        .unwrap()
        .daily_bars("IBM", None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, TickdError::NotFound { .. }));
}

#[tokio::test]
async fn retry_after_hint_is_honored() {
    let mock = Arc::new(MockConnector::new());
    mock.controller().set_history_behavior(
        "IBM",
        MockBehavior::FailTimes(
            1,
            TickdError::RateLimited {
                limit: 10,
                window_ms: 1_000,
                retry_after_ms: Some(5),
            },
        ),
    );
    let wrapped = RetryConnector::new(mock, fast_retry(2));

    let started = std::time::Instant::now();
    let bars = wrapped
        .as_history_provider()
        .unwrap()
        .daily_bars("IBM", None, None)
        .await
        .expect("second attempt succeeds");
    assert!(!bars.is_empty());
    assert!(started.elapsed() >= std::time::Duration::from_millis(5));
}
