use std::sync::Arc;
use std::time::Duration;

use tickd_core::connector::{HistoryProvider, TickdConnector};
use tickd_middleware::ConnectorBuilder;
use tickd_mock::MockConnector;
use tickd_types::{BackoffConfig, CircuitBreakerConfig, RateLimitConfig, RetryConfig};

fn full_builder() -> ConnectorBuilder {
    ConnectorBuilder::new(Arc::new(MockConnector::new()))
        .with_rate_limit(RateLimitConfig {
            max_requests: 1_000,
            window: Duration::from_secs(60),
            min_delay: Duration::ZERO,
        })
        .with_retry(RetryConfig {
            max_attempts: 2,
            backoff: BackoffConfig {
                min_backoff_ms: 1,
                max_backoff_ms: 5,
                factor: 2,
                jitter_percent: 0,
            },
        })
        .with_circuit_breaker(CircuitBreakerConfig::default())
}

#[test]
fn manifest_is_ordered_retry_breaker_limiter_around_the_raw_connector() {
    let manifest = full_builder().to_stack();
    assert_eq!(manifest.provider, "tickd-mock");
    assert_eq!(
        manifest.layer_names(),
        [
            "RetryConnector",
            "CircuitBreakerConnector",
            "RateLimitConnector",
        ]
    );
    let positions: Vec<usize> = manifest.layers.iter().map(|l| l.position).collect();
    assert_eq!(positions, [0, 1, 2], "positions count from the outermost");
}

#[test]
fn layers_are_replaced_not_duplicated() {
    let manifest = full_builder().with_retry(RetryConfig::default()).to_stack();
    let retries = manifest
        .layers
        .iter()
        .filter(|l| l.name == "RetryConnector")
        .count();
    assert_eq!(retries, 1);
}

#[test]
fn without_removes_a_layer() {
    let manifest = full_builder().without_circuit_breaker().to_stack();
    assert!(!manifest.has_layer("CircuitBreakerConnector"));
    assert!(manifest.has_layer("RateLimitConnector"));
}

#[tokio::test]
async fn built_stack_still_serves_data_and_keeps_identity() {
    let wrapped = full_builder().build().expect("valid stack");
    assert_eq!(wrapped.id(), "tickd-mock");

    let bars = wrapped
        .as_history_provider()
        .expect("capability survives wrapping")
        .daily_bars("SPY", None, None)
        .await
        .unwrap();
    assert!(!bars.is_empty());
}

#[tokio::test]
async fn streaming_capability_survives_wrapping() {
    let wrapped = full_builder().build().expect("valid stack");
    assert!(wrapped.as_streaming_provider().is_some());
    assert!(wrapped
        .streaming_capabilities()
        .supports(tickd_types::StreamingCaps::DEPTH));
}
