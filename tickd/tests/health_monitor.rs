use std::time::Duration;

use tickd::ConnectionHealthMonitor;
use tickd_types::{ConnectionEvent, HealthMonitorConfig};

fn fast_config() -> HealthMonitorConfig {
    HealthMonitorConfig {
        // Long check interval: tests drive sweeps explicitly.
        check_interval: Duration::from_secs(600),
        heartbeat_interval: Duration::from_millis(30),
        lost_threshold: 3,
    }
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<ConnectionEvent>) -> Vec<ConnectionEvent> {
    let mut out = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        out.push(ev);
    }
    out
}

#[tokio::test(flavor = "multi_thread")]
async fn silence_escalates_from_missed_to_lost() {
    let monitor = ConnectionHealthMonitor::spawn(fast_config());
    let mut events = monitor.subscribe();
    monitor.register("ib");

    tokio::time::sleep(Duration::from_millis(45)).await;
    monitor.check_now();
    let emitted = drain(&mut events);
    assert!(emitted.iter().any(|e| matches!(
        e,
        ConnectionEvent::HeartbeatMissed { id, missed_count: 1 } if id == "ib"
    )));
    assert!(!emitted
        .iter()
        .any(|e| matches!(e, ConnectionEvent::ConnectionLost { .. })));

    tokio::time::sleep(Duration::from_millis(75)).await;
    monitor.check_now();
    let emitted = drain(&mut events);
    assert!(emitted.iter().any(|e| matches!(
        e,
        ConnectionEvent::ConnectionLost { id, .. } if id == "ib"
    )));
}

#[tokio::test(flavor = "multi_thread")]
async fn heartbeats_keep_the_connection_healthy() {
    let monitor = ConnectionHealthMonitor::spawn(fast_config());
    let mut events = monitor.subscribe();
    monitor.register("ib");

    for _ in 0..5 {
        tokio::time::sleep(Duration::from_millis(15)).await;
        monitor.record_heartbeat("ib");
        monitor.check_now();
    }
    assert!(drain(&mut events).is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn data_resumption_recovers_a_lost_connection() {
    let monitor = ConnectionHealthMonitor::spawn(fast_config());
    let mut events = monitor.subscribe();
    monitor.register("ib");

    tokio::time::sleep(Duration::from_millis(120)).await;
    monitor.check_now();
    assert!(drain(&mut events)
        .iter()
        .any(|e| matches!(e, ConnectionEvent::ConnectionLost { .. })));

    tokio::time::sleep(Duration::from_millis(10)).await;
    monitor.record_data("ib");
    monitor.check_now();
    let emitted = drain(&mut events);
    assert!(emitted.iter().any(|e| matches!(
        e,
        ConnectionEvent::ConnectionRecovered { id } if id == "ib"
    )));

    // Healthy again: no immediate re-loss.
    monitor.check_now();
    assert!(drain(&mut events)
        .iter()
        .all(|e| !matches!(e, ConnectionEvent::ConnectionLost { .. })));
}

#[tokio::test(flavor = "multi_thread")]
async fn deregistered_connections_are_not_inspected() {
    let monitor = ConnectionHealthMonitor::spawn(fast_config());
    let mut events = monitor.subscribe();
    monitor.register("ib");
    monitor.deregister("ib");

    tokio::time::sleep(Duration::from_millis(120)).await;
    monitor.check_now();
    assert!(drain(&mut events).is_empty());
}
