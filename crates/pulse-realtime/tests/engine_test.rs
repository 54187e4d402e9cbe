//! Integration tests for the assembled real-time engine.

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use pulse_core::config::{AppConfig, RealtimeConfig};
use pulse_core::traits::MetricsSampler;
use pulse_realtime::RealtimeEngine;
use pulse_realtime::connection::CloseReason;
use pulse_resilience::Failure;

use helpers::{ScriptedSampler, StaticAuth, expect_update, spawn_writer};

fn engine() -> RealtimeEngine {
    let config = AppConfig {
        realtime: RealtimeConfig {
            broadcast_interval_ms: 20,
            drain_grace_ms: 200,
            ..RealtimeConfig::default()
        },
        ..AppConfig::default()
    };
    RealtimeEngine::new(
        &config,
        Arc::new(StaticAuth),
        Arc::new(ScriptedSampler::new()) as Arc<dyn MetricsSampler>,
    )
}

#[tokio::test]
async fn test_started_engine_broadcasts_to_authenticated_connection() {
    let engine = engine();
    let principal = engine.authenticator.authenticate(Some("alice")).await.unwrap();
    let conn = engine.connections.open(principal).unwrap();
    let mut rx = spawn_writer(conn.clone());

    engine.start();
    engine.start();

    let first = expect_update(rx.recv().await);
    let second = expect_update(rx.recv().await);
    assert!(second.timestamp > first.timestamp);

    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_rejected_token_never_registers() {
    let engine = engine();
    let err = engine.authenticator.authenticate(Some("bad")).await.unwrap_err();
    assert!(matches!(err, Failure::AuthFailure(_)));
    let err = engine.authenticator.authenticate(None).await.unwrap_err();
    assert!(matches!(err, Failure::AuthFailure(_)));

    assert_eq!(engine.connections.connection_count(), 0);
    assert_eq!(engine.metrics.snapshot().auth_failures, 2);
}

#[tokio::test]
async fn test_shutdown_drains_every_connection() {
    let engine = engine();
    let mut receivers = Vec::new();
    let mut handles = Vec::new();
    for name in ["a", "b", "c"] {
        let principal = engine.authenticator.authenticate(Some(name)).await.unwrap();
        let conn = engine.connections.open(principal).unwrap();
        receivers.push(spawn_writer(conn.clone()));
        handles.push(conn);
    }

    engine.start();
    for rx in &mut receivers {
        expect_update(rx.recv().await);
    }

    engine.shutdown().await.unwrap();
    assert!(engine.is_shutting_down());
    assert_eq!(engine.connections.connection_count(), 0);
    assert_eq!(engine.metrics.snapshot().connections_active, 0);

    for handle in &handles {
        assert_eq!(handle.close_reason(), Some(CloseReason::Shutdown));
        assert!(!handle.is_open());
    }
    for rx in &mut receivers {
        while rx.recv().await.is_some() {}
    }

    tokio::time::timeout(Duration::from_secs(1), engine.stopped())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_shutdown_mid_delivery_leaves_no_delivery_breakers() {
    let engine = engine();
    let principal = engine.authenticator.authenticate(Some("stuck")).await.unwrap();
    // No writer: the first delivery stays in flight until the send timeout.
    let conn = engine.connections.open(principal).unwrap();
    let delivery_breaker = Arc::clone(conn.breaker());

    engine.start();
    for _ in 0..100 {
        if conn.backpressure().current_buffer_size > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(conn.backpressure().current_buffer_size > 0);

    engine.shutdown().await.unwrap();

    // The abandoned delivery is charged to a breaker that left with its connection.
    assert_eq!(delivery_breaker.stats().failure_count, 1);
    assert!(engine.breakers.get(delivery_breaker.name()).is_none());
    let remaining = engine.breakers.stats();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].failure_count, 0);

    let metrics = engine.metrics.snapshot();
    assert_eq!(metrics.connections_evicted, 0);
    assert_eq!(metrics.deliveries_failed, 0);
}

#[tokio::test]
async fn test_open_after_shutdown_is_refused() {
    let engine = engine();
    engine.shutdown().await.unwrap();

    let principal = engine.authenticator.authenticate(Some("late")).await.unwrap();
    let err = engine.connections.open(principal).unwrap_err();
    assert!(matches!(err, Failure::TransientIo(_)));
    assert_eq!(engine.connections.connection_count(), 0);
}
