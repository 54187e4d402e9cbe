//! Shared fakes and wiring for the engine integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use tokio::sync::mpsc;
use uuid::Uuid;

use pulse_core::config::{RealtimeConfig, ResilienceConfig};
use pulse_core::error::AppError;
use pulse_core::result::AppResult;
use pulse_core::traits::{Authenticator, MetricsSampler};
use pulse_core::types::{NetworkStats, Principal, Snapshot};
use pulse_realtime::broadcast::GuardedSampler;
use pulse_realtime::connection::ConnectionHandle;
use pulse_realtime::message::OutboundMessage;
use pulse_realtime::metrics::EngineMetrics;
use pulse_realtime::{BroadcastEngine, ConnectionManager};
use pulse_resilience::{CircuitBreakerConfig, CircuitBreakerRegistry, RecoveryPolicy};
use tokio_util::sync::CancellationToken;

/// Snapshot number `seq`, distinguishable by its timestamp.
pub fn snapshot(seq: i64) -> Snapshot {
    Snapshot {
        cpu_percent: 10.0,
        memory_percent: 20.0,
        disk_percent: 30.0,
        network_stats: NetworkStats::default(),
        process_count: 100,
        timestamp: DateTime::from_timestamp(1_700_000_000 + seq, 0).unwrap(),
    }
}

/// Sampler that replays a script, then returns numbered snapshots.
#[derive(Debug, Default)]
pub struct ScriptedSampler {
    script: Mutex<VecDeque<AppResult<Snapshot>>>,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl ScriptedSampler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, result: AppResult<Snapshot>) {
        self.script.lock().unwrap().push_back(result);
    }

    /// Fail every unscripted call while `failing` is set.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetricsSampler for ScriptedSampler {
    async fn sample(&self) -> AppResult<Snapshot> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(result) = self.script.lock().unwrap().pop_front() {
            return result;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::external_service("sensor offline"));
        }
        Ok(snapshot(call as i64))
    }
}

/// Accepts any token except `"bad"`.
#[derive(Debug)]
pub struct StaticAuth;

#[async_trait]
impl Authenticator for StaticAuth {
    async fn authenticate(&self, token: &str) -> AppResult<Principal> {
        if token == "bad" {
            return Err(AppError::authentication("Invalid token"));
        }
        Ok(Principal::new(Uuid::new_v4(), token))
    }
}

/// A connection manager and broadcaster wired to a scripted sampler.
pub struct Harness {
    pub manager: Arc<ConnectionManager>,
    pub engine: BroadcastEngine,
    pub sampler: Arc<ScriptedSampler>,
    pub breakers: Arc<CircuitBreakerRegistry>,
    pub metrics: Arc<EngineMetrics>,
}

impl Harness {
    pub fn new(realtime: RealtimeConfig, resilience: ResilienceConfig) -> Self {
        let sampler = Arc::new(ScriptedSampler::new());
        let metrics = Arc::new(EngineMetrics::new());
        let policy = RecoveryPolicy::new(&resilience.retry);
        let breakers = Arc::new(CircuitBreakerRegistry::new(CircuitBreakerConfig::from(
            &resilience.circuit_breaker,
        )));
        let manager = Arc::new(ConnectionManager::new(
            realtime,
            &resilience,
            Arc::clone(&breakers),
            Arc::clone(&metrics),
            CancellationToken::new(),
        ));
        let guarded = GuardedSampler::new(
            Arc::clone(&sampler) as Arc<dyn MetricsSampler>,
            &breakers,
            policy.clone(),
            Duration::from_secs(1),
        );
        let engine = BroadcastEngine::new(
            Arc::clone(&manager),
            guarded,
            policy,
            Arc::clone(&metrics),
        );
        Self {
            manager,
            engine,
            sampler,
            breakers,
            metrics,
        }
    }

    pub fn connect(&self, username: &str) -> Arc<ConnectionHandle> {
        self.manager
            .open(Principal::new(Uuid::new_v4(), username))
            .unwrap()
    }
}

/// Drain `handle` like a socket writer would, forwarding every text frame.
///
/// The receiver yields `None` once the writer stops.
pub fn spawn_writer(handle: Arc<ConnectionHandle>) -> mpsc::UnboundedReceiver<OutboundMessage> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(frame) = handle.next_outbound().await {
            if let Some(Ok(msg)) = frame.payload().map(serde_json::from_str::<OutboundMessage>) {
                let _ = tx.send(msg);
            }
            frame.complete(Ok(()));
        }
        handle.mark_drained();
    });
    rx
}

/// The snapshot carried by a `metrics_update`.
pub fn expect_update(msg: Option<OutboundMessage>) -> Snapshot {
    match msg {
        Some(OutboundMessage::MetricsUpdate { data }) => data,
        other => panic!("expected metrics_update, got {other:?}"),
    }
}
