//! Shared test helpers for the HTTP and WebSocket tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use uuid::Uuid;

use pulse_api::AppState;
use pulse_auth::{JwtAuthenticator, JwtEncoder};
use pulse_core::config::{AppConfig, RealtimeConfig};
use pulse_core::error::AppError;
use pulse_core::result::AppResult;
use pulse_core::traits::MetricsSampler;
use pulse_core::types::{NetworkStats, Snapshot};
use pulse_realtime::RealtimeEngine;

/// Sampler returning a fixed reading stamped with the current time.
#[derive(Debug)]
pub struct FixedSampler;

#[async_trait]
impl MetricsSampler for FixedSampler {
    async fn sample(&self) -> AppResult<Snapshot> {
        Ok(Snapshot {
            cpu_percent: 50.0,
            memory_percent: 60.0,
            disk_percent: 70.0,
            network_stats: NetworkStats {
                bytes_sent: 1,
                bytes_recv: 2,
                packets_sent: 3,
                packets_recv: 4,
            },
            process_count: 10,
            timestamp: Utc::now(),
        })
    }
}

/// Test configuration with a fast broadcast cadence.
pub fn test_config() -> AppConfig {
    AppConfig {
        realtime: RealtimeConfig {
            broadcast_interval_ms: 50,
            drain_grace_ms: 500,
            ..RealtimeConfig::default()
        },
        ..AppConfig::default()
    }
}

/// Application state wired to the real JWT authenticator and a fixed sampler.
pub fn test_state(config: AppConfig) -> AppState {
    let authenticator = Arc::new(JwtAuthenticator::new(&config.auth));
    let realtime = Arc::new(RealtimeEngine::new(
        &config,
        authenticator,
        Arc::new(FixedSampler),
    ));
    AppState::new(config, realtime)
}

/// Mints a valid token for `config`.
pub fn token_for(config: &AppConfig, username: &str) -> String {
    JwtEncoder::new(&config.auth)
        .issue(Uuid::new_v4(), username)
        .expect("Failed to issue token")
        .token
}

/// A server bound to an ephemeral local port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub state: AppState,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<(), AppError>>,
}

impl TestServer {
    pub async fn start(config: AppConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().expect("Listener has no address");
        let state = test_state(config);
        let (tx, rx) = oneshot::channel::<()>();

        let task = tokio::spawn(pulse_api::serve(listener, state.clone(), async move {
            let _ = rx.await;
        }));

        Self {
            addr,
            state,
            shutdown: Some(tx),
            task,
        }
    }

    pub fn ws_url(&self, token: Option<&str>) -> String {
        match token {
            Some(token) => format!("ws://{}/ws?token={token}", self.addr),
            None => format!("ws://{}/ws", self.addr),
        }
    }

    /// Signals shutdown and waits for the server to return.
    pub async fn stop(mut self) -> Result<(), AppError> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.task.await.expect("Server task panicked")
    }
}
