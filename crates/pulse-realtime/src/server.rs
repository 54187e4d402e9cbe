//! Top-level real-time engine that ties together all subsystems.

use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use pulse_core::config::{AppConfig, RealtimeConfig};
use pulse_core::error::AppError;
use pulse_core::traits::{Authenticator, MetricsSampler};
use pulse_resilience::{
    CircuitBreakerConfig, CircuitBreakerRegistry, Failure, RecoveryPolicy,
};

use crate::broadcast::engine::{BROADCAST_COMPONENT, BroadcastEngine};
use crate::broadcast::sampling::GuardedSampler;
use crate::connection::authenticator::WsAuthenticator;
use crate::connection::manager::ConnectionManager;
use crate::metrics::EngineMetrics;

/// Central real-time engine that coordinates the broadcast subsystems.
pub struct RealtimeEngine {
    /// Connection manager.
    pub connections: Arc<ConnectionManager>,
    /// Periodic broadcaster.
    pub broadcaster: Arc<BroadcastEngine>,
    /// Connection authenticator.
    pub authenticator: WsAuthenticator,
    /// Every circuit breaker in the engine.
    pub breakers: Arc<CircuitBreakerRegistry>,
    /// Metrics collector.
    pub metrics: Arc<EngineMetrics>,
    /// Recovery decision table.
    pub policy: RecoveryPolicy,
    config: RealtimeConfig,
    broadcast_cancel: CancellationToken,
    shutdown: CancellationToken,
    broadcast_task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for RealtimeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeEngine")
            .field("connections", &self.connections.connection_count())
            .field("shutting_down", &self.shutdown.is_cancelled())
            .finish()
    }
}

impl RealtimeEngine {
    /// Creates a new real-time engine with all subsystems.
    pub fn new(
        config: &AppConfig,
        authenticator: Arc<dyn Authenticator>,
        sampler: Arc<dyn MetricsSampler>,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let metrics = Arc::new(EngineMetrics::new());
        let policy = RecoveryPolicy::new(&config.resilience.retry);
        let breakers = Arc::new(CircuitBreakerRegistry::new(CircuitBreakerConfig::from(
            &config.resilience.circuit_breaker,
        )));

        let connections = Arc::new(ConnectionManager::new(
            config.realtime.clone(),
            &config.resilience,
            Arc::clone(&breakers),
            Arc::clone(&metrics),
            shutdown.clone(),
        ));
        let sampler = GuardedSampler::new(
            sampler,
            &breakers,
            policy.clone(),
            config.sampler.timeout(),
        );
        let broadcaster = Arc::new(BroadcastEngine::new(
            Arc::clone(&connections),
            sampler,
            policy.clone(),
            Arc::clone(&metrics),
        ));
        let authenticator = WsAuthenticator::new(
            authenticator,
            config.realtime.handshake_timeout(),
            Arc::clone(&metrics),
        );

        info!("Real-time engine initialized");

        Self {
            connections,
            broadcaster,
            authenticator,
            breakers,
            metrics,
            policy,
            config: config.realtime.clone(),
            broadcast_cancel: shutdown.child_token(),
            shutdown,
            broadcast_task: Mutex::new(None),
        }
    }

    /// Start the broadcast loop. Calling it again while running is a no-op.
    ///
    /// The loop is supervised: if it panics, the panic is escalated and the
    /// loop restarted.
    pub fn start(&self) {
        let mut task = self
            .broadcast_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if task.is_some() || self.broadcast_cancel.is_cancelled() {
            return;
        }

        let broadcaster = Arc::clone(&self.broadcaster);
        let cancel = self.broadcast_cancel.clone();
        let policy = self.policy.clone();
        let metrics = Arc::clone(&self.metrics);

        *task = Some(tokio::spawn(async move {
            let mut restarts = 0;
            loop {
                let run = tokio::spawn({
                    let broadcaster = Arc::clone(&broadcaster);
                    let cancel = cancel.clone();
                    async move { broadcaster.run(cancel).await }
                });

                match run.await {
                    Ok(()) => break,
                    Err(e) => {
                        let (_, action) = policy.handle(&Failure::from(e), BROADCAST_COMPONENT, restarts);
                        if action.is_escalation() {
                            EngineMetrics::inc(&metrics.escalations);
                        }
                        if cancel.is_cancelled() {
                            break;
                        }
                        let delay = policy.backoff(restarts);
                        warn!(restarts, delay_ms = delay.as_millis() as u64, "Restarting broadcast loop");
                        tokio::time::sleep(delay).await;
                        restarts += 1;
                    }
                }
            }
        }));
    }

    /// Whether shutdown has begun.
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Resolves once shutdown has completed.
    pub async fn stopped(&self) {
        self.shutdown.cancelled().await;
    }

    /// Realtime configuration.
    pub fn config(&self) -> &RealtimeConfig {
        &self.config
    }

    /// Initiates a graceful shutdown of the real-time engine.
    ///
    /// The broadcast loop is stopped first, so no new deliveries start.
    /// Each connection then gets `drain_grace` to flush before it is cancelled.
    pub async fn shutdown(&self) -> Result<(), AppError> {
        info!("Shutting down real-time engine");

        self.broadcast_cancel.cancel();
        let task = self
            .broadcast_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(task) = task {
            task.await
                .map_err(|e| AppError::internal(format!("Broadcast supervisor failed: {e}")))?;
        }

        let closed = self.connections.close_all(self.config.drain_grace()).await;
        self.shutdown.cancel();

        info!(closed, "Real-time engine shut down");
        Ok(())
    }
}
