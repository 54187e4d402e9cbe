//! Connection lifecycle: open, remove, inbound routing, and drain.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use pulse_core::config::{RealtimeConfig, ResilienceConfig};
use pulse_core::types::Principal;
use pulse_resilience::{
    BackpressureHandler, CircuitBreakerConfig, CircuitBreakerRegistry, Failure, OverflowPolicy,
};

use crate::message::serializer::{deserialize_inbound, serialize_outbound};
use crate::message::types::{InboundMessage, OutboundMessage};
use crate::metrics::EngineMetrics;

use super::close::CloseReason;
use super::handle::{ConnectionHandle, ConnectionId, ConnectionInfo};
use super::registry::{ConnectionRegistry, Registration};

/// Prefix of per-connection delivery breaker names.
pub const DELIVERY_BREAKER_PREFIX: &str = "delivery:";

/// Manages all live connections.
#[derive(Debug)]
pub struct ConnectionManager {
    registry: ConnectionRegistry,
    breakers: Arc<CircuitBreakerRegistry>,
    metrics: Arc<EngineMetrics>,
    config: RealtimeConfig,
    delivery_breaker: CircuitBreakerConfig,
    overflow: OverflowPolicy,
    shutdown: CancellationToken,
    draining: AtomicBool,
}

impl ConnectionManager {
    /// Creates a new connection manager.
    ///
    /// Connection writers are cancelled when `shutdown` is.
    pub fn new(
        config: RealtimeConfig,
        resilience: &ResilienceConfig,
        breakers: Arc<CircuitBreakerRegistry>,
        metrics: Arc<EngineMetrics>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            registry: ConnectionRegistry::new(config.max_connections),
            breakers,
            metrics,
            delivery_breaker: CircuitBreakerConfig::from(&resilience.delivery_breaker),
            overflow: OverflowPolicy::from(resilience.backpressure.overflow_policy),
            config,
            shutdown,
            draining: AtomicBool::new(false),
        }
    }

    /// Registers a connection for an authenticated principal.
    ///
    /// Fails with [`Failure::CapacityExceeded`] when `max_connections` are
    /// already registered, and with a transient failure once
    /// [`close_all`](Self::close_all) has started.
    pub fn open(&self, principal: Principal) -> Result<Arc<ConnectionHandle>, Failure> {
        if self.is_draining() {
            return Err(Self::draining_failure());
        }

        let id = Uuid::new_v4();
        let breaker_name = format!("{DELIVERY_BREAKER_PREFIX}{id}");
        let breaker = self
            .breakers
            .get_or_create_with(&breaker_name, self.delivery_breaker.clone());

        let handle = Arc::new(ConnectionHandle::new(
            id,
            principal,
            BackpressureHandler::new(
                id.to_string(),
                self.config.outbound_buffer_size,
                self.overflow,
            ),
            breaker,
            self.shutdown.child_token(),
        ));

        match self.registry.register(Arc::clone(&handle)) {
            // A drain that started after the check above may have missed this one.
            Registration::Added | Registration::AlreadyPresent if self.is_draining() => {
                self.registry.unregister(&id);
                self.breakers.remove(&breaker_name);
                handle.force_close(CloseReason::Shutdown);
                return Err(Self::draining_failure());
            }
            Registration::Added | Registration::AlreadyPresent => {}
            Registration::Full => {
                self.breakers.remove(&breaker_name);
                EngineMetrics::inc(&self.metrics.connections_rejected);
                warn!(
                    user_id = %handle.principal.user_id,
                    max = self.registry.capacity(),
                    "Connection limit reached, refusing connection"
                );
                return Err(Failure::CapacityExceeded(format!(
                    "connection limit of {} reached",
                    self.registry.capacity()
                )));
            }
        }

        self.metrics.connection_opened();
        info!(
            conn_id = %id,
            user_id = %handle.principal.user_id,
            username = %handle.principal.username,
            active = self.registry.len(),
            "Connection registered"
        );
        Ok(handle)
    }

    /// Unregisters a connection and closes it.
    ///
    /// Returns `false` if it was not registered, so concurrent removals of
    /// the same connection take effect once.
    pub fn remove(&self, conn_id: &ConnectionId, reason: CloseReason) -> bool {
        let Some(handle) = self.registry.unregister(conn_id) else {
            return false;
        };

        self.breakers.remove(handle.breaker().name());
        let evicted = matches!(reason, CloseReason::DeliveryFailed(_));
        if evicted {
            self.metrics.connection_evicted();
            warn!(
                conn_id = %conn_id,
                user_id = %handle.principal.user_id,
                reason = %reason,
                "Connection evicted"
            );
        } else {
            self.metrics.connection_closed();
            info!(
                conn_id = %conn_id,
                user_id = %handle.principal.user_id,
                reason = %reason,
                "Connection unregistered"
            );
        }

        if reason.is_graceful() {
            handle.close(reason);
        } else {
            handle.force_close(reason);
        }
        true
    }

    /// Processes one inbound text message.
    ///
    /// Any message counts as activity. `ping` is answered with `pong`.
    /// Malformed input is a [`Failure::ProtocolViolation`]; the caller
    /// closes the connection.
    pub fn handle_inbound(&self, conn_id: &ConnectionId, raw_message: &str) -> Result<(), Failure> {
        let handle = self
            .registry
            .get(conn_id)
            .ok_or_else(|| Failure::ProtocolViolation(format!("unknown connection {conn_id}")))?;

        handle.touch();
        EngineMetrics::inc(&self.metrics.messages_received);

        let msg = deserialize_inbound(raw_message)
            .map_err(|e| Failure::ProtocolViolation(format!("Failed to parse message: {e}")))?;

        match msg {
            InboundMessage::Ping { timestamp } => {
                let pong = OutboundMessage::Pong {
                    timestamp: timestamp.unwrap_or_else(|| Utc::now().timestamp_millis()),
                };
                let payload = serialize_outbound(&pong)?;
                if !handle.enqueue(payload.into()) {
                    EngineMetrics::inc(&self.metrics.messages_dropped);
                    debug!(conn_id = %conn_id, "Pong dropped, outbound buffer full");
                }
            }
            InboundMessage::Pong { .. } => {
                debug!(conn_id = %conn_id, "Pong received");
            }
        }
        Ok(())
    }

    /// Closes every connection, giving each up to `grace` to flush.
    ///
    /// Writers still running after the grace period are cancelled.
    /// Returns the number of connections closed.
    pub async fn close_all(&self, grace: Duration) -> usize {
        self.draining.store(true, Ordering::SeqCst);
        let members = self.registry.snapshot_members();
        if members.is_empty() {
            return 0;
        }

        for handle in &members {
            handle.close(CloseReason::Shutdown);
        }
        let drained = join_all(members.iter().map(|handle| handle.wait_drained(grace))).await;

        let mut forced = 0;
        for (handle, drained) in members.iter().zip(drained) {
            if !drained {
                handle.force_close(CloseReason::Shutdown);
                forced += 1;
            }
            self.remove(&handle.id, CloseReason::Shutdown);
        }

        info!(count = members.len(), forced, "All connections closed");
        members.len()
    }

    /// Whether new connections are refused because of a drain.
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }

    fn draining_failure() -> Failure {
        Failure::TransientIo("server is shutting down".into())
    }

    /// The live member registry.
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Gets a specific connection by ID.
    pub fn get(&self, conn_id: &ConnectionId) -> Option<Arc<ConnectionHandle>> {
        self.registry.get(conn_id)
    }

    /// Returns total number of live connections.
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// Info for every live connection.
    pub fn connections(&self) -> Vec<ConnectionInfo> {
        self.registry
            .snapshot_members()
            .iter()
            .map(|handle| handle.info())
            .collect()
    }

    /// Realtime configuration.
    pub fn config(&self) -> &RealtimeConfig {
        &self.config
    }
}
