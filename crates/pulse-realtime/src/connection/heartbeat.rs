//! Server pings and idle detection.
//!
//! Keepalive uses WebSocket protocol pings, which any conforming client
//! answers without application code. A connection is idle once a ping has
//! gone unanswered, with no other inbound traffic, for `idle_timeout`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use pulse_core::config::RealtimeConfig;

use crate::message::serializer::serialize_outbound;
use crate::message::types::OutboundMessage;

use super::close::CloseReason;
use super::handle::ConnectionHandle;

/// Heartbeat configuration
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// Interval between pings
    pub ping_interval: Duration,
    /// How long a ping may go unanswered
    pub idle_timeout: Duration,
    /// Send a JSON `ping` message alongside each protocol ping
    pub json_keepalive: bool,
}

impl From<&RealtimeConfig> for HeartbeatConfig {
    fn from(config: &RealtimeConfig) -> Self {
        Self {
            ping_interval: config.ping_interval(),
            idle_timeout: config.idle_timeout(),
            json_keepalive: config.json_keepalive,
        }
    }
}

/// Run the heartbeat loop for a connection.
///
/// Queues a protocol ping every `ping_interval` and returns
/// [`CloseReason::IdleTimeout`] once the oldest unanswered ping is older
/// than `idle_timeout`. Returns the connection's close reason if it is
/// closed first.
pub async fn run_heartbeat(handle: Arc<ConnectionHandle>, config: HeartbeatConfig) -> CloseReason {
    let period = config.ping_interval.max(Duration::from_millis(1));
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut unanswered: Option<Instant> = None;

    loop {
        tokio::select! {
            _ = handle.closed() => {
                return handle.close_reason().unwrap_or(CloseReason::Shutdown);
            }
            _ = interval.tick() => {}
        }

        if let Some(sent_at) = unanswered {
            if handle.last_activity() >= sent_at {
                unanswered = None;
            } else if sent_at.elapsed() >= config.idle_timeout {
                warn!(
                    conn_id = %handle.id,
                    idle_ms = handle.idle_for().as_millis() as u64,
                    "Connection idle timeout"
                );
                return CloseReason::IdleTimeout;
            }
        }

        if handle.enqueue_ping() {
            unanswered.get_or_insert_with(Instant::now);
        } else {
            debug!(conn_id = %handle.id, "Ping dropped, outbound buffer full");
        }

        if config.json_keepalive {
            send_json_ping(&handle);
        }
    }
}

fn send_json_ping(handle: &ConnectionHandle) {
    let ping = OutboundMessage::Ping {
        timestamp: Utc::now().timestamp_millis(),
    };
    match serialize_outbound(&ping) {
        Ok(payload) => {
            if !handle.enqueue(payload.into()) {
                debug!(conn_id = %handle.id, "JSON ping dropped, outbound buffer full");
            }
        }
        Err(e) => warn!(conn_id = %handle.id, error = %e, "Failed to serialize ping"),
    }
}

#[cfg(test)]
mod tests {
    use pulse_core::types::Principal;
    use pulse_resilience::{
        BackpressureHandler, CircuitBreaker, CircuitBreakerConfig, OverflowPolicy,
    };
    use tokio_util::sync::CancellationToken;
    use uuid::Uuid;

    use crate::connection::handle::FrameKind;
    use super::*;

    fn handle() -> Arc<ConnectionHandle> {
        let id = Uuid::new_v4();
        Arc::new(ConnectionHandle::new(
            id,
            Principal::new(Uuid::new_v4(), "user"),
            BackpressureHandler::new(id.to_string(), 8, OverflowPolicy::DropOldest),
            Arc::new(CircuitBreaker::new(id.to_string(), CircuitBreakerConfig::default())),
            CancellationToken::new(),
        ))
    }

    fn config(ping_ms: u64, idle_ms: u64) -> HeartbeatConfig {
        HeartbeatConfig {
            ping_interval: Duration::from_millis(ping_ms),
            idle_timeout: Duration::from_millis(idle_ms),
            json_keepalive: false,
        }
    }

    /// Reads frames like a writer would; answers pings when `answer` is set.
    fn client(handle: &Arc<ConnectionHandle>, answer: bool) -> tokio::task::JoinHandle<usize> {
        let handle = Arc::clone(handle);
        tokio::spawn(async move {
            let mut pings = 0;
            while let Some(frame) = handle.next_outbound().await {
                if frame.kind() == &FrameKind::Ping {
                    pings += 1;
                    if answer {
                        handle.touch();
                    }
                }
                frame.complete(Ok(()));
            }
            pings
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_sends_protocol_pings() {
        let handle = handle();
        let task = tokio::spawn(run_heartbeat(Arc::clone(&handle), config(10, 60_000)));

        let frame = handle.next_outbound().await.unwrap();
        assert_eq!(frame.kind(), &FrameKind::Ping);

        handle.close(CloseReason::ClientClosed);
        assert_eq!(task.await.unwrap(), CloseReason::ClientClosed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_json_keepalive_adds_ping_message() {
        let handle = handle();
        let task = tokio::spawn(run_heartbeat(
            Arc::clone(&handle),
            HeartbeatConfig {
                json_keepalive: true,
                ..config(10, 60_000)
            },
        ));

        assert_eq!(handle.next_outbound().await.unwrap().kind(), &FrameKind::Ping);
        let frame = handle.next_outbound().await.unwrap();
        let msg: OutboundMessage = serde_json::from_str(frame.payload().unwrap()).unwrap();
        assert!(matches!(msg, OutboundMessage::Ping { .. }));

        handle.close(CloseReason::ClientClosed);
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_ping_times_out() {
        let handle = handle();
        let reader = client(&handle, false);
        let started = Instant::now();

        let reason = run_heartbeat(Arc::clone(&handle), config(10, 50)).await;

        assert_eq!(reason, CloseReason::IdleTimeout);
        assert!(started.elapsed() >= Duration::from_millis(60));
        handle.force_close(reason);
        assert!(reader.await.unwrap() >= 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_answered_pings_keep_quiet_client_open() {
        let handle = handle();
        let reader = client(&handle, true);

        // The idle timeout equals the ping interval; answered pings must not trip it.
        let outcome = tokio::time::timeout(
            Duration::from_millis(500),
            run_heartbeat(Arc::clone(&handle), config(10, 10)),
        )
        .await;
        assert!(outcome.is_err());

        handle.force_close(CloseReason::ClientClosed);
        assert!(reader.await.unwrap() >= 40);
    }
}
