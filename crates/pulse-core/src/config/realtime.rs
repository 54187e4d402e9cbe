//! Real-time broadcast engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Real-time (WebSocket) broadcast configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Interval between broadcast ticks in milliseconds.
    #[serde(default = "default_broadcast_interval")]
    pub broadcast_interval_ms: u64,
    /// Deadline for delivering one tick to one connection, in milliseconds.
    #[serde(default = "default_send_timeout")]
    pub send_timeout_ms: u64,
    /// Deadline for authenticating a freshly upgraded connection, in milliseconds.
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_ms: u64,
    /// Maximum frames buffered per connection before new frames are dropped.
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer_size: usize,
    /// Server ping interval in seconds.
    #[serde(default = "default_ping_interval")]
    pub ping_interval_seconds: u64,
    /// Connections that leave a protocol ping unanswered for this long are
    /// closed, in seconds.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_seconds: u64,
    /// Also send a JSON `ping` message with every protocol ping.
    #[serde(default)]
    pub json_keepalive: bool,
    /// Grace period given to each connection to drain on shutdown, in milliseconds.
    #[serde(default = "default_drain_grace")]
    pub drain_grace_ms: u64,
    /// Maximum concurrently registered connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl RealtimeConfig {
    /// Broadcast tick interval.
    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_millis(self.broadcast_interval_ms)
    }

    /// Per-delivery timeout.
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    /// Authentication deadline.
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Heartbeat ping interval.
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_seconds)
    }

    /// Idle connection cutoff.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_seconds)
    }

    /// Shutdown drain grace period.
    pub fn drain_grace(&self) -> Duration {
        Duration::from_millis(self.drain_grace_ms)
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            broadcast_interval_ms: default_broadcast_interval(),
            send_timeout_ms: default_send_timeout(),
            handshake_timeout_ms: default_handshake_timeout(),
            outbound_buffer_size: default_outbound_buffer(),
            ping_interval_seconds: default_ping_interval(),
            idle_timeout_seconds: default_idle_timeout(),
            json_keepalive: false,
            drain_grace_ms: default_drain_grace(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_broadcast_interval() -> u64 {
    1000
}

fn default_send_timeout() -> u64 {
    2000
}

fn default_handshake_timeout() -> u64 {
    5000
}

fn default_outbound_buffer() -> usize {
    32
}

fn default_ping_interval() -> u64 {
    30
}

fn default_idle_timeout() -> u64 {
    90
}

fn default_drain_grace() -> u64 {
    2000
}

fn default_max_connections() -> usize {
    10000
}
