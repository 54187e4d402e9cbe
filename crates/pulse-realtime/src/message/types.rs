//! Inbound and outbound WebSocket message type definitions.

use serde::{Deserialize, Serialize};

use pulse_core::types::Snapshot;

/// Messages sent by the client to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    /// Client-initiated keepalive; answered with `pong`.
    Ping {
        /// Client timestamp, echoed back.
        #[serde(default)]
        timestamp: Option<i64>,
    },
    /// Response to a server ping.
    Pong {
        /// Echoed timestamp.
        #[serde(default)]
        timestamp: Option<i64>,
    },
}

/// Messages sent by the server to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// One metrics snapshot.
    MetricsUpdate {
        /// The snapshot.
        data: Snapshot,
    },
    /// Server keepalive.
    Ping {
        /// Server timestamp in milliseconds since epoch.
        timestamp: i64,
    },
    /// Response to a client ping.
    Pong {
        /// Echoed client timestamp, or server time if none was sent.
        timestamp: i64,
    },
    /// Error report, sent before the server closes the connection.
    Error {
        /// Human-readable error message.
        message: String,
    },
}
