//! JSON serialization for WebSocket messages.

use std::sync::Arc;

use pulse_core::types::Snapshot;

use super::types::{InboundMessage, OutboundMessage};

/// Serialize an outbound message.
pub fn serialize_outbound(msg: &OutboundMessage) -> Result<String, serde_json::Error> {
    serde_json::to_string(msg)
}

/// Deserialize an inbound message from JSON.
pub fn deserialize_inbound(text: &str) -> Result<InboundMessage, serde_json::Error> {
    serde_json::from_str(text)
}

/// Serialize a snapshot as a `metrics_update` frame, once for every recipient.
pub fn metrics_update_payload(snapshot: &Snapshot) -> Result<Arc<str>, serde_json::Error> {
    let msg = OutboundMessage::MetricsUpdate {
        data: snapshot.clone(),
    };
    Ok(Arc::from(serialize_outbound(&msg)?))
}

/// Serialize an error frame. Falls back to a fixed frame if serialization fails.
pub fn error_payload(message: impl Into<String>) -> Arc<str> {
    let msg = OutboundMessage::Error {
        message: message.into(),
    };
    match serialize_outbound(&msg) {
        Ok(json) => Arc::from(json),
        Err(_) => Arc::from(r#"{"type":"error","message":"internal error"}"#),
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;
    use pulse_core::types::NetworkStats;

    use super::*;

    #[test]
    fn test_metrics_update_shape() {
        let snapshot = Snapshot {
            cpu_percent: 12.5,
            memory_percent: 40.0,
            disk_percent: 70.0,
            network_stats: NetworkStats {
                bytes_sent: 1,
                bytes_recv: 2,
                packets_sent: 3,
                packets_recv: 4,
            },
            process_count: 99,
            timestamp: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        };
        let payload = metrics_update_payload(&snapshot).unwrap();
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();

        assert_eq!(value["type"], "metrics_update");
        assert_eq!(value["data"]["cpu"], 12.5);
        assert_eq!(value["data"]["network"]["packets_recv"], 4);

        let parsed: OutboundMessage = serde_json::from_str(&payload).unwrap();
        assert_eq!(parsed, OutboundMessage::MetricsUpdate { data: snapshot });
    }

    #[test]
    fn test_error_shape() {
        let value: serde_json::Value =
            serde_json::from_str(&error_payload("Invalid token")).unwrap();
        assert_eq!(value, serde_json::json!({"type": "error", "message": "Invalid token"}));
    }

    #[test]
    fn test_inbound_parsing() {
        assert_eq!(
            deserialize_inbound(r#"{"type":"ping"}"#).unwrap(),
            InboundMessage::Ping { timestamp: None }
        );
        assert_eq!(
            deserialize_inbound(r#"{"type":"pong","timestamp":5}"#).unwrap(),
            InboundMessage::Pong { timestamp: Some(5) }
        );
        assert!(deserialize_inbound(r#"{"type":"subscribe"}"#).is_err());
        assert!(deserialize_inbound("not json").is_err());
    }
}
