//! System resource snapshot produced once per broadcast tick.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One immutable sample of system resource usage.
///
/// Serialized with the short wire names clients consume
/// (`cpu`, `memory`, `disk`, `network`, `process_count`, `timestamp`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Global CPU utilisation, 0-100.
    #[serde(rename = "cpu")]
    pub cpu_percent: f64,
    /// Used memory as a percentage of total, 0-100.
    #[serde(rename = "memory")]
    pub memory_percent: f64,
    /// Used disk space as a percentage of total, 0-100.
    #[serde(rename = "disk")]
    pub disk_percent: f64,
    /// Cumulative network counters.
    #[serde(rename = "network")]
    pub network_stats: NetworkStats,
    /// Number of processes.
    pub process_count: u64,
    /// When the sample was taken.
    pub timestamp: DateTime<Utc>,
}

/// Cumulative network interface counters summed across interfaces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkStats {
    /// Bytes transmitted.
    pub bytes_sent: u64,
    /// Bytes received.
    pub bytes_recv: u64,
    /// Packets transmitted.
    pub packets_sent: u64,
    /// Packets received.
    pub packets_recv: u64,
}
