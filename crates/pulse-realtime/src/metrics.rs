//! Broadcast engine metrics.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Engine-level counters.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    /// Total connections registered
    pub connections_total: AtomicU64,
    /// Connections currently registered
    pub connections_active: AtomicU64,
    /// Connections removed after a delivery failure
    pub connections_evicted: AtomicU64,
    /// Connections refused at the capacity limit
    pub connections_rejected: AtomicU64,
    /// Failed authentication attempts
    pub auth_failures: AtomicU64,
    /// Broadcast ticks started
    pub ticks_total: AtomicU64,
    /// Ticks skipped because no snapshot was available
    pub ticks_skipped: AtomicU64,
    /// Frames acknowledged by a connection writer
    pub deliveries_succeeded: AtomicU64,
    /// Deliveries that failed and led to eviction
    pub deliveries_failed: AtomicU64,
    /// Frames dropped by backpressure
    pub messages_dropped: AtomicU64,
    /// Inbound client messages
    pub messages_received: AtomicU64,
    /// Failures escalated for operator attention
    pub escalations: AtomicU64,
}

impl EngineMetrics {
    /// Create zeroed metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// A connection joined the registry.
    pub fn connection_opened(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    /// A connection left the registry.
    pub fn connection_closed(&self) {
        let _ = self
            .connections_active
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(n.saturating_sub(1))
            });
    }

    /// A connection left the registry after a failed delivery.
    pub fn connection_evicted(&self) {
        self.connections_evicted.fetch_add(1, Ordering::Relaxed);
        self.connection_closed();
    }

    /// Increment a counter.
    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Add to a counter.
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Get a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            connections_evicted: self.connections_evicted.load(Ordering::Relaxed),
            connections_rejected: self.connections_rejected.load(Ordering::Relaxed),
            auth_failures: self.auth_failures.load(Ordering::Relaxed),
            ticks_total: self.ticks_total.load(Ordering::Relaxed),
            ticks_skipped: self.ticks_skipped.load(Ordering::Relaxed),
            deliveries_succeeded: self.deliveries_succeeded.load(Ordering::Relaxed),
            deliveries_failed: self.deliveries_failed.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            escalations: self.escalations.load(Ordering::Relaxed),
        }
    }
}

/// Serializable metrics snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub connections_total: u64,
    pub connections_active: u64,
    pub connections_evicted: u64,
    pub connections_rejected: u64,
    pub auth_failures: u64,
    pub ticks_total: u64,
    pub ticks_skipped: u64,
    pub deliveries_succeeded: u64,
    pub deliveries_failed: u64,
    pub messages_dropped: u64,
    pub messages_received: u64,
    pub escalations: u64,
}
