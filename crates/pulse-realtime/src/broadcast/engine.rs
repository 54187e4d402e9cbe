//! The periodic broadcaster.
//!
//! Every tick takes one snapshot, serializes it once, and delivers the same
//! payload to every connection in a point-in-time copy of the registry.
//! Deliveries run concurrently and each is bounded by the send timeout, so a
//! slow connection cannot hold back the others beyond that bound. Connections
//! whose delivery failed are evicted after the sweep, once each.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use pulse_resilience::{Failure, RecoveryPolicy};

use crate::connection::close::CloseReason;
use crate::connection::handle::{ConnectionHandle, ConnectionId};
use crate::connection::manager::ConnectionManager;
use crate::message::serializer::metrics_update_payload;
use crate::metrics::EngineMetrics;

use super::sampling::GuardedSampler;

/// Component name used when classifying delivery failures.
pub const BROADCAST_COMPONENT: &str = "broadcast";

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickReport {
    /// Tick sequence number, starting at 1.
    pub tick: u64,
    /// Timestamp of the broadcast snapshot; `None` if the tick was skipped.
    pub snapshot_at: Option<DateTime<Utc>>,
    /// Connections in the registry copy.
    pub recipients: usize,
    /// Deliveries acknowledged by the connection writer.
    pub delivered: usize,
    /// Deliveries dropped by a full outbound buffer.
    pub dropped: usize,
    /// Connections evicted after a failed delivery.
    pub evicted: Vec<ConnectionId>,
}

impl TickReport {
    /// Whether no snapshot was broadcast.
    pub fn skipped(&self) -> bool {
        self.snapshot_at.is_none()
    }
}

#[derive(Debug)]
enum DeliveryOutcome {
    Delivered,
    Dropped,
    Failed(Failure),
}

/// Samples on a fixed cadence and fans the snapshot out to every connection.
#[derive(Debug)]
pub struct BroadcastEngine {
    connections: Arc<ConnectionManager>,
    sampler: GuardedSampler,
    policy: RecoveryPolicy,
    metrics: Arc<EngineMetrics>,
    interval: Duration,
    send_timeout: Duration,
    ticks: AtomicU64,
}

impl BroadcastEngine {
    /// Create a broadcaster. Nothing runs until [`run`](Self::run) or [`tick`](Self::tick).
    pub fn new(
        connections: Arc<ConnectionManager>,
        sampler: GuardedSampler,
        policy: RecoveryPolicy,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        let config = connections.config();
        let interval = config.broadcast_interval().max(Duration::from_millis(1));
        let send_timeout = config.send_timeout();
        Self {
            connections,
            sampler,
            policy,
            metrics,
            interval,
            send_timeout,
            ticks: AtomicU64::new(0),
        }
    }

    /// The guarded sampler.
    pub fn sampler(&self) -> &GuardedSampler {
        &self.sampler
    }

    /// Tick until `cancel` fires.
    ///
    /// Ticks never overlap: if one overruns the interval, the next starts
    /// when it finishes and the schedule shifts. Cancellation also abandons
    /// a tick in progress, so no new deliveries start after it.
    ///
    /// An abandoned delivery drops its breaker permit unsettled, which
    /// records one failure on that connection's delivery breaker. Shutdown
    /// removes those breakers together with their connections, so the
    /// failures never affect a live connection.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            send_timeout_ms = self.send_timeout.as_millis() as u64,
            "Broadcast loop started"
        );

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                report = self.tick() => {
                    debug!(
                        tick = report.tick,
                        recipients = report.recipients,
                        delivered = report.delivered,
                        dropped = report.dropped,
                        evicted = report.evicted.len(),
                        skipped = report.skipped(),
                        "Broadcast tick complete"
                    );
                }
            }
        }

        info!("Broadcast loop stopped");
    }

    /// Run one broadcast cycle.
    pub async fn tick(&self) -> TickReport {
        let tick = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        EngineMetrics::inc(&self.metrics.ticks_total);
        let mut report = TickReport {
            tick,
            ..TickReport::default()
        };

        let snapshot = match self.sampler.next_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                EngineMetrics::inc(&self.metrics.ticks_skipped);
                if err.action.is_escalation() {
                    EngineMetrics::inc(&self.metrics.escalations);
                }
                debug!(tick, action = %err.action, "No snapshot, skipping tick");
                return report;
            }
        };

        let payload = match metrics_update_payload(&snapshot) {
            Ok(payload) => payload,
            Err(e) => {
                EngineMetrics::inc(&self.metrics.ticks_skipped);
                let (_, action) = self
                    .policy
                    .handle(&Failure::Unclassified(e.to_string()), BROADCAST_COMPONENT, 0);
                if action.is_escalation() {
                    EngineMetrics::inc(&self.metrics.escalations);
                }
                return report;
            }
        };
        report.snapshot_at = Some(snapshot.timestamp);

        let members = self.connections.registry().snapshot_members();
        report.recipients = members.len();
        if members.is_empty() {
            return report;
        }

        let outcomes = join_all(
            members
                .iter()
                .map(|handle| self.deliver_to(handle, Arc::clone(&payload))),
        )
        .await;

        let mut failed = 0u64;
        for (handle, outcome) in members.iter().zip(outcomes) {
            match outcome {
                DeliveryOutcome::Delivered => report.delivered += 1,
                DeliveryOutcome::Dropped => report.dropped += 1,
                DeliveryOutcome::Failed(failure) => {
                    failed += 1;
                    let ctx = self.policy.classify(&failure, BROADCAST_COMPONENT, 0);
                    warn!(
                        conn_id = %handle.id,
                        kind = ?ctx.error_kind,
                        error = %failure,
                        "Delivery failed"
                    );
                    if self
                        .connections
                        .remove(&handle.id, CloseReason::DeliveryFailed(failure))
                    {
                        report.evicted.push(handle.id);
                    }
                }
            }
        }

        EngineMetrics::add(&self.metrics.deliveries_succeeded, report.delivered as u64);
        EngineMetrics::add(&self.metrics.messages_dropped, report.dropped as u64);
        EngineMetrics::add(&self.metrics.deliveries_failed, failed);
        report
    }

    async fn deliver_to(&self, handle: &ConnectionHandle, payload: Arc<str>) -> DeliveryOutcome {
        let permit = match handle.breaker().try_acquire() {
            Ok(permit) => permit,
            Err(open) => return DeliveryOutcome::Failed(Failure::CircuitOpen(open)),
        };

        match handle.deliver(payload, self.send_timeout).await {
            Ok(()) => {
                permit.success();
                DeliveryOutcome::Delivered
            }
            Err(failure @ Failure::CapacityExceeded(_)) => {
                permit.failure();
                self.policy.handle(&failure, BROADCAST_COMPONENT, 0);
                DeliveryOutcome::Dropped
            }
            Err(failure) => {
                permit.failure();
                DeliveryOutcome::Failed(failure)
            }
        }
    }
}
