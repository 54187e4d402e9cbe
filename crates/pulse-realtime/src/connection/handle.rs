//! Individual WebSocket connection handle.

use std::sync::{Arc, OnceLock, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use pulse_core::types::Principal;
use pulse_resilience::{
    BackpressureHandler, BackpressureState, CircuitBreaker, Failure, OfferOutcome,
};

use super::close::CloseReason;

/// Unique connection identifier
pub type ConnectionId = Uuid;

/// What the writer puts on the wire for one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameKind {
    /// A serialized JSON text frame.
    Text(Arc<str>),
    /// A WebSocket protocol ping; clients answer it with a pong on their own.
    Ping,
}

/// One frame waiting for the connection writer.
#[derive(Debug)]
pub struct OutboundFrame {
    kind: FrameKind,
    ack: Option<oneshot::Sender<Result<(), Failure>>>,
}

impl OutboundFrame {
    /// A text frame nobody waits on (pongs, errors).
    pub fn new(payload: Arc<str>) -> Self {
        Self {
            kind: FrameKind::Text(payload),
            ack: None,
        }
    }

    /// A protocol ping frame.
    pub fn ping() -> Self {
        Self {
            kind: FrameKind::Ping,
            ack: None,
        }
    }

    fn with_ack(payload: Arc<str>) -> (Self, oneshot::Receiver<Result<(), Failure>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                kind: FrameKind::Text(payload),
                ack: Some(tx),
            },
            rx,
        )
    }

    /// Frame kind.
    pub fn kind(&self) -> &FrameKind {
        &self.kind
    }

    /// Serialized JSON text, or `None` for a ping.
    pub fn payload(&self) -> Option<&str> {
        match &self.kind {
            FrameKind::Text(payload) => Some(payload),
            FrameKind::Ping => None,
        }
    }

    /// Report the write outcome to whoever is waiting on this frame.
    pub fn complete(self, result: Result<(), Failure>) {
        if let Some(ack) = self.ack {
            let _ = ack.send(result);
        }
    }
}

/// A handle to a single authenticated WebSocket connection.
///
/// Outbound frames go through a bounded [`BackpressureHandler`] drained by the
/// connection's writer task. Closing is two-staged: [`close`](Self::close)
/// stops new frames and lets the writer flush, [`force_close`](Self::force_close)
/// also cancels the writer immediately.
#[derive(Debug)]
pub struct ConnectionHandle {
    /// Unique connection ID
    pub id: ConnectionId,
    /// Authenticated identity
    pub principal: Principal,
    /// When the connection was established
    pub connected_at: DateTime<Utc>,
    /// Last inbound activity
    last_activity: RwLock<Instant>,
    outbound: BackpressureHandler<OutboundFrame>,
    breaker: Arc<CircuitBreaker>,
    close_reason: OnceLock<CloseReason>,
    closing: CancellationToken,
    cancel: CancellationToken,
    drained: CancellationToken,
}

impl ConnectionHandle {
    /// Create a new connection handle.
    ///
    /// `cancel` is usually a child of the engine's shutdown token.
    pub fn new(
        id: ConnectionId,
        principal: Principal,
        outbound: BackpressureHandler<OutboundFrame>,
        breaker: Arc<CircuitBreaker>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            principal,
            connected_at: Utc::now(),
            last_activity: RwLock::new(Instant::now()),
            outbound,
            breaker,
            close_reason: OnceLock::new(),
            closing: CancellationToken::new(),
            cancel,
            drained: CancellationToken::new(),
        }
    }

    /// Queue `payload` and wait until the writer has sent it or `timeout` passes.
    ///
    /// A full buffer fails fast with [`Failure::CapacityExceeded`].
    pub async fn deliver(&self, payload: Arc<str>, timeout: Duration) -> Result<(), Failure> {
        if !self.is_open() {
            return Err(Failure::channel_closed("connection"));
        }

        let (frame, ack) = OutboundFrame::with_ack(payload);
        match self.outbound.offer(frame) {
            OfferOutcome::Accepted => {}
            OfferOutcome::Displaced(oldest) => oldest.complete(Err(self.overflow())),
            OfferOutcome::Rejected(_) => return Err(self.overflow()),
            OfferOutcome::Closed(_) => return Err(Failure::channel_closed("connection")),
        }

        match tokio::time::timeout(timeout, ack).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Failure::channel_closed("connection writer")),
            Err(_) => Err(Failure::Timeout(timeout)),
        }
    }

    /// Queue `payload` without waiting. Returns whether it was buffered.
    pub fn enqueue(&self, payload: Arc<str>) -> bool {
        self.enqueue_frame(OutboundFrame::new(payload))
    }

    /// Queue a protocol ping. Returns whether it was buffered.
    pub fn enqueue_ping(&self) -> bool {
        self.enqueue_frame(OutboundFrame::ping())
    }

    fn enqueue_frame(&self, frame: OutboundFrame) -> bool {
        match self.outbound.offer(frame) {
            OfferOutcome::Accepted => true,
            OfferOutcome::Displaced(oldest) => {
                oldest.complete(Err(self.overflow()));
                true
            }
            OfferOutcome::Rejected(_) | OfferOutcome::Closed(_) => false,
        }
    }

    /// Next frame for the writer.
    ///
    /// Returns `None` once the connection is force-closed, or closed and drained.
    pub async fn next_outbound(&self) -> Option<OutboundFrame> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            frame = self.outbound.recv() => frame,
        }
    }

    /// Stop accepting frames; the writer flushes what is buffered.
    ///
    /// Returns `true` if this call closed the connection. The first reason wins.
    pub fn close(&self, reason: CloseReason) -> bool {
        let first = self.close_reason.set(reason).is_ok();
        self.outbound.close();
        self.closing.cancel();
        first
    }

    /// Close and cancel the writer without flushing.
    pub fn force_close(&self, reason: CloseReason) -> bool {
        let first = self.close(reason);
        self.cancel.cancel();
        first
    }

    /// Whether the connection still accepts frames.
    pub fn is_open(&self) -> bool {
        !self.closing.is_cancelled()
    }

    /// Whether the writer was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the connection starts closing.
    pub async fn closed(&self) {
        self.closing.cancelled().await;
    }

    /// Why the connection was closed, if it was.
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason.get().cloned()
    }

    /// Called by the writer after it stops.
    pub fn mark_drained(&self) {
        self.drained.cancel();
    }

    /// Wait up to `grace` for the writer to stop. Returns whether it did.
    pub async fn wait_drained(&self, grace: Duration) -> bool {
        tokio::time::timeout(grace, self.drained.cancelled())
            .await
            .is_ok()
    }

    /// Record inbound activity.
    pub fn touch(&self) {
        let mut last = self
            .last_activity
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *last = Instant::now();
    }

    /// Instant of the last inbound activity.
    pub fn last_activity(&self) -> Instant {
        *self
            .last_activity
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Time since the last inbound activity.
    pub fn idle_for(&self) -> Duration {
        self.last_activity().elapsed()
    }

    /// Wall-clock time of the last inbound activity.
    pub fn last_activity_at(&self) -> DateTime<Utc> {
        chrono::Duration::from_std(self.idle_for())
            .ok()
            .and_then(|idle| Utc::now().checked_sub_signed(idle))
            .unwrap_or_else(Utc::now)
    }

    /// Breaker guarding deliveries to this connection.
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Outbound buffer state.
    pub fn backpressure(&self) -> BackpressureState {
        self.outbound.state()
    }

    /// Connection info for status endpoints.
    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            id: self.id,
            user_id: self.principal.user_id,
            username: self.principal.username.clone(),
            connected_at: self.connected_at,
            last_activity: self.last_activity_at(),
            open: self.is_open(),
            buffer: self.backpressure(),
        }
    }

    fn overflow(&self) -> Failure {
        Failure::CapacityExceeded(format!("outbound buffer of connection {}", self.id))
    }
}

/// Serializable connection info
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub user_id: Uuid,
    pub username: String,
    pub connected_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub open: bool,
    pub buffer: BackpressureState,
}
