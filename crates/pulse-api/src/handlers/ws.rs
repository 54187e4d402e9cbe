//! WebSocket upgrade handler for the metrics stream.
//!
//! The socket is upgraded first and authenticated afterwards, so a rejected
//! client still receives a JSON error message and a policy-violation close
//! frame instead of a bare HTTP status.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::response::Response;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use pulse_realtime::connection::authenticator::extract_token;
use pulse_realtime::connection::close::{close_code, close_frame_reason};
use pulse_realtime::connection::heartbeat::{HeartbeatConfig, run_heartbeat};
use pulse_realtime::connection::{CloseReason, ConnectionHandle, ConnectionManager, FrameKind};
use pulse_realtime::message::serializer::error_payload;
use pulse_resilience::Failure;

use crate::state::AppState;

/// Query parameters accepted by `/ws`.
#[derive(Debug, Default, serde::Deserialize)]
pub struct WsQuery {
    /// Access token; takes precedence over the `Authorization` header.
    pub token: Option<String>,
}

/// GET /ws?token={jwt}
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let authorization = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    let token = extract_token(query.token.as_deref(), authorization);

    ws.on_upgrade(move |socket| handle_socket(state, socket, token))
}

/// Drives one socket from authentication to close.
async fn handle_socket(state: AppState, socket: WebSocket, token: Option<String>) {
    let realtime = Arc::clone(&state.realtime);
    let (mut sink, mut stream) = socket.split();

    let principal = match realtime.authenticator.authenticate(token.as_deref()).await {
        Ok(principal) => principal,
        Err(failure) => {
            let message = match failure {
                Failure::AuthFailure(message) => message,
                other => other.to_string(),
            };
            reject(&mut sink, &message, close_code::POLICY).await;
            return;
        }
    };

    let handle = match realtime.connections.open(principal) {
        Ok(handle) => handle,
        Err(failure) => {
            reject(&mut sink, &failure.to_string(), close_code::AGAIN).await;
            return;
        }
    };
    let conn_id = handle.id;

    let mut writer = tokio::spawn(write_loop(Arc::clone(&handle), sink));
    let heartbeat = HeartbeatConfig::from(realtime.config());

    let reason = tokio::select! {
        reason = read_loop(&realtime.connections, &handle, &mut stream) => reason,
        reason = run_heartbeat(Arc::clone(&handle), heartbeat) => reason,
        _ = handle.closed() => handle.close_reason().unwrap_or(CloseReason::Shutdown),
    };

    realtime.connections.remove(&conn_id, reason.clone());

    if tokio::time::timeout(realtime.config().drain_grace(), &mut writer)
        .await
        .is_err()
    {
        handle.force_close(reason);
        writer.abort();
    }

    info!(conn_id = %conn_id, "WebSocket session ended");
}

/// Sends an error message and a close frame to a socket that never registered.
async fn reject(sink: &mut SplitSink<WebSocket, Message>, message: &str, code: u16) {
    warn!(code, reason = %message, "Rejecting WebSocket connection");
    let payload = error_payload(message);
    let _ = sink.send(Message::Text(payload.to_string().into())).await;
    let _ = sink
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: close_frame_reason(message).to_string().into(),
        })))
        .await;
}

/// Writes queued frames to the socket, acknowledging each.
///
/// On a graceful close the buffer is flushed, then a close frame is sent
/// when the reason carries a code.
async fn write_loop(handle: Arc<ConnectionHandle>, mut sink: SplitSink<WebSocket, Message>) {
    while let Some(frame) = handle.next_outbound().await {
        let message = match frame.kind() {
            FrameKind::Text(payload) => Message::Text(payload.to_string().into()),
            FrameKind::Ping => Message::Ping(Bytes::new()),
        };
        match sink.send(message).await {
            Ok(()) => frame.complete(Ok(())),
            Err(e) => {
                let detail = e.to_string();
                frame.complete(Err(Failure::TransientIo(detail.clone())));
                handle.close(CloseReason::TransportError(detail));
                break;
            }
        }
    }

    if !handle.is_cancelled() {
        if let Some(reason) = handle.close_reason() {
            if let Some(code) = reason.close_code() {
                let text = reason.to_string();
                let _ = sink
                    .send(Message::Close(Some(CloseFrame {
                        code,
                        reason: close_frame_reason(&text).to_string().into(),
                    })))
                    .await;
            }
        }
    }

    handle.mark_drained();
}

/// Reads client frames until the client leaves or misbehaves.
async fn read_loop(
    connections: &ConnectionManager,
    handle: &ConnectionHandle,
    stream: &mut SplitStream<WebSocket>,
) -> CloseReason {
    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if let Err(failure) = connections.handle_inbound(&handle.id, text.as_str()) {
                    let detail = match failure {
                        Failure::ProtocolViolation(detail) => detail,
                        other => other.to_string(),
                    };
                    handle.enqueue(error_payload(detail.clone()));
                    return CloseReason::ProtocolViolation(detail);
                }
            }
            Ok(Message::Binary(_)) => {
                let detail = "binary frames are not supported".to_string();
                handle.enqueue(error_payload(detail.clone()));
                return CloseReason::ProtocolViolation(detail);
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => handle.touch(),
            Ok(Message::Close(_)) => {
                debug!(conn_id = %handle.id, "Client sent close frame");
                return CloseReason::ClientClosed;
            }
            Err(e) => return CloseReason::TransportError(e.to_string()),
        }
    }
    CloseReason::ClientClosed
}
