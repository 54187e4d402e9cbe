//! Stream live metrics from a running server.

use clap::Args;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tabled::Tabled;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;

use pulse_core::error::AppError;
use pulse_core::types::Snapshot;
use pulse_realtime::message::{InboundMessage, OutboundMessage};

use crate::output::{self, OutputFormat};

/// Arguments for the watch command
#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Stream endpoint
    #[arg(long, default_value = "ws://127.0.0.1:8080/ws")]
    pub url: String,

    /// Access token, sent as a bearer header
    #[arg(short, long, env = "PULSE_TOKEN")]
    pub token: String,

    /// Stop after this many updates
    #[arg(short = 'n', long)]
    pub count: Option<usize>,
}

/// One metrics update as a table row.
#[derive(Debug, Serialize, Tabled)]
pub struct UpdateRow {
    #[tabled(rename = "Time")]
    pub time: String,
    #[tabled(rename = "CPU %")]
    pub cpu: String,
    #[tabled(rename = "Mem %")]
    pub memory: String,
    #[tabled(rename = "Disk %")]
    pub disk: String,
    #[tabled(rename = "Procs")]
    pub processes: u64,
    #[tabled(rename = "Net rx")]
    pub bytes_recv: u64,
    #[tabled(rename = "Net tx")]
    pub bytes_sent: u64,
}

impl From<&Snapshot> for UpdateRow {
    fn from(s: &Snapshot) -> Self {
        Self {
            time: s.timestamp.format("%H:%M:%S").to_string(),
            cpu: format!("{:.1}", s.cpu_percent),
            memory: format!("{:.1}", s.memory_percent),
            disk: format!("{:.1}", s.disk_percent),
            processes: s.process_count,
            bytes_recv: s.network_stats.bytes_recv,
            bytes_sent: s.network_stats.bytes_sent,
        }
    }
}

/// Execute the watch command
pub async fn execute(args: &WatchArgs, format: OutputFormat) -> Result<(), AppError> {
    let mut request = args
        .url
        .as_str()
        .into_client_request()
        .map_err(|e| AppError::validation(format!("Invalid URL '{}': {e}", args.url)))?;
    let bearer = HeaderValue::from_str(&format!("Bearer {}", args.token))
        .map_err(|e| AppError::validation(format!("Invalid token: {e}")))?;
    request.headers_mut().insert("Authorization", bearer);

    let (mut socket, _) = connect_async(request)
        .await
        .map_err(|e| AppError::external_service(format!("Failed to connect: {e}")))?;

    let mut received = 0usize;
    while let Some(frame) = socket.next().await {
        let frame =
            frame.map_err(|e| AppError::external_service(format!("Stream error: {e}")))?;

        match frame {
            Message::Text(text) => {
                let msg: OutboundMessage = serde_json::from_str(text.as_str())?;
                match msg {
                    OutboundMessage::MetricsUpdate { data } => {
                        match format {
                            OutputFormat::Json => output::print_item(&data, format),
                            OutputFormat::Table => {
                                output::print_list(&[UpdateRow::from(&data)], format)
                            }
                        }
                        received += 1;
                        if args.count.is_some_and(|n| received >= n) {
                            let _ = socket.close(None).await;
                            break;
                        }
                    }
                    OutboundMessage::Ping { timestamp } => {
                        let pong = serde_json::to_string(&InboundMessage::Pong {
                            timestamp: Some(timestamp),
                        })?;
                        socket
                            .send(Message::text(pong))
                            .await
                            .map_err(|e| AppError::external_service(format!("Send failed: {e}")))?;
                    }
                    OutboundMessage::Pong { .. } => {}
                    OutboundMessage::Error { message } => {
                        output::print_error(&format!("Server: {message}"));
                    }
                }
            }
            Message::Close(frame) => {
                if let Some(frame) = frame {
                    output::print_warning(&format!(
                        "Server closed the stream ({}): {}",
                        u16::from(frame.code),
                        frame.reason.as_str()
                    ));
                }
                break;
            }
            _ => {}
        }
    }

    Ok(())
}
