//! Live job output over WebSocket.
//!
//! On connect the client receives the lines already buffered for the job,
//! then every new line as it is produced, one text message per line.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use super::state::GuardedLogRegistry;

/// Route handler for `GET /api/jobs/{id}/logs/ws`.
pub async fn job_logs_ws(
    ws: WebSocketUpgrade,
    Path(job_id): Path<String>,
    State(log_registry): State<GuardedLogRegistry>,
) -> Response {
    debug!("Log stream requested for job {}", job_id);
    ws.on_upgrade(move |socket| stream_logs(socket, job_id, log_registry))
}

async fn stream_logs(socket: WebSocket, job_id: String, log_registry: GuardedLogRegistry) {
    let (backlog, mut live_rx) = log_registry.subscribe_with_backlog(&job_id);

    let (mut ws_sink, mut ws_stream) = socket.split();

    for line in backlog {
        if ws_sink.send(Message::Text(line.into())).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            event = live_rx.recv() => match event {
                Ok(event) if event.job_id == job_id => {
                    if ws_sink.send(Message::Text(event.line.into())).await.is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Log stream for job {} skipped {} lines", job_id, skipped);
                }
                Err(RecvError::Closed) => break,
            },
            incoming = ws_stream.next() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }

    debug!("Log stream for job {} closed", job_id);
}
