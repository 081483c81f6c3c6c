//! Live-reload WebSocket endpoint.
//!
//! # Responsibilities
//! - Accept the upgrade on the main HTTP port
//! - Register the socket with the live-reload hub
//! - Forward hub commands to the browser as JSON text frames
//! - Feed browser frames back into the hub until the socket closes
//!
//! # Data Flow
//! ```text
//! Browser ──── text frames ───→ reader loop → LiveReload::handle_message
//! Browser ←─── text frames ──── writer task ← mpsc ← LiveReload::broadcast
//! ```

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::http::server::AppState;
use crate::livereload::{LiveReload, ServerCommand};

/// `GET /livereload` upgrade handler.
pub async fn live_reload_socket(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let Some(live_reload) = state.pipeline.live_reload().cloned() else {
        return (StatusCode::NOT_FOUND, "Live reload is disabled").into_response();
    };
    ws.on_upgrade(move |socket| serve_socket(socket, live_reload))
}

async fn serve_socket(socket: WebSocket, live_reload: Arc<LiveReload>) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerCommand>();
    let id = live_reload.connect(tx);

    let writer = tokio::spawn(async move {
        while let Some(command) = rx.recv().await {
            let json = match serde_json::to_string(&command) {
                Ok(json) => json,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to encode live reload command");
                    continue;
                }
            };
            if sink.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => live_reload.handle_message(id, text.as_str()),
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(session = %id, error = %e, "Live reload socket error");
                break;
            }
        }
    }

    live_reload.disconnect(id);
    writer.abort();
}
