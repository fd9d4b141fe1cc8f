//! HTTP and WebSocket handlers
//!
//! Accepts WebSocket upgrades and wires each socket to a `Dispatcher` (read
//! side) and a writer task (write side). Also serves the room list.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::{Sink, SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::connection::ConnectionHandle;
use crate::dispatcher::{Dispatcher, Frame};
use crate::state::ChatState;

impl From<Message> for Frame {
    fn from(msg: Message) -> Self {
        match msg {
            Message::Text(text) => Frame::Text(text.as_str().to_owned()),
            // Commands may also arrive as UTF-8 JSON in binary frames
            Message::Binary(bytes) => match std::str::from_utf8(&bytes) {
                Ok(text) => Frame::Text(text.to_owned()),
                Err(e) => {
                    debug!("Ignoring non-UTF-8 binary frame of {} bytes: {}", bytes.len(), e);
                    Frame::Control
                }
            },
            Message::Close(_) => Frame::Close,
            Message::Ping(_) | Message::Pong(_) => Frame::Control,
        }
    }
}

/// Upgrade `GET /ws` to a WebSocket session
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ChatState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Drive one WebSocket session until it terminates
pub async fn handle_socket(socket: WebSocket, state: Arc<ChatState>) {
    let (sink, stream) = socket.split();
    let (connection, outbound) = state.open_connection().await;
    info!("Client connection {} opened", connection.id);

    let writer = tokio::spawn(write_frames(
        sink,
        outbound,
        connection.clone(),
        state.settings.write_timeout,
    ));

    let frames = stream.map(|msg| msg.map(Frame::from));
    Dispatcher::new(state, connection.clone()).run(frames).await;

    if let Err(e) = writer.await {
        error!("Writer task for {} failed: {}", connection.id, e);
    }
    info!("Client connection {} finished", connection.id);
}

/// Drain the outbound queue into the socket
///
/// Any write failure or timeout closes the connection, which also ends the
/// read loop.
async fn write_frames<S>(
    mut sink: S,
    mut outbound: mpsc::Receiver<String>,
    connection: Arc<ConnectionHandle>,
    write_timeout: Duration,
) where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    loop {
        let frame = tokio::select! {
            biased;
            frame = outbound.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
            _ = connection.closed() => break,
        };

        match tokio::time::timeout(write_timeout, sink.send(Message::Text(frame.into()))).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!("WebSocket send failed for {}: {}", connection.id, e);
                break;
            }
            Err(_) => {
                warn!("WebSocket send to {} timed out", connection.id);
                break;
            }
        }
    }

    connection.close();
    // A stalled peer would never finish the close handshake either
    if tokio::time::timeout(write_timeout, sink.close()).await.is_err() {
        debug!("WebSocket close for {} timed out", connection.id);
    }
    debug!("Write task ended for {}", connection.id);
}

/// Errors surfaced by the HTTP endpoints
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Error getting rooms")]
    Rooms(#[source] serde_json::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!("{}: {:?}", self, self);
        let body = Json(serde_json::json!({ "message": self.to_string() }));
        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}

/// `GET /rooms`: every room with its current members
pub async fn list_rooms(State(state): State<Arc<ChatState>>) -> Result<Response, ApiError> {
    let summaries = state.rooms.summaries().await;
    let body = serde_json::to_vec(&summaries).map_err(ApiError::Rooms)?;
    Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
}

/// `GET /health`
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}
