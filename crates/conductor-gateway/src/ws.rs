//! The client channel's WebSocket endpoint: one inbound
//! `{"message": "<utterance>"}` per turn, one outbound payload per turn.
//!
//! A hello/welcome/message-loop shape with no node capability negotiation —
//! just a thread-id (taken from the query string, defaulting to a fresh
//! UUID) and a plain text utterance in, one of three JSON shapes out.

use axum::extract::ws::{Message as WsMessage, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;

use crate::state::AppState;
use crate::turn;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Session identity for this connection. A fresh UUID is minted when
    /// the client doesn't supply one, matching a first-ever connection.
    pub thread_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InboundFrame {
    message: String,
}

/// `GET /ws` — upgrade to the bidirectional streaming channel.
pub async fn client_channel(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
) -> impl IntoResponse {
    let thread_id = query.thread_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    ws.on_upgrade(move |socket| handle_socket(socket, state, thread_id))
}

async fn handle_socket(socket: WebSocket, state: AppState, thread_id: String) {
    let (mut sink, mut stream) = socket.split();
    tracing::info!(thread_id = %thread_id, "client connected");

    while let Some(frame) = stream.next().await {
        let frame = match frame {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(thread_id = %thread_id, error = %e, "websocket read error, closing");
                break;
            }
        };

        let text = match frame {
            WsMessage::Text(t) => t,
            WsMessage::Close(_) => break,
            WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Binary(_) => continue,
        };

        let inbound: InboundFrame = match serde_json::from_str(&text) {
            Ok(inbound) => inbound,
            Err(e) => {
                let payload = turn::protocol_error(conductor_domain::error::Error::Other(format!(
                    "malformed inbound frame: {e}"
)));
                if send(&mut sink, &payload).await.is_err() {
                    break;
                }
                continue;
            }
        };

        // Only one turn per session key runs at a time. A second frame for the same
        // `thread_id` while a turn is in flight queues behind this permit.
        let permit = state.session_locks.acquire(&thread_id).await;
        let cancel = state.cancel_map.register(&thread_id);

        let turn_state = state.clone();
        let turn_thread_id = thread_id.clone();
        let turn_message = inbound.message;
        let mut handle = tokio::spawn(async move {
            turn::run_inbound_message(&turn_state, &turn_thread_id, &turn_message).await
        });
        let payload = tokio::select! {
            result = &mut handle => {
                match result {
                    Ok(payload) => payload,
                    Err(e) => turn::protocol_error(conductor_domain::error::Error::Other(format!(
                        "turn task panicked: {e}"
))),
                }
            }
            _ = cancel.cancelled() => {
                handle.abort();
                turn::protocol_error(conductor_domain::error::Error::Other(
                    "turn was cancelled".into(),
))
            }
        };
        state.cancel_map.remove(&thread_id);
        drop(permit);

        if send(&mut sink, &payload).await.is_err() {
            break;
        }
    }

    tracing::info!(thread_id = %thread_id, "client disconnected");
}

async fn send(
    sink: &mut futures_util::stream::SplitSink<WebSocket, WsMessage>,
    payload: &conductor_sessions::OutboundPayload,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(payload).unwrap_or_else(|_| "{\"type\":\"error\"}".to_string());
    sink.send(WsMessage::Text(text)).await
}
