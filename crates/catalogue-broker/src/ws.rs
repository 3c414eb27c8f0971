//! WebSocket change feed of connected device ids

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::state::AppState;

/// WebSocket upgrade handler
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    // The current snapshot is already queued
    let mut subscription = state.notifier.subscribe().await;

    info!(subscriber = %subscription.id, "WebSocket client connected");

    loop {
        tokio::select! {
            snapshot = subscription.receiver.recv() => {
                let Some(snapshot) = snapshot else {
                    debug!(subscriber = %subscription.id, "Change feed closed");
                    break;
                };
                match serde_json::to_string(&snapshot) {
                    Ok(json) => {
                        if sender.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "Failed to encode device snapshot"),
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    state.notifier.unsubscribe(subscription.id).await;
    info!(subscriber = %subscription.id, "WebSocket client disconnected");
}
