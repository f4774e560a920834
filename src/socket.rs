//! WebSocket push channel.
//!
//! A client connects to `/ws?user_id=<link id>` and receives every event
//! pushed to that id as a JSON text frame. Incoming frames are ignored
//! apart from close.

use axum::{
    extract::{
        rejection::QueryRejection,
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::presence::{ConnectionRegistry, SocketEvent};
use crate::routes::{parse_id, ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct SocketQuery {
    user_id: Option<String>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    query: Result<Query<SocketQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query?;
    let raw = query
        .user_id
        .ok_or_else(|| ApiError::BadRequest("Query parameter 'user_id' is required".to_string()))?;
    let user_id = parse_id(&raw, "user")?;
    let presence = state.presence.clone();
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, user_id, presence)))
}

async fn handle_socket(socket: WebSocket, user_id: Uuid, presence: ConnectionRegistry) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<SocketEvent>();
    let connection_id = presence.register(user_id, tx).await;
    info!(user = %user_id, connection = %connection_id, "socket connected");

    // Ends when the registry drops our handle or the client goes away.
    let mut send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(err) => {
                    warn!(event = %event.event, error = %err, "could not encode socket event");
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            if let Message::Close(_) = message {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    if presence.unregister_connection(user_id, connection_id).await {
        info!(user = %user_id, "socket disconnected");
    } else {
        debug!(user = %user_id, connection = %connection_id, "replaced socket closed");
    }
}
