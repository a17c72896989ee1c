pub mod game;
pub mod handlers;
pub mod room;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use std::sync::Arc;

use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;
use crate::types::{ProfileId, RoomId};

/// What the server knows about a connection once it has joined a room.
/// Everything before that point is an anonymous socket.
#[derive(Debug, Clone)]
pub struct Session {
    pub room_id: RoomId,
    pub profile_id: ProfileId,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Drive one client connection: dispatch its messages, relay its room's
/// broadcast feed, and keep presence in sync with the socket's lifetime.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    let mut session: Option<Session> = None;
    let mut room_rx: Option<tokio::sync::broadcast::Receiver<ServerMessage>> = None;

    loop {
        tokio::select! {
            // Relay room broadcasts once the client has joined a room
            broadcast_msg = async {
                match &mut room_rx {
                    Some(rx) => rx.recv().await.ok(),
                    // No room yet: wait forever
                    None => std::future::pending::<Option<ServerMessage>>().await,
                }
            } => {
                if let Some(msg) = broadcast_msg {
                    if let Ok(json) = serde_json::to_string(&msg) {
                        if sender.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                }
            }

            // Handle client messages
            ws_msg = receiver.next() => {
                match ws_msg {
                    Some(Ok(Message::Text(text))) => {
                        tracing::debug!("Received message: {}", text);

                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => {
                                let response =
                                    handlers::handle_message(client_msg, &mut session, &state)
                                        .await;
                                if let Some(response) = response {
                                    if let Ok(json) = serde_json::to_string(&response) {
                                        if sender.send(Message::Text(json.into())).await.is_err() {
                                            break;
                                        }
                                    }
                                }
                                sync_subscription(&state, &session, &mut room_rx).await;
                            }
                            Err(e) => {
                                tracing::error!("Failed to parse client message: {}", e);
                                let error = ServerMessage::Error {
                                    code: "PARSE_ERROR".to_string(),
                                    msg: format!("Invalid message format: {}", e),
                                };
                                if let Ok(json) = serde_json::to_string(&error) {
                                    let _ = sender.send(Message::Text(json.into())).await;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => break,
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    // Socket gone: the player goes offline, but their seat stays until the
    // ghost reaper gives up on them.
    if let Some(session) = session {
        tracing::info!(
            "Connection closed for {} in room {}",
            session.profile_id,
            session.room_id
        );
        state
            .mark_offline(&session.room_id, &session.profile_id)
            .await;
    }
}

/// Reconcile the broadcast subscription with the session after a message:
/// joining a room attaches the feed and flips the client online, leaving
/// drops the feed.
async fn sync_subscription(
    state: &Arc<AppState>,
    session: &Option<Session>,
    room_rx: &mut Option<tokio::sync::broadcast::Receiver<ServerMessage>>,
) {
    match session {
        Some(s) if room_rx.is_none() => {
            // Subscribe before going online so this client sees its own
            // presence snapshot
            *room_rx = state.subscribe(&s.room_id).await;
            state.mark_online(&s.room_id, &s.profile_id).await;
        }
        None if room_rx.is_some() => {
            *room_rx = None;
        }
        _ => {}
    }
}
