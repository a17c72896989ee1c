//! Room membership handlers: create, join, leave, settings.

use crate::protocol::ServerMessage;
use crate::state::{AppState, JoinError};
use crate::types::{Profile, Room, RoomSettings};
use chrono::Utc;
use std::sync::Arc;

use super::Session;

pub async fn handle_create_room(
    state: &Arc<AppState>,
    session: &mut Option<Session>,
    username: String,
    settings: Option<RoomSettings>,
) -> Option<ServerMessage> {
    let username = username.trim().to_string();
    if username.is_empty() {
        return Some(ServerMessage::Error {
            code: "INVALID_USERNAME".to_string(),
            msg: "Username must not be empty".to_string(),
        });
    }

    let (room, profile) = state.create_room(username, settings).await;
    tracing::info!("Room {} created by {}", room.code, profile.id);

    *session = Some(Session {
        room_id: room.id.clone(),
        profile_id: profile.id.clone(),
    });
    Some(room_joined(state, room, profile).await)
}

pub async fn handle_join_room(
    state: &Arc<AppState>,
    session: &mut Option<Session>,
    room_code: String,
    username: String,
) -> Option<ServerMessage> {
    let username = username.trim().to_string();
    if username.is_empty() {
        return Some(ServerMessage::Error {
            code: "INVALID_USERNAME".to_string(),
            msg: "Username must not be empty".to_string(),
        });
    }

    match state.join_room(&room_code, username).await {
        Ok((room, profile)) => {
            tracing::info!("{} joined room {}", profile.id, room.code);
            *session = Some(Session {
                room_id: room.id.clone(),
                profile_id: profile.id.clone(),
            });
            Some(room_joined(state, room, profile).await)
        }
        Err(e) => Some(join_error(e)),
    }
}

/// Re-attach a returning client to its seat; no new profile is minted.
/// Presence flips back online through the socket loop's subscription sync,
/// which also cancels the ghost reaper's countdown for this seat.
pub async fn handle_rejoin_room(
    state: &Arc<AppState>,
    session: &mut Option<Session>,
    room_code: String,
    profile_id: String,
) -> Option<ServerMessage> {
    match state.rejoin_room(&room_code, &profile_id).await {
        Ok((room, profile)) => {
            tracing::info!("{} rejoined room {}", profile.id, room.code);
            *session = Some(Session {
                room_id: room.id.clone(),
                profile_id: profile.id.clone(),
            });
            Some(room_joined(state, room, profile).await)
        }
        Err(e) => Some(join_error(e)),
    }
}

fn join_error(e: JoinError) -> ServerMessage {
    let code = match e {
        JoinError::RoomNotFound => "ROOM_NOT_FOUND",
        JoinError::InProgress => "ROOM_IN_PROGRESS",
        JoinError::RoomFull => "ROOM_FULL",
        JoinError::UnknownProfile => "UNKNOWN_PROFILE",
    };
    ServerMessage::Error {
        code: code.to_string(),
        msg: e.to_string(),
    }
}

pub async fn handle_leave_room(state: &Arc<AppState>, session: Session) -> Option<ServerMessage> {
    state
        .mark_offline(&session.room_id, &session.profile_id)
        .await;
    match state.leave_room(&session.room_id, &session.profile_id).await {
        Ok(summary) => {
            tracing::info!(
                "{} left room {} (deleted={}, new_host={:?})",
                session.profile_id,
                session.room_id,
                summary.room_deleted,
                summary.new_host
            );
            None
        }
        Err(e) => Some(ServerMessage::Error {
            code: "LEAVE_FAILED".to_string(),
            msg: e,
        }),
    }
}

pub async fn handle_update_settings(
    state: &Arc<AppState>,
    session: Session,
    settings: RoomSettings,
) -> Option<ServerMessage> {
    match state
        .update_settings(&session.room_id, &session.profile_id, settings)
        .await
    {
        // The SettingsUpdated broadcast reaches the caller too
        Ok(()) => None,
        Err(e) => Some(ServerMessage::Error {
            code: "UPDATE_SETTINGS_FAILED".to_string(),
            msg: e,
        }),
    }
}

/// Everything a freshly joined client needs to render the room
async fn room_joined(state: &Arc<AppState>, room: Room, profile: Profile) -> ServerMessage {
    let participants = state.participant_infos(&room.id).await;
    let online = state.presence_snapshot(&room.id).await;
    let join_url = format!("{}/join/{}", state.base_url, room.code);

    ServerMessage::RoomJoined {
        profile_id: profile.id,
        room,
        participants,
        online,
        join_url,
        server_now: Utc::now(),
    }
}
