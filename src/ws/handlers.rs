//! WebSocket message dispatch
//!
//! The main entry point for client messages. Session requirements are
//! checked here, then dispatched to per-concern handler modules. Host
//! authorization happens in the state layer against the room's host
//! reference, not the connection, so a failed-over host loses its powers
//! even on a still-open socket.

use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;
use std::sync::Arc;

use super::{game, room, Session};

/// Macro to unwrap the session or answer with NOT_IN_ROOM
macro_rules! require_session {
    ($session:expr, $action:expr) => {
        match $session {
            Some(s) => s.clone(),
            None => {
                return Some(ServerMessage::Error {
                    code: "NOT_IN_ROOM".to_string(),
                    msg: format!("Join a room before you {}", $action),
                });
            }
        }
    };
}

/// Handle a client message and return the optional direct reply. Broadcasts
/// go out through the room channel inside the state layer.
pub async fn handle_message(
    msg: ClientMessage,
    session: &mut Option<Session>,
    state: &Arc<AppState>,
) -> Option<ServerMessage> {
    match msg {
        ClientMessage::CreateRoom { username, settings } => {
            if session.is_some() {
                return Some(ServerMessage::Error {
                    code: "ALREADY_IN_ROOM".to_string(),
                    msg: "Leave your current room first".to_string(),
                });
            }
            room::handle_create_room(state, session, username, settings).await
        }

        ClientMessage::JoinRoom {
            room_code,
            username,
        } => {
            if session.is_some() {
                return Some(ServerMessage::Error {
                    code: "ALREADY_IN_ROOM".to_string(),
                    msg: "Leave your current room first".to_string(),
                });
            }
            room::handle_join_room(state, session, room_code, username).await
        }

        ClientMessage::RejoinRoom {
            room_code,
            profile_id,
        } => {
            if session.is_some() {
                return Some(ServerMessage::Error {
                    code: "ALREADY_IN_ROOM".to_string(),
                    msg: "Leave your current room first".to_string(),
                });
            }
            room::handle_rejoin_room(state, session, room_code, profile_id).await
        }

        ClientMessage::LeaveRoom => {
            let s = require_session!(session, "leave");
            *session = None;
            room::handle_leave_room(state, s).await
        }

        ClientMessage::Heartbeat => {
            let s = require_session!(session, "send heartbeats");
            state.heartbeat(&s.room_id, &s.profile_id).await;
            None
        }

        ClientMessage::UpdateSettings { settings } => {
            let s = require_session!(session, "change settings");
            room::handle_update_settings(state, s, settings).await
        }

        ClientMessage::StartRound => {
            let s = require_session!(session, "start a round");
            game::handle_start_round(state, s).await
        }

        ClientMessage::AdvanceToHints => {
            let s = require_session!(session, "advance the round");
            game::handle_advance_to_hints(state, s).await
        }

        ClientMessage::ReturnToLobby => {
            let s = require_session!(session, "return to the lobby");
            game::handle_return_to_lobby(state, s).await
        }

        ClientMessage::GetSecret => {
            let s = require_session!(session, "request a word");
            game::handle_get_secret(state, s).await
        }

        ClientMessage::SubmitHint { text } => {
            let s = require_session!(session, "submit a hint");
            game::handle_submit_hint(state, s, text).await
        }

        ClientMessage::CastVote { voted_id } => {
            let s = require_session!(session, "vote");
            game::handle_cast_vote(state, s, voted_id).await
        }

        ClientMessage::SendChat { text } => {
            let s = require_session!(session, "chat");
            game::handle_send_chat(state, s, text).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppState;
    use crate::types::RoomStatus;

    async fn joined_session(
        state: &Arc<AppState>,
        username: &str,
    ) -> (Option<Session>, ServerMessage) {
        let mut session = None;
        let reply = handle_message(
            ClientMessage::CreateRoom {
                username: username.to_string(),
                settings: None,
            },
            &mut session,
            state,
        )
        .await
        .unwrap();
        (session, reply)
    }

    #[tokio::test]
    async fn test_create_room_establishes_session() {
        let state = Arc::new(AppState::new());
        let (session, reply) = joined_session(&state, "Ana").await;

        let session = session.expect("session should be set");
        let ServerMessage::RoomJoined {
            profile_id,
            room,
            participants,
            join_url,
            ..
        } = reply
        else {
            panic!("Expected RoomJoined");
        };
        assert_eq!(profile_id, session.profile_id);
        assert_eq!(room.id, session.room_id);
        assert_eq!(room.host_id, Some(profile_id));
        assert_eq!(participants.len(), 1);
        assert!(join_url.ends_with(&room.code));
    }

    #[tokio::test]
    async fn test_join_unknown_code() {
        let state = Arc::new(AppState::new());
        let mut session = None;

        let reply = handle_message(
            ClientMessage::JoinRoom {
                room_code: "ZZZZZ".to_string(),
                username: "Ben".to_string(),
            },
            &mut session,
            &state,
        )
        .await;

        assert!(session.is_none());
        let Some(ServerMessage::Error { code, .. }) = reply else {
            panic!("Expected Error");
        };
        assert_eq!(code, "ROOM_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_join_is_case_insensitive() {
        let state = Arc::new(AppState::new());
        let (host_session, _) = joined_session(&state, "Ana").await;
        let room = state
            .get_room(&host_session.unwrap().room_id)
            .await
            .unwrap();

        let mut session = None;
        let reply = handle_message(
            ClientMessage::JoinRoom {
                room_code: room.code.to_lowercase(),
                username: "Ben".to_string(),
            },
            &mut session,
            &state,
        )
        .await;

        assert!(session.is_some());
        assert!(matches!(reply, Some(ServerMessage::RoomJoined { .. })));
    }

    #[tokio::test]
    async fn test_room_scoped_message_without_session() {
        let state = Arc::new(AppState::new());
        let mut session = None;

        let reply = handle_message(ClientMessage::StartRound, &mut session, &state).await;
        let Some(ServerMessage::Error { code, .. }) = reply else {
            panic!("Expected Error");
        };
        assert_eq!(code, "NOT_IN_ROOM");
    }

    #[tokio::test]
    async fn test_non_host_cannot_start_round() {
        let state = Arc::new(AppState::new());
        let (host_session, _) = joined_session(&state, "Ana").await;
        let room = state
            .get_room(&host_session.unwrap().room_id)
            .await
            .unwrap();

        let mut guest = None;
        handle_message(
            ClientMessage::JoinRoom {
                room_code: room.code.clone(),
                username: "Ben".to_string(),
            },
            &mut guest,
            &state,
        )
        .await;

        let reply = handle_message(ClientMessage::StartRound, &mut guest, &state).await;
        let Some(ServerMessage::Error { code, .. }) = reply else {
            panic!("Expected Error");
        };
        assert_eq!(code, "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn test_start_round_needs_two_players() {
        let state = Arc::new(AppState::new());
        let (mut session, _) = joined_session(&state, "Ana").await;

        let reply = handle_message(ClientMessage::StartRound, &mut session, &state).await;
        let Some(ServerMessage::Error { code, .. }) = reply else {
            panic!("Expected Error");
        };
        assert_eq!(code, "NOT_ENOUGH_PLAYERS");
    }

    #[tokio::test]
    async fn test_start_round_replies_with_host_summary() {
        let state = Arc::new(AppState::new());
        let (mut host, reply) = joined_session(&state, "Ana").await;
        let ServerMessage::RoomJoined { room, .. } = reply else {
            panic!("Expected RoomJoined");
        };

        let mut guest = None;
        handle_message(
            ClientMessage::JoinRoom {
                room_code: room.code.clone(),
                username: "Ben".to_string(),
            },
            &mut guest,
            &state,
        )
        .await;

        let reply = handle_message(ClientMessage::StartRound, &mut host, &state).await;
        let Some(ServerMessage::RoundStartSummary {
            round,
            civilian_word,
            traitor_word,
            num_players,
            num_traitors,
        }) = reply
        else {
            panic!("Expected RoundStartSummary");
        };
        assert_eq!(round, 1);
        assert_ne!(civilian_word, traitor_word);
        assert_eq!(num_players, 2);
        assert_eq!(num_traitors, 1);
    }

    #[tokio::test]
    async fn test_get_secret_after_start() {
        let state = Arc::new(AppState::new());
        let (mut host, reply) = joined_session(&state, "Ana").await;
        let ServerMessage::RoomJoined { room, .. } = reply else {
            panic!("Expected RoomJoined");
        };

        let mut guest = None;
        handle_message(
            ClientMessage::JoinRoom {
                room_code: room.code.clone(),
                username: "Ben".to_string(),
            },
            &mut guest,
            &state,
        )
        .await;

        // Before a round exists the secret is not ready
        let reply = handle_message(ClientMessage::GetSecret, &mut guest, &state).await;
        let Some(ServerMessage::Error { code, .. }) = reply else {
            panic!("Expected Error");
        };
        assert_eq!(code, "SECRET_NOT_READY");

        handle_message(ClientMessage::StartRound, &mut host, &state).await;

        let reply = handle_message(ClientMessage::GetSecret, &mut guest, &state).await;
        let Some(ServerMessage::SecretWord { round, word }) = reply else {
            panic!("Expected SecretWord");
        };
        assert_eq!(round, 1);
        assert!(!word.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_hint_still_acked() {
        let state = Arc::new(AppState::new());
        let (mut host, reply) = joined_session(&state, "Ana").await;
        let ServerMessage::RoomJoined { room, .. } = reply else {
            panic!("Expected RoomJoined");
        };

        let mut guest = None;
        handle_message(
            ClientMessage::JoinRoom {
                room_code: room.code.clone(),
                username: "Ben".to_string(),
            },
            &mut guest,
            &state,
        )
        .await;
        handle_message(ClientMessage::StartRound, &mut host, &state).await;
        handle_message(ClientMessage::AdvanceToHints, &mut host, &state).await;

        let first = handle_message(
            ClientMessage::SubmitHint {
                text: "stripes".to_string(),
            },
            &mut host,
            &state,
        )
        .await;
        assert!(matches!(first, Some(ServerMessage::HintAck)));

        let second = handle_message(
            ClientMessage::SubmitHint {
                text: "rewritten".to_string(),
            },
            &mut host,
            &state,
        )
        .await;
        assert!(matches!(second, Some(ServerMessage::HintAck)));
    }

    #[tokio::test]
    async fn test_vote_change_rejected() {
        let state = Arc::new(AppState::new());
        let (mut host, reply) = joined_session(&state, "Ana").await;
        let ServerMessage::RoomJoined { room, .. } = reply else {
            panic!("Expected RoomJoined");
        };

        let mut b = None;
        let mut c = None;
        for (slot, name) in [(&mut b, "Ben"), (&mut c, "Cat")] {
            handle_message(
                ClientMessage::JoinRoom {
                    room_code: room.code.clone(),
                    username: name.to_string(),
                },
                slot,
                &state,
            )
            .await;
        }
        handle_message(ClientMessage::StartRound, &mut host, &state).await;
        handle_message(ClientMessage::AdvanceToHints, &mut host, &state).await;
        for s in [&mut host, &mut b, &mut c] {
            handle_message(
                ClientMessage::SubmitHint {
                    text: "hint".to_string(),
                },
                s,
                &state,
            )
            .await;
        }

        let b_id = b.as_ref().unwrap().profile_id.clone();
        let c_id = c.as_ref().unwrap().profile_id.clone();

        let first = handle_message(
            ClientMessage::CastVote {
                voted_id: b_id.clone(),
            },
            &mut host,
            &state,
        )
        .await;
        assert!(matches!(first, Some(ServerMessage::VoteAck)));

        // Same ballot again is acked, a different one is refused
        let again = handle_message(
            ClientMessage::CastVote { voted_id: b_id },
            &mut host,
            &state,
        )
        .await;
        assert!(matches!(again, Some(ServerMessage::VoteAck)));

        let changed = handle_message(
            ClientMessage::CastVote { voted_id: c_id },
            &mut host,
            &state,
        )
        .await;
        let Some(ServerMessage::Error { code, .. }) = changed else {
            panic!("Expected Error");
        };
        assert_eq!(code, "VOTE_CHANGE_REJECTED");
    }

    #[tokio::test]
    async fn test_dropped_client_rejoins_mid_round() {
        let state = Arc::new(AppState::new());
        let (mut host, reply) = joined_session(&state, "Ana").await;
        let ServerMessage::RoomJoined { room, .. } = reply else {
            panic!("Expected RoomJoined");
        };

        let mut guest = None;
        handle_message(
            ClientMessage::JoinRoom {
                room_code: room.code.clone(),
                username: "Ben".to_string(),
            },
            &mut guest,
            &state,
        )
        .await;
        handle_message(ClientMessage::StartRound, &mut host, &state).await;

        // The guest's socket drops mid-round
        let guest_id = guest.as_ref().unwrap().profile_id.clone();
        state.mark_offline(&room.id, &guest_id).await;
        guest = None;

        // A fresh join is locked out while the round runs
        let mut fresh = None;
        let reply = handle_message(
            ClientMessage::JoinRoom {
                room_code: room.code.clone(),
                username: "Ben".to_string(),
            },
            &mut fresh,
            &state,
        )
        .await;
        let Some(ServerMessage::Error { code, .. }) = reply else {
            panic!("Expected Error");
        };
        assert_eq!(code, "ROOM_IN_PROGRESS");

        // Rejoining by remembered profile id recovers the seat and snapshot
        let reply = handle_message(
            ClientMessage::RejoinRoom {
                room_code: room.code.clone(),
                profile_id: guest_id.clone(),
            },
            &mut guest,
            &state,
        )
        .await;
        let Some(ServerMessage::RoomJoined {
            profile_id,
            room: current,
            participants,
            ..
        }) = reply
        else {
            panic!("Expected RoomJoined");
        };
        assert_eq!(profile_id, guest_id);
        assert_eq!(current.status, RoomStatus::Playing);
        assert_eq!(participants.len(), 2);
        assert_eq!(guest.as_ref().unwrap().profile_id, guest_id);

        // The recovered session can read its secret again
        let reply = handle_message(ClientMessage::GetSecret, &mut guest, &state).await;
        assert!(matches!(reply, Some(ServerMessage::SecretWord { .. })));
    }

    #[tokio::test]
    async fn test_rejoin_unknown_profile_rejected() {
        let state = Arc::new(AppState::new());
        let (host, reply) = joined_session(&state, "Ana").await;
        let ServerMessage::RoomJoined { room, .. } = reply else {
            panic!("Expected RoomJoined");
        };

        let mut session = None;
        let reply = handle_message(
            ClientMessage::RejoinRoom {
                room_code: room.code,
                profile_id: "stranger".to_string(),
            },
            &mut session,
            &state,
        )
        .await;
        let Some(ServerMessage::Error { code, .. }) = reply else {
            panic!("Expected Error");
        };
        assert_eq!(code, "UNKNOWN_PROFILE");
        assert!(session.is_none());
        let _ = host;
    }

    #[tokio::test]
    async fn test_leave_room_clears_session() {
        let state = Arc::new(AppState::new());
        let (mut session, _) = joined_session(&state, "Ana").await;

        let reply = handle_message(ClientMessage::LeaveRoom, &mut session, &state).await;
        assert!(reply.is_none());
        assert!(session.is_none());
    }

    #[tokio::test]
    async fn test_chat_outside_discussion_rejected() {
        let state = Arc::new(AppState::new());
        let (mut session, _) = joined_session(&state, "Ana").await;

        let room_id = session.as_ref().unwrap().room_id.clone();
        assert!(matches!(
            state.get_room(&room_id).await.unwrap().status,
            RoomStatus::Waiting
        ));

        let reply = handle_message(
            ClientMessage::SendChat {
                text: "too early".to_string(),
            },
            &mut session,
            &state,
        )
        .await;
        let Some(ServerMessage::Error { code, .. }) = reply else {
            panic!("Expected Error");
        };
        assert_eq!(code, "CHAT_REJECTED");
    }
}
