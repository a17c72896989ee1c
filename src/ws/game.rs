//! In-round handlers: round control, secret words, hints, votes, chat.

use crate::protocol::ServerMessage;
use crate::state::{AppState, HintResult, StartRoundError, VoteCastResult};
use crate::types::ProfileId;
use std::sync::Arc;

use super::Session;

pub async fn handle_start_round(state: &Arc<AppState>, session: Session) -> Option<ServerMessage> {
    match state.start_round(&session.room_id, &session.profile_id).await {
        // Word assignments stay private; only the starting host gets the
        // full summary
        Ok(summary) => Some(ServerMessage::RoundStartSummary {
            round: summary.round,
            civilian_word: summary.civilian_word,
            traitor_word: summary.traitor_word,
            num_players: summary.num_players,
            num_traitors: summary.num_traitors,
        }),
        Err(e) => {
            let code = match &e {
                StartRoundError::Unauthorized => "UNAUTHORIZED",
                StartRoundError::RoomNotFound => "ROOM_NOT_FOUND",
                StartRoundError::InvalidStatus => "INVALID_STATUS",
                StartRoundError::NotEnoughPlayers(_) => "NOT_ENOUGH_PLAYERS",
                StartRoundError::WordAssignment(_) => "WORD_ASSIGNMENT_FAILED",
                StartRoundError::Internal(_) => "INTERNAL",
            };
            Some(ServerMessage::Error {
                code: code.to_string(),
                msg: e.to_string(),
            })
        }
    }
}

pub async fn handle_advance_to_hints(
    state: &Arc<AppState>,
    session: Session,
) -> Option<ServerMessage> {
    match state
        .advance_to_hints(&session.room_id, &session.profile_id)
        .await
    {
        Ok(()) => None,
        Err(e) => Some(ServerMessage::Error {
            code: "ADVANCE_FAILED".to_string(),
            msg: e,
        }),
    }
}

pub async fn handle_return_to_lobby(
    state: &Arc<AppState>,
    session: Session,
) -> Option<ServerMessage> {
    match state
        .return_to_lobby(&session.room_id, &session.profile_id)
        .await
    {
        Ok(()) => None,
        Err(e) => Some(ServerMessage::Error {
            code: "RETURN_TO_LOBBY_FAILED".to_string(),
            msg: e,
        }),
    }
}

pub async fn handle_get_secret(state: &Arc<AppState>, session: Session) -> Option<ServerMessage> {
    match state.get_secret(&session.room_id, &session.profile_id).await {
        Some((round, word)) => Some(ServerMessage::SecretWord { round, word }),
        // The client saw the status flip before the secret row landed (or
        // asked too early); it retries on the next event
        None => Some(ServerMessage::Error {
            code: "SECRET_NOT_READY".to_string(),
            msg: "No secret word for the current round yet".to_string(),
        }),
    }
}

pub async fn handle_submit_hint(
    state: &Arc<AppState>,
    session: Session,
    text: String,
) -> Option<ServerMessage> {
    match state
        .submit_hint(&session.room_id, &session.profile_id, text)
        .await
    {
        // Duplicates are acked as success: the first hint stands
        HintResult::Recorded | HintResult::Duplicate => Some(ServerMessage::HintAck),
        HintResult::NotAlive => Some(ServerMessage::Error {
            code: "NOT_ALIVE".to_string(),
            msg: "Eliminated players cannot submit hints".to_string(),
        }),
        HintResult::WrongPhase => Some(ServerMessage::Error {
            code: "WRONG_PHASE".to_string(),
            msg: "Hints are only accepted during the hint phase".to_string(),
        }),
    }
}

pub async fn handle_cast_vote(
    state: &Arc<AppState>,
    session: Session,
    voted_id: ProfileId,
) -> Option<ServerMessage> {
    match state
        .cast_vote(&session.room_id, &session.profile_id, &voted_id)
        .await
    {
        VoteCastResult::Recorded | VoteCastResult::AlreadyVotedSame => {
            Some(ServerMessage::VoteAck)
        }
        VoteCastResult::ChangeRejected => Some(ServerMessage::Error {
            code: "VOTE_CHANGE_REJECTED".to_string(),
            msg: "Votes are final once cast".to_string(),
        }),
        VoteCastResult::NotAlive => Some(ServerMessage::Error {
            code: "NOT_ALIVE".to_string(),
            msg: "Eliminated players cannot vote".to_string(),
        }),
        VoteCastResult::WrongPhase => Some(ServerMessage::Error {
            code: "WRONG_PHASE".to_string(),
            msg: "Votes are only accepted during discussion".to_string(),
        }),
        VoteCastResult::InvalidTarget => Some(ServerMessage::Error {
            code: "INVALID_TARGET".to_string(),
            msg: "Vote target is not an alive player in this room".to_string(),
        }),
    }
}

pub async fn handle_send_chat(
    state: &Arc<AppState>,
    session: Session,
    text: String,
) -> Option<ServerMessage> {
    match state
        .send_chat(&session.room_id, &session.profile_id, text)
        .await
    {
        // The Chat broadcast reaches the sender too
        Ok(_) => None,
        Err(e) => Some(ServerMessage::Error {
            code: "CHAT_REJECTED".to_string(),
            msg: e,
        }),
    }
}
