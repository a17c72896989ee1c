use super::AppState;
use crate::protocol::ServerMessage;
use crate::types::*;
use crate::words::{self, WordPairError};
use chrono::Utc;
use rand::seq::SliceRandom;

/// Structured failure taxonomy of the round initializer, mirroring the
/// HTTP-style statuses of the original invocation contract.
#[derive(Debug, thiserror::Error)]
pub enum StartRoundError {
    #[error("only the host can start a round")]
    Unauthorized,

    #[error("room not found")]
    RoomNotFound,

    #[error("rounds can only start from the lobby")]
    InvalidStatus,

    #[error("need at least 2 players, have {0}")]
    NotEnoughPlayers(usize),

    #[error("word assignment failed: {0}")]
    WordAssignment(#[from] WordPairError),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Round metadata returned to the initiating host
#[derive(Debug, Clone)]
pub struct RoundSummary {
    pub round: u32,
    pub civilian_word: String,
    pub traitor_word: String,
    pub num_players: u32,
    pub num_traitors: u32,
}

impl AppState {
    /// Host-privileged round initializer.
    ///
    /// Selects a word pair (three-tier fallback), partitions participants
    /// into traitors and civilians with a uniform shuffle, and persists
    /// secrets and roles *before* flipping the status to Playing: the status
    /// flip is what drives clients to read their secrets, so a client that
    /// observes the flip early retries rather than finding nothing forever.
    pub async fn start_round(
        &self,
        room_id: &RoomId,
        caller: &ProfileId,
    ) -> Result<RoundSummary, StartRoundError> {
        let room = self
            .get_room(room_id)
            .await
            .ok_or(StartRoundError::RoomNotFound)?;

        if room.host_id.as_ref() != Some(caller) {
            return Err(StartRoundError::Unauthorized);
        }
        if room.status != RoomStatus::Waiting {
            return Err(StartRoundError::InvalidStatus);
        }

        let seated = self.room_participants(room_id).await;
        if seated.len() < 2 {
            return Err(StartRoundError::NotEnoughPlayers(seated.len()));
        }

        let pair = words::select_pair(
            self.words.as_deref(),
            room.settings.difficulty,
            room.settings.allow_adult,
        )
        .await?;

        // Always at least one traitor and at least one civilian
        let num_traitors = room.settings.traitors.clamp(1, seated.len() as u32 - 1);
        let round = room.current_round + 1;

        let mut order: Vec<ProfileId> = seated.iter().map(|p| p.profile_id.clone()).collect();
        order.shuffle(&mut rand::rng());
        let traitor_ids: Vec<ProfileId> = order[..num_traitors as usize].to_vec();

        // Stale submissions from the previous cycle must not count toward
        // the new round's quorums
        self.hints.write().await.retain(|h| h.room_id != *room_id);
        self.votes.write().await.retain(|v| v.room_id != *room_id);

        {
            let mut secrets = self.secrets.write().await;
            for p in &seated {
                let word = if traitor_ids.contains(&p.profile_id) {
                    pair.traitor_word.clone()
                } else {
                    pair.civilian_word.clone()
                };
                secrets.push(RoundSecret {
                    room_id: room_id.clone(),
                    profile_id: p.profile_id.clone(),
                    round,
                    word,
                });
            }
        }

        {
            let mut participants = self.participants.write().await;
            let seats = participants
                .get_mut(room_id)
                .ok_or_else(|| StartRoundError::Internal("participants vanished".to_string()))?;
            for p in seats.iter_mut() {
                p.role = Some(if traitor_ids.contains(&p.profile_id) {
                    PlayerRole::Traitor
                } else {
                    PlayerRole::Civilian
                });
                p.is_alive = true;
            }
        }

        // Secrets and roles are durable; now flip the status everyone watches
        {
            let mut rooms = self.rooms.write().await;
            let room = rooms
                .get_mut(room_id)
                .ok_or_else(|| StartRoundError::Internal("room vanished".to_string()))?;
            room.status = RoomStatus::Playing;
            room.current_round = round;
        }

        tracing::info!(
            "Room {}: round {} started with {} players, {} traitors",
            room_id,
            round,
            seated.len(),
            num_traitors
        );

        self.broadcast_room(
            room_id,
            ServerMessage::RoundStarted {
                round,
                num_players: seated.len() as u32,
                num_traitors,
            },
        )
        .await;
        self.broadcast_phase(room_id).await;

        Ok(RoundSummary {
            round,
            civilian_word: pair.civilian_word,
            traitor_word: pair.traitor_word,
            num_players: seated.len() as u32,
            num_traitors,
        })
    }

    /// Host-only transition from the word-reveal phase into hint collection,
    /// stamping the deadline anchor. Idempotent: re-issuing while already in
    /// HintDrop is a no-op, so duplicate host writes are harmless.
    pub async fn advance_to_hints(
        &self,
        room_id: &RoomId,
        caller: &ProfileId,
    ) -> Result<(), String> {
        let advanced = {
            let mut rooms = self.rooms.write().await;
            let room = rooms
                .get_mut(room_id)
                .ok_or_else(|| "Room not found".to_string())?;
            if room.host_id.as_ref() != Some(caller) {
                return Err("Only the host can advance the phase".to_string());
            }
            match room.status {
                RoomStatus::Playing => {
                    room.status = RoomStatus::HintDrop {
                        started_at: Utc::now(),
                    };
                    true
                }
                RoomStatus::HintDrop { .. } => false,
                _ => return Err("Room is not in the reveal phase".to_string()),
            }
        };

        if advanced {
            self.broadcast_phase(room_id).await;
        }
        Ok(())
    }

    /// Host-triggered reset back to the lobby. Clears every per-round store
    /// (including secrets from earlier rounds), revives all participants and
    /// drops their roles.
    pub async fn return_to_lobby(
        &self,
        room_id: &RoomId,
        caller: &ProfileId,
    ) -> Result<(), String> {
        {
            let mut rooms = self.rooms.write().await;
            let room = rooms
                .get_mut(room_id)
                .ok_or_else(|| "Room not found".to_string())?;
            if room.host_id.as_ref() != Some(caller) {
                return Err("Only the host can return the room to the lobby".to_string());
            }
            room.status = RoomStatus::Waiting;
        }

        self.hints.write().await.retain(|h| h.room_id != *room_id);
        self.votes.write().await.retain(|v| v.room_id != *room_id);
        self.secrets.write().await.retain(|s| s.room_id != *room_id);
        self.messages
            .write()
            .await
            .retain(|m| m.room_id != *room_id);

        {
            let mut participants = self.participants.write().await;
            if let Some(seats) = participants.get_mut(room_id) {
                for p in seats.iter_mut() {
                    p.role = None;
                    p.is_alive = true;
                }
            }
        }

        tracing::info!("Room {} returned to lobby", room_id);
        self.broadcast_phase(room_id).await;
        Ok(())
    }
}
