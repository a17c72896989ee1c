use super::AppState;
use crate::protocol::{ParticipantInfo, ServerMessage};
use crate::types::*;
use chrono::Utc;
use rand::Rng;
use tokio::sync::broadcast;

/// Safe character set for room codes (excludes 0/O, 1/I/L to avoid confusion)
const CODE_CHARS: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
const CODE_LENGTH: usize = 5;

/// Capacity of a room's change-feed channel
const CHANNEL_CAPACITY: usize = 256;

/// Generate a random shareable room code (5 characters, uppercase)
fn generate_room_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LENGTH)
        .map(|_| CODE_CHARS[rng.random_range(0..CODE_CHARS.len())] as char)
        .collect()
}

/// Errors a join attempt can produce
#[derive(Debug, thiserror::Error)]
pub enum JoinError {
    #[error("room not found")]
    RoomNotFound,
    #[error("a round is in progress")]
    InProgress,
    #[error("room is full")]
    RoomFull,
    #[error("no seat for that profile in this room")]
    UnknownProfile,
}

/// What a leave changed, for logging and for the caller's bookkeeping
#[derive(Debug, Clone)]
pub struct LeaveSummary {
    pub room_deleted: bool,
    pub new_host: Option<ProfileId>,
    pub traitor_left: bool,
}

impl AppState {
    /// Create a circle: fresh anonymous profile, generated code, creator
    /// seated as host.
    pub async fn create_room(
        &self,
        username: String,
        settings: Option<RoomSettings>,
    ) -> (Room, Profile) {
        let profile = Profile {
            id: ulid::Ulid::new().to_string(),
            username,
        };
        let room_id: RoomId = ulid::Ulid::new().to_string();

        let participant = Participant {
            room_id: room_id.clone(),
            profile_id: profile.id.clone(),
            role: None,
            is_alive: true,
            joined_at: Utc::now(),
        };

        self.profiles
            .write()
            .await
            .insert(profile.id.clone(), profile.clone());
        self.participants
            .write()
            .await
            .insert(room_id.clone(), vec![participant]);

        // Code uniqueness is checked and the room inserted under one write
        // lock, so two concurrent creates cannot mint the same code
        let room = {
            let mut rooms = self.rooms.write().await;
            let code = loop {
                let code = generate_room_code();
                if !rooms.values().any(|r| r.code == code) {
                    break code;
                }
            };
            let room = Room {
                id: room_id,
                code,
                host_id: Some(profile.id.clone()),
                status: RoomStatus::Waiting,
                current_round: 0,
                settings: settings.unwrap_or_default(),
                created_at: Utc::now(),
            };
            rooms.insert(room.id.clone(), room.clone());
            room
        };

        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        self.channels.write().await.insert(room.id.clone(), tx);

        tracing::info!("Room {} created (code {})", room.id, room.code);
        (room, profile)
    }

    /// Join an existing room by code. Only accepted while the room waits in
    /// the lobby; roles are dealt at round start, so a mid-round join would
    /// corrupt quorum counts.
    pub async fn join_room(
        &self,
        room_code: &str,
        username: String,
    ) -> Result<(Room, Profile), JoinError> {
        let room = self
            .get_room_by_code(room_code)
            .await
            .ok_or(JoinError::RoomNotFound)?;

        if room.status != RoomStatus::Waiting {
            return Err(JoinError::InProgress);
        }

        if self.room_participants(&room.id).await.len() >= ROOM_CAPACITY {
            return Err(JoinError::RoomFull);
        }

        let profile = Profile {
            id: ulid::Ulid::new().to_string(),
            username: username.clone(),
        };

        let participant = Participant {
            room_id: room.id.clone(),
            profile_id: profile.id.clone(),
            role: None,
            is_alive: true,
            joined_at: Utc::now(),
        };

        self.profiles
            .write()
            .await
            .insert(profile.id.clone(), profile.clone());
        self.participants
            .write()
            .await
            .entry(room.id.clone())
            .or_default()
            .push(participant.clone());

        self.broadcast_room(
            &room.id,
            ServerMessage::ParticipantJoined {
                participant: ParticipantInfo {
                    profile_id: profile.id.clone(),
                    username,
                    is_alive: true,
                    is_host: false,
                    joined_at: participant.joined_at,
                },
            },
        )
        .await;

        tracing::info!("Profile {} joined room {}", profile.id, room.id);
        Ok((room, profile))
    }

    /// Re-attach a returning client to its existing seat, identified by the
    /// profile id the client remembered for this room code. Allowed in any
    /// phase: a dropped socket mid-round must be able to recover before the
    /// ghost reaper gives up on the seat.
    pub async fn rejoin_room(
        &self,
        room_code: &str,
        profile_id: &ProfileId,
    ) -> Result<(Room, Profile), JoinError> {
        let room = self
            .get_room_by_code(room_code)
            .await
            .ok_or(JoinError::RoomNotFound)?;

        let seated = self
            .room_participants(&room.id)
            .await
            .iter()
            .any(|p| p.profile_id == *profile_id);
        if !seated {
            return Err(JoinError::UnknownProfile);
        }

        let profile = self
            .profiles
            .read()
            .await
            .get(profile_id)
            .cloned()
            .ok_or(JoinError::UnknownProfile)?;

        tracing::info!("Profile {} rejoined room {}", profile.id, room.id);
        Ok((room, profile))
    }

    /// Remove a participant, scrub their per-round rows, and run the
    /// follow-up coordination: traitor-left interrupt, host succession,
    /// room deletion on empty, and quorum rechecks for the shrunken room.
    pub async fn leave_room(
        &self,
        room_id: &RoomId,
        profile_id: &ProfileId,
    ) -> Result<LeaveSummary, String> {
        let removed = {
            let mut participants = self.participants.write().await;
            let seats = participants
                .get_mut(room_id)
                .ok_or_else(|| "Room not found".to_string())?;
            let idx = seats
                .iter()
                .position(|p| p.profile_id == *profile_id)
                .ok_or_else(|| "Not a participant of this room".to_string())?;
            seats.remove(idx)
        };

        self.profiles.write().await.remove(profile_id);
        self.hints
            .write()
            .await
            .retain(|h| !(h.room_id == *room_id && h.profile_id == *profile_id));
        self.votes.write().await.retain(|v| {
            !(v.room_id == *room_id && (v.voter_id == *profile_id || v.voted_id == *profile_id))
        });
        self.secrets
            .write()
            .await
            .retain(|s| !(s.room_id == *room_id && s.profile_id == *profile_id));

        if let Some(room_presence) = self.presence.write().await.get_mut(room_id) {
            room_presence.remove(profile_id);
        }
        if let Some(room_seen) = self.last_seen.write().await.get_mut(room_id) {
            room_seen.remove(profile_id);
        }

        let remaining = self.room_participants(room_id).await;
        if remaining.is_empty() {
            self.delete_room(room_id).await;
            tracing::info!("Room {} deleted (last participant left)", room_id);
            return Ok(LeaveSummary {
                room_deleted: true,
                new_host: None,
                traitor_left: false,
            });
        }

        self.broadcast_room(
            room_id,
            ServerMessage::ParticipantLeft {
                profile_id: profile_id.clone(),
            },
        )
        .await;

        // Traitor vanishing mid-round makes the round unsalvageable
        let mut traitor_left = false;
        {
            let mut rooms = self.rooms.write().await;
            if let Some(room) = rooms.get_mut(room_id) {
                if room.status.is_in_round() && removed.role == Some(PlayerRole::Traitor) {
                    room.status = RoomStatus::TraitorLeft;
                    traitor_left = true;
                }
            }
        }
        if traitor_left {
            tracing::info!("Traitor {} left room {} mid-round", profile_id, room_id);
            self.broadcast_room(room_id, ServerMessage::TraitorLeft)
                .await;
            self.broadcast_phase(room_id).await;
        }

        // Host succession: oldest joined wins
        let mut new_host = None;
        let was_host = {
            let rooms = self.rooms.read().await;
            rooms
                .get(room_id)
                .map(|r| r.host_id.as_ref() == Some(profile_id))
                .unwrap_or(false)
        };
        if was_host {
            new_host = self.elect_host(room_id, &remaining).await;
        }

        self.broadcast_presence(room_id).await;

        // The departure may have satisfied a quorum the room was waiting on
        if !traitor_left {
            if let Some(room) = self.get_room(room_id).await {
                match room.status {
                    RoomStatus::HintDrop { .. } => {
                        self.maybe_finish_hint_drop(room_id).await;
                    }
                    RoomStatus::Discussion { .. } => {
                        self.maybe_resolve_votes(room_id).await;
                    }
                    _ => {}
                }
            }
        }

        Ok(LeaveSummary {
            room_deleted: false,
            new_host,
            traitor_left,
        })
    }

    /// Promote the oldest-joined candidate to host. Idempotent: writing the
    /// same host twice changes nothing, so concurrent promotions converge.
    pub(super) async fn elect_host(
        &self,
        room_id: &RoomId,
        candidates: &[Participant],
    ) -> Option<ProfileId> {
        let elected = candidates
            .iter()
            .min_by(|a, b| {
                a.joined_at
                    .cmp(&b.joined_at)
                    .then_with(|| a.profile_id.cmp(&b.profile_id))
            })?
            .profile_id
            .clone();

        let changed = {
            let mut rooms = self.rooms.write().await;
            let room = rooms.get_mut(room_id)?;
            if room.host_id.as_ref() == Some(&elected) {
                false
            } else {
                room.host_id = Some(elected.clone());
                true
            }
        };

        if changed {
            tracing::info!("Room {}: host changed to {}", room_id, elected);
            self.broadcast_room(
                room_id,
                ServerMessage::HostChanged {
                    host_id: elected.clone(),
                },
            )
            .await;
        }

        Some(elected)
    }

    /// Host-only settings update, lobby only
    pub async fn update_settings(
        &self,
        room_id: &RoomId,
        caller: &ProfileId,
        settings: RoomSettings,
    ) -> Result<(), String> {
        {
            let mut rooms = self.rooms.write().await;
            let room = rooms
                .get_mut(room_id)
                .ok_or_else(|| "Room not found".to_string())?;
            if room.host_id.as_ref() != Some(caller) {
                return Err("Only the host can change settings".to_string());
            }
            if room.status != RoomStatus::Waiting {
                return Err("Settings can only change in the lobby".to_string());
            }
            room.settings = settings.clone();
        }

        self.broadcast_room(room_id, ServerMessage::SettingsUpdated { settings })
            .await;
        Ok(())
    }

    /// Drop every row belonging to a room, including its change feed
    async fn delete_room(&self, room_id: &RoomId) {
        self.rooms.write().await.remove(room_id);
        self.participants.write().await.remove(room_id);
        self.secrets.write().await.retain(|s| s.room_id != *room_id);
        self.hints.write().await.retain(|h| h.room_id != *room_id);
        self.votes.write().await.retain(|v| v.room_id != *room_id);
        self.messages
            .write()
            .await
            .retain(|m| m.room_id != *room_id);
        self.presence.write().await.remove(room_id);
        self.last_seen.write().await.remove(room_id);
        self.channels.write().await.remove(room_id);
    }
}
