mod chat;
mod hint;
mod presence;
mod room;
mod round;
mod vote;

pub use hint::HintResult;
pub use room::{JoinError, LeaveSummary};
pub use round::{RoundSummary, StartRoundError};
pub use vote::{VoteCastResult, VoteResolution};

use crate::protocol::{ParticipantInfo, ServerMessage};
use crate::types::*;
use crate::words::WordPairProvider;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

/// Shared application state.
///
/// One logical table per store; a room-scoped broadcast channel plays the
/// role of the change feed every connected client observes. Presence and
/// last-seen maps are ephemeral and never serialized.
#[derive(Clone)]
pub struct AppState {
    pub rooms: Arc<RwLock<HashMap<RoomId, Room>>>,
    /// Seated participants per room, unique on (room, profile)
    pub participants: Arc<RwLock<HashMap<RoomId, Vec<Participant>>>>,
    pub profiles: Arc<RwLock<HashMap<ProfileId, Profile>>>,
    pub secrets: Arc<RwLock<Vec<RoundSecret>>>,
    pub hints: Arc<RwLock<Vec<Hint>>>,
    pub votes: Arc<RwLock<Vec<Vote>>>,
    pub messages: Arc<RwLock<Vec<ChatMessage>>>,
    /// Live per-room presence set: profile -> online_at
    pub presence: Arc<RwLock<HashMap<RoomId, HashMap<ProfileId, DateTime<Utc>>>>>,
    /// Last confirmed-present timestamp per (room, profile); feeds the reaper
    pub last_seen: Arc<RwLock<HashMap<RoomId, HashMap<ProfileId, DateTime<Utc>>>>>,
    /// Per-room change feed
    pub channels: Arc<RwLock<HashMap<RoomId, broadcast::Sender<ServerMessage>>>>,
    /// Remote word-pair source; None means the built-in pool only
    pub words: Option<Arc<dyn WordPairProvider>>,
    /// Base URL used to build shareable join links
    pub base_url: String,
}

impl AppState {
    pub fn new() -> Self {
        Self::new_with_words(None)
    }

    pub fn new_with_words(words: Option<Arc<dyn WordPairProvider>>) -> Self {
        let base_url = std::env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:7368".to_string());

        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
            participants: Arc::new(RwLock::new(HashMap::new())),
            profiles: Arc::new(RwLock::new(HashMap::new())),
            secrets: Arc::new(RwLock::new(Vec::new())),
            hints: Arc::new(RwLock::new(Vec::new())),
            votes: Arc::new(RwLock::new(Vec::new())),
            messages: Arc::new(RwLock::new(Vec::new())),
            presence: Arc::new(RwLock::new(HashMap::new())),
            last_seen: Arc::new(RwLock::new(HashMap::new())),
            channels: Arc::new(RwLock::new(HashMap::new())),
            words,
            base_url,
        }
    }

    /// Get a room by id
    pub async fn get_room(&self, room_id: &RoomId) -> Option<Room> {
        self.rooms.read().await.get(room_id).cloned()
    }

    /// Get a room by its shareable code, matched case-insensitively
    pub async fn get_room_by_code(&self, code: &str) -> Option<Room> {
        let code = code.trim().to_uppercase();
        self.rooms
            .read()
            .await
            .values()
            .find(|r| r.code == code)
            .cloned()
    }

    /// All seated participants of a room
    pub async fn room_participants(&self, room_id: &RoomId) -> Vec<Participant> {
        self.participants
            .read()
            .await
            .get(room_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of alive participants; the quorum denominator for hints and votes
    pub async fn alive_count(&self, room_id: &RoomId) -> usize {
        self.room_participants(room_id)
            .await
            .iter()
            .filter(|p| p.is_alive)
            .count()
    }

    /// Public participant listing with usernames and host marker
    pub async fn participant_infos(&self, room_id: &RoomId) -> Vec<ParticipantInfo> {
        let host_id = self.get_room(room_id).await.and_then(|r| r.host_id);
        let participants = self.room_participants(room_id).await;
        let profiles = self.profiles.read().await;

        participants
            .iter()
            .map(|p| ParticipantInfo {
                profile_id: p.profile_id.clone(),
                username: profiles
                    .get(&p.profile_id)
                    .map(|pr| pr.username.clone())
                    .unwrap_or_default(),
                is_alive: p.is_alive,
                is_host: host_id.as_ref() == Some(&p.profile_id),
                joined_at: p.joined_at,
            })
            .collect()
    }

    /// Subscribe to a room's change feed
    pub async fn subscribe(&self, room_id: &RoomId) -> Option<broadcast::Receiver<ServerMessage>> {
        self.channels
            .read()
            .await
            .get(room_id)
            .map(|tx| tx.subscribe())
    }

    /// Broadcast to everyone observing a room. Send errors (no receivers
    /// connected) are ignored.
    pub async fn broadcast_room(&self, room_id: &RoomId, msg: ServerMessage) {
        if let Some(tx) = self.channels.read().await.get(room_id) {
            let _ = tx.send(msg);
        }
    }

    /// Broadcast the room's current status. Carries server_now so clients can
    /// offset their clocks when computing phase countdowns.
    pub async fn broadcast_phase(&self, room_id: &RoomId) {
        if let Some(room) = self.get_room(room_id).await {
            self.broadcast_room(
                room_id,
                ServerMessage::Phase {
                    status: room.status,
                    round: room.current_round,
                    server_now: Utc::now(),
                },
            )
            .await;
        }
    }

    /// Fetch a participant's secret word for the room's current round.
    /// None means the secret row is not visible yet and the caller should
    /// retry on the next change-feed event.
    pub async fn get_secret(&self, room_id: &RoomId, profile_id: &ProfileId) -> Option<(u32, String)> {
        let round = self.get_room(room_id).await?.current_round;
        self.secrets
            .read()
            .await
            .iter()
            .find(|s| s.room_id == *room_id && s.profile_id == *profile_id && s.round == round)
            .map(|s| (s.round, s.word.clone()))
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
