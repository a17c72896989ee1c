use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque ID types for type safety
pub type RoomId = String;
pub type ProfileId = String;

/// Maximum number of participants a room will seat
pub const ROOM_CAPACITY: usize = 12;

/// Placeholder hint written on behalf of players who miss the deadline
pub const PLACEHOLDER_HINT: &str = "...";

/// Current stage of a room's round life cycle.
///
/// Phases that run against a deadline carry their own anchor timestamp, so a
/// reconnecting client can recompute the remaining time from the anchor and
/// the server clock instead of a local timer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "phase", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomStatus {
    /// Lobby: host edits settings, players come and go freely.
    Waiting,
    /// Secret words have been dealt; each player reveals theirs client-side.
    Playing,
    /// Every alive player must drop exactly one hint before the deadline.
    HintDrop { started_at: DateTime<Utc> },
    /// Free-form chat and voting among alive players.
    Discussion { vote_started_at: DateTime<Utc> },
    /// The traitor left mid-round; the round is unsalvageable.
    TraitorLeft,
    /// The traitor was voted out; civilians win.
    Finished,
}

impl RoomStatus {
    /// True for phases where a round is in progress and roles are assigned.
    pub fn is_in_round(&self) -> bool {
        matches!(
            self,
            RoomStatus::Playing | RoomStatus::HintDrop { .. } | RoomStatus::Discussion { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WordDifficulty {
    Easy,
    Medium,
    Hard,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoomSettings {
    /// Requested traitor count; clamped to [1, players-1] at round start
    pub traitors: u32,
    /// Hint phase duration in seconds
    pub hint_seconds: u32,
    pub difficulty: WordDifficulty,
    pub allow_adult: bool,
    /// When set, vote progress broadcasts omit voter identities
    pub anonymous_votes: bool,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            traitors: 1,
            hint_seconds: 60,
            difficulty: WordDifficulty::Medium,
            allow_adult: false,
            anonymous_votes: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    /// Shareable join code, stored uppercase, matched case-insensitively
    pub code: String,
    /// Must reference a currently seated participant whenever non-null
    pub host_id: Option<ProfileId>,
    pub status: RoomStatus,
    /// Monotonic, starts at 0, bumped by the round initializer
    pub current_round: u32,
    pub settings: RoomSettings,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlayerRole {
    Civilian,
    Traitor,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub room_id: RoomId,
    pub profile_id: ProfileId,
    /// Assigned at round start, absent in the lobby
    pub role: Option<PlayerRole>,
    /// False once voted out; spectators are excluded from quorums
    pub is_alive: bool,
    /// Host-succession tie-break: oldest joined wins
    pub joined_at: DateTime<Utc>,
}

/// Anonymous display-name row, created fresh on every join/create.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: ProfileId,
    pub username: String,
}

/// Per-round, per-player assigned secret word. Never mutated; purged when the
/// room returns to the lobby.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundSecret {
    pub room_id: RoomId,
    pub profile_id: ProfileId,
    pub round: u32,
    pub word: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hint {
    pub room_id: RoomId,
    pub profile_id: ProfileId,
    pub text: String,
}

/// Immutable once cast; at most one per (room, voter) per round cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    pub room_id: RoomId,
    pub voter_id: ProfileId,
    pub voted_id: ProfileId,
    pub round: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub room_id: RoomId,
    pub profile_id: ProfileId,
    pub text: String,
    pub sent_at: DateTime<Utc>,
}
