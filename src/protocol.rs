use crate::types::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Create a circle: fresh profile, generated code, caller becomes host
    CreateRoom {
        username: String,
        #[serde(default)]
        settings: Option<RoomSettings>,
    },
    /// Join by code (case-insensitive); only accepted while the room waits
    JoinRoom {
        room_code: String,
        username: String,
    },
    /// Re-attach to an existing seat after a dropped socket, using the
    /// profile id the client remembered for this room code. Accepted in any
    /// phase; answered with the same RoomJoined snapshot as a join.
    RejoinRoom {
        room_code: String,
        profile_id: ProfileId,
    },
    LeaveRoom,
    /// Presence keep-alive; refreshes this client's online_at timestamp
    Heartbeat,
    // Host-only messages (authorized against the room's host reference,
    // not the connection)
    UpdateSettings {
        settings: RoomSettings,
    },
    StartRound,
    /// Playing -> HintDrop, stamping the hint deadline anchor
    AdvanceToHints,
    ReturnToLobby,
    // In-round messages
    /// Fetch the caller's secret word for the current round. Answered with
    /// SECRET_NOT_READY if the status flip was observed before the secret
    /// row; the client retries on the next event.
    GetSecret,
    SubmitHint {
        text: String,
    },
    CastVote {
        voted_id: ProfileId,
    },
    SendChat {
        text: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Reply to CreateRoom/JoinRoom with everything needed to render the room
    RoomJoined {
        profile_id: ProfileId,
        room: Room,
        participants: Vec<ParticipantInfo>,
        online: Vec<ProfileId>,
        join_url: String,
        server_now: DateTime<Utc>,
    },
    /// Broadcast on durable membership changes
    ParticipantJoined {
        participant: ParticipantInfo,
    },
    ParticipantLeft {
        profile_id: ProfileId,
    },
    HostChanged {
        host_id: ProfileId,
    },
    SettingsUpdated {
        settings: RoomSettings,
    },
    /// Broadcast on every status transition. Carries server_now so clients
    /// can offset their local clock when computing phase countdowns.
    Phase {
        status: RoomStatus,
        round: u32,
        server_now: DateTime<Utc>,
    },
    /// Broadcast when the round initializer finishes (words stay private)
    RoundStarted {
        round: u32,
        num_players: u32,
        num_traitors: u32,
    },
    /// Private reply to the host that started the round
    RoundStartSummary {
        round: u32,
        civilian_word: String,
        traitor_word: String,
        num_players: u32,
        num_traitors: u32,
    },
    /// Private reply to GetSecret
    SecretWord {
        round: u32,
        word: String,
    },
    HintAck,
    HintProgress {
        submitted: u32,
        needed: u32,
    },
    /// Broadcast when the room advances to discussion
    HintsRevealed {
        hints: Vec<HintInfo>,
    },
    VoteAck,
    VoteProgress {
        cast: u32,
        needed: u32,
        /// Omitted when the room votes anonymously
        #[serde(skip_serializing_if = "Option::is_none")]
        voters: Option<Vec<ProfileId>>,
    },
    PlayerEliminated {
        profile_id: ProfileId,
        was_traitor: bool,
    },
    /// Broadcast alongside Phase(Finished) when the traitor is voted out
    CiviliansWin {
        traitor_id: ProfileId,
    },
    /// The traitor left mid-round; host must return the room to the lobby
    TraitorLeft,
    Chat {
        message: ChatMessage,
    },
    /// Ephemeral presence set, broadcast on every membership change
    PresenceSnapshot {
        online: Vec<ProfileId>,
    },
    Error {
        code: String,
        msg: String,
    },
}

/// Public participant info; the assigned role never leaves the server while a
/// round is in progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantInfo {
    pub profile_id: ProfileId,
    pub username: String,
    pub is_alive: bool,
    pub is_host: bool,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HintInfo {
    pub profile_id: ProfileId,
    pub text: String,
}

impl From<&Hint> for HintInfo {
    fn from(h: &Hint) -> Self {
        Self {
            profile_id: h.profile_id.clone(),
            text: h.text.clone(),
        }
    }
}
