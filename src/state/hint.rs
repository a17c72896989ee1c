use super::AppState;
use crate::protocol::{HintInfo, ServerMessage};
use crate::types::*;
use chrono::Utc;

/// Outcome of a hint submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HintResult {
    Recorded,
    /// At-most-once per round cycle: a second submission is a no-op
    Duplicate,
    /// Spectators (voted-out players) cannot submit
    NotAlive,
    WrongPhase,
}

impl AppState {
    /// Record an alive participant's hint, then advance the room if the
    /// quorum is now satisfied.
    pub async fn submit_hint(
        &self,
        room_id: &RoomId,
        profile_id: &ProfileId,
        text: String,
    ) -> HintResult {
        let Some(room) = self.get_room(room_id).await else {
            return HintResult::WrongPhase;
        };
        if !matches!(room.status, RoomStatus::HintDrop { .. }) {
            return HintResult::WrongPhase;
        }

        let alive = self
            .room_participants(room_id)
            .await
            .iter()
            .any(|p| p.profile_id == *profile_id && p.is_alive);
        if !alive {
            return HintResult::NotAlive;
        }

        let submitted = {
            let mut hints = self.hints.write().await;
            if hints
                .iter()
                .any(|h| h.room_id == *room_id && h.profile_id == *profile_id)
            {
                false
            } else {
                hints.push(Hint {
                    room_id: room_id.clone(),
                    profile_id: profile_id.clone(),
                    text,
                });
                true
            }
        };
        if !submitted {
            return HintResult::Duplicate;
        }

        let needed = self.alive_count(room_id).await as u32;
        let count = self.hint_count(room_id).await as u32;
        self.broadcast_room(
            room_id,
            ServerMessage::HintProgress {
                submitted: count,
                needed,
            },
        )
        .await;

        self.maybe_finish_hint_drop(room_id).await;
        HintResult::Recorded
    }

    pub(super) async fn hint_count(&self, room_id: &RoomId) -> usize {
        self.hints
            .read()
            .await
            .iter()
            .filter(|h| h.room_id == *room_id)
            .count()
    }

    /// Advance HintDrop -> Discussion when every alive participant has a
    /// hint on record. Idempotent: checking an already-advanced room (or a
    /// room short of quorum) changes nothing. Returns whether it advanced.
    pub async fn maybe_finish_hint_drop(&self, room_id: &RoomId) -> bool {
        let needed = self.alive_count(room_id).await;
        if needed == 0 || self.hint_count(room_id).await < needed {
            return false;
        }

        let advanced = {
            let mut rooms = self.rooms.write().await;
            match rooms.get_mut(room_id) {
                Some(room) if matches!(room.status, RoomStatus::HintDrop { .. }) => {
                    room.status = RoomStatus::Discussion {
                        vote_started_at: Utc::now(),
                    };
                    true
                }
                _ => false,
            }
        };
        if !advanced {
            return false;
        }

        let hints: Vec<HintInfo> = self
            .hints
            .read()
            .await
            .iter()
            .filter(|h| h.room_id == *room_id)
            .map(HintInfo::from)
            .collect();

        tracing::info!(
            "Room {}: all {} hints in, advancing to discussion",
            room_id,
            hints.len()
        );
        self.broadcast_room(room_id, ServerMessage::HintsRevealed { hints })
            .await;
        self.broadcast_phase(room_id).await;
        true
    }

    /// Synthesize the placeholder hint for every alive participant who
    /// missed the deadline. Returns how many were written. Re-checks the
    /// phase: the room may have left HintDrop between the deadline sweep's
    /// scan and this write, and a Waiting room must not grow orphan rows.
    pub async fn fill_missing_hints(&self, room_id: &RoomId) -> usize {
        match self.get_room(room_id).await {
            Some(room) if matches!(room.status, RoomStatus::HintDrop { .. }) => {}
            _ => return 0,
        }

        let seated = self.room_participants(room_id).await;
        let mut hints = self.hints.write().await;
        let mut added = 0;

        for p in seated.iter().filter(|p| p.is_alive) {
            let already = hints
                .iter()
                .any(|h| h.room_id == *room_id && h.profile_id == p.profile_id);
            if !already {
                hints.push(Hint {
                    room_id: room_id.clone(),
                    profile_id: p.profile_id.clone(),
                    text: PLACEHOLDER_HINT.to_string(),
                });
                added += 1;
            }
        }
        added
    }
}
