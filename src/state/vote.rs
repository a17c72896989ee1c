use super::AppState;
use crate::protocol::ServerMessage;
use crate::types::*;
use chrono::Utc;
use std::collections::HashMap;

/// Outcome of a vote cast
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteCastResult {
    Recorded,
    /// Same ballot again: reconciled to the existing row, acked as success
    AlreadyVotedSame,
    /// Votes are immutable once cast; rewriting is rejected
    ChangeRejected,
    NotAlive,
    WrongPhase,
    /// Target is not an alive participant of this room
    InvalidTarget,
}

/// How a satisfied vote quorum resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteResolution {
    /// A civilian was voted out; voting restarts among the survivors
    CivilianEliminated { profile_id: ProfileId },
    /// The traitor was voted out; the round is over
    TraitorEliminated { profile_id: ProfileId },
}

impl AppState {
    /// Cast an alive participant's vote, at most once per round cycle, then
    /// resolve the round if the quorum is now satisfied.
    pub async fn cast_vote(
        &self,
        room_id: &RoomId,
        voter_id: &ProfileId,
        voted_id: &ProfileId,
    ) -> VoteCastResult {
        let Some(room) = self.get_room(room_id).await else {
            return VoteCastResult::WrongPhase;
        };
        if !matches!(room.status, RoomStatus::Discussion { .. }) {
            return VoteCastResult::WrongPhase;
        }

        let seated = self.room_participants(room_id).await;
        if !seated
            .iter()
            .any(|p| p.profile_id == *voter_id && p.is_alive)
        {
            return VoteCastResult::NotAlive;
        }
        if !seated
            .iter()
            .any(|p| p.profile_id == *voted_id && p.is_alive)
        {
            return VoteCastResult::InvalidTarget;
        }

        let round = room.current_round;
        let recorded = {
            let mut votes = self.votes.write().await;
            if let Some(existing) = votes
                .iter()
                .find(|v| v.room_id == *room_id && v.voter_id == *voter_id && v.round == round)
            {
                if existing.voted_id == *voted_id {
                    return VoteCastResult::AlreadyVotedSame;
                }
                return VoteCastResult::ChangeRejected;
            }
            votes.push(Vote {
                room_id: room_id.clone(),
                voter_id: voter_id.clone(),
                voted_id: voted_id.clone(),
                round,
            });
            votes
                .iter()
                .filter(|v| v.room_id == *room_id && v.round == round)
                .count()
        };

        let needed = seated.iter().filter(|p| p.is_alive).count();
        let voters = if room.settings.anonymous_votes {
            None
        } else {
            let mut ids: Vec<ProfileId> = self
                .votes
                .read()
                .await
                .iter()
                .filter(|v| v.room_id == *room_id && v.round == round)
                .map(|v| v.voter_id.clone())
                .collect();
            ids.sort();
            Some(ids)
        };

        self.broadcast_room(
            room_id,
            ServerMessage::VoteProgress {
                cast: recorded as u32,
                needed: needed as u32,
                voters,
            },
        )
        .await;

        self.maybe_resolve_votes(room_id).await;
        VoteCastResult::Recorded
    }

    /// Tally this round's ballots per candidate
    pub(super) async fn tally_votes(&self, room_id: &RoomId, round: u32) -> HashMap<ProfileId, u32> {
        let votes = self.votes.read().await;
        let mut counts: HashMap<ProfileId, u32> = HashMap::new();
        for vote in votes
            .iter()
            .filter(|v| v.room_id == *room_id && v.round == round)
        {
            *counts.entry(vote.voted_id.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Resolve the discussion when every alive participant has voted.
    ///
    /// Plurality decides; ties break deterministically to the
    /// lexicographically smallest candidate id, so every observer of the
    /// same ballot set computes the same victim. Idempotent when the quorum
    /// is short or the room is not discussing.
    pub async fn maybe_resolve_votes(&self, room_id: &RoomId) -> Option<VoteResolution> {
        let room = self.get_room(room_id).await?;
        if !matches!(room.status, RoomStatus::Discussion { .. }) {
            return None;
        }

        let needed = self.alive_count(room_id).await;
        let round = room.current_round;
        let cast = self
            .votes
            .read()
            .await
            .iter()
            .filter(|v| v.room_id == *room_id && v.round == round)
            .count();
        if needed == 0 || cast < needed {
            return None;
        }

        let counts = self.tally_votes(room_id, round).await;
        let victim = counts
            .iter()
            .max_by(|(a_id, a_n), (b_id, b_n)| a_n.cmp(b_n).then_with(|| b_id.cmp(a_id)))
            .map(|(id, _)| id.clone())?;

        let victim_role = self
            .room_participants(room_id)
            .await
            .iter()
            .find(|p| p.profile_id == victim)
            .and_then(|p| p.role);

        if victim_role == Some(PlayerRole::Traitor) {
            // The traitor is eliminated like any other victim; the durable
            // row must agree with the PlayerEliminated broadcast
            {
                let mut participants = self.participants.write().await;
                if let Some(seats) = participants.get_mut(room_id) {
                    if let Some(p) = seats.iter_mut().find(|p| p.profile_id == victim) {
                        p.is_alive = false;
                    }
                }
            }
            {
                let mut rooms = self.rooms.write().await;
                if let Some(room) = rooms.get_mut(room_id) {
                    room.status = RoomStatus::Finished;
                }
            }

            tracing::info!("Room {}: traitor {} voted out, civilians win", room_id, victim);
            self.broadcast_room(
                room_id,
                ServerMessage::PlayerEliminated {
                    profile_id: victim.clone(),
                    was_traitor: true,
                },
            )
            .await;
            self.broadcast_room(
                room_id,
                ServerMessage::CiviliansWin {
                    traitor_id: victim.clone(),
                },
            )
            .await;
            self.broadcast_phase(room_id).await;

            return Some(VoteResolution::TraitorEliminated { profile_id: victim });
        }

        // Wrong guess: the victim becomes a spectator, ballots clear, and a
        // fresh voting sub-round begins with a new anchor. Hints are not
        // re-collected.
        {
            let mut participants = self.participants.write().await;
            if let Some(seats) = participants.get_mut(room_id) {
                if let Some(p) = seats.iter_mut().find(|p| p.profile_id == victim) {
                    p.is_alive = false;
                }
            }
        }
        self.votes
            .write()
            .await
            .retain(|v| !(v.room_id == *room_id && v.round == round));
        {
            let mut rooms = self.rooms.write().await;
            if let Some(room) = rooms.get_mut(room_id) {
                room.status = RoomStatus::Discussion {
                    vote_started_at: Utc::now(),
                };
            }
        }

        tracing::info!(
            "Room {}: civilian {} voted out, discussion continues",
            room_id,
            victim
        );
        self.broadcast_room(
            room_id,
            ServerMessage::PlayerEliminated {
                profile_id: victim.clone(),
                was_traitor: false,
            },
        )
        .await;
        self.broadcast_phase(room_id).await;

        Some(VoteResolution::CivilianEliminated { profile_id: victim })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Drive a room into discussion with everyone's hints submitted
    async fn room_in_discussion(state: &AppState, n: usize) -> (Room, Profile) {
        let (room, host) = state.create_room("P0".to_string(), None).await;
        for i in 1..n {
            state
                .join_room(&room.code, format!("P{}", i))
                .await
                .unwrap();
        }
        state.start_round(&room.id, &host.id).await.unwrap();
        state.advance_to_hints(&room.id, &host.id).await.unwrap();
        for p in state.room_participants(&room.id).await {
            state
                .submit_hint(&room.id, &p.profile_id, "hint".to_string())
                .await;
        }
        (room, host)
    }

    async fn traitor_and_civilians(state: &AppState, room_id: &RoomId) -> (ProfileId, Vec<ProfileId>) {
        let seated = state.room_participants(room_id).await;
        let traitor = seated
            .iter()
            .find(|p| p.role == Some(PlayerRole::Traitor))
            .unwrap()
            .profile_id
            .clone();
        let civilians = seated
            .iter()
            .filter(|p| p.role == Some(PlayerRole::Civilian))
            .map(|p| p.profile_id.clone())
            .collect();
        (traitor, civilians)
    }

    #[tokio::test]
    async fn test_vote_is_immutable_once_cast() {
        let state = AppState::new();
        let (room, _) = room_in_discussion(&state, 4).await;
        let seated = state.room_participants(&room.id).await;
        let voter = seated[0].profile_id.clone();
        let a = seated[1].profile_id.clone();
        let b = seated[2].profile_id.clone();

        assert_eq!(
            state.cast_vote(&room.id, &voter, &a).await,
            VoteCastResult::Recorded
        );
        assert_eq!(
            state.cast_vote(&room.id, &voter, &a).await,
            VoteCastResult::AlreadyVotedSame
        );
        assert_eq!(
            state.cast_vote(&room.id, &voter, &b).await,
            VoteCastResult::ChangeRejected
        );

        let votes = state.votes.read().await;
        assert_eq!(
            votes.iter().filter(|v| v.voter_id == voter).count(),
            1,
            "a second row must never exist"
        );
    }

    #[tokio::test]
    async fn test_civilian_elimination_loops_discussion() {
        let state = AppState::new();
        let (room, _) = room_in_discussion(&state, 4).await;
        let (traitor, civilians) = traitor_and_civilians(&state, &room.id).await;
        let victim = civilians[0].clone();

        // 2 votes on the victim, traitor and victim split theirs
        let seated = state.room_participants(&room.id).await;
        for p in &seated {
            let target = if p.profile_id == victim {
                &traitor
            } else if p.profile_id == traitor {
                &civilians[1]
            } else {
                &victim
            };
            state.cast_vote(&room.id, &p.profile_id, target).await;
        }

        let room_after = state.get_room(&room.id).await.unwrap();
        assert!(matches!(room_after.status, RoomStatus::Discussion { .. }));

        let seated = state.room_participants(&room.id).await;
        let victim_row = seated.iter().find(|p| p.profile_id == victim).unwrap();
        assert!(!victim_row.is_alive);
        assert_eq!(seated.iter().filter(|p| p.is_alive).count(), 3);

        // Ballots cleared for the next sub-round
        assert!(state
            .votes
            .read()
            .await
            .iter()
            .all(|v| v.room_id != room.id));
    }

    #[tokio::test]
    async fn test_traitor_elimination_finishes_round() {
        let state = AppState::new();
        let (room, _) = room_in_discussion(&state, 4).await;
        let (traitor, civilians) = traitor_and_civilians(&state, &room.id).await;

        for p in state.room_participants(&room.id).await {
            let target = if p.profile_id == traitor {
                &civilians[0]
            } else {
                &traitor
            };
            state.cast_vote(&room.id, &p.profile_id, target).await;
        }

        assert_eq!(
            state.get_room(&room.id).await.unwrap().status,
            RoomStatus::Finished
        );

        // The traitor's row is eliminated, everyone else survives
        let seated = state.room_participants(&room.id).await;
        for p in &seated {
            assert_eq!(p.is_alive, p.profile_id != traitor);
        }
    }

    #[tokio::test]
    async fn test_spectator_cannot_vote_and_is_excluded_from_quorum() {
        let state = AppState::new();
        let (room, _) = room_in_discussion(&state, 4).await;
        let (traitor, civilians) = traitor_and_civilians(&state, &room.id).await;
        let spectator = civilians[0].clone();

        // Eliminate one civilian first
        for p in state.room_participants(&room.id).await {
            let target = if p.profile_id == spectator {
                &traitor
            } else if p.profile_id == traitor {
                &spectator
            } else {
                &spectator
            };
            state.cast_vote(&room.id, &p.profile_id, target).await;
        }
        assert_eq!(
            state
                .cast_vote(&room.id, &spectator, &traitor)
                .await,
            VoteCastResult::NotAlive
        );

        // Quorum is now 3: the remaining alive players vote the traitor out
        for p in state.room_participants(&room.id).await {
            if !p.is_alive || p.profile_id == traitor {
                continue;
            }
            state.cast_vote(&room.id, &p.profile_id, &traitor).await;
        }
        state
            .cast_vote(&room.id, &traitor, &civilians[1])
            .await;

        assert_eq!(
            state.get_room(&room.id).await.unwrap().status,
            RoomStatus::Finished
        );
    }

    #[tokio::test]
    async fn test_tie_breaks_to_smallest_id() {
        let state = AppState::new();
        let (room, _) = room_in_discussion(&state, 4).await;
        let round = state.get_room(&room.id).await.unwrap().current_round;
        let seated = state.room_participants(&room.id).await;

        let mut ids: Vec<ProfileId> = seated.iter().map(|p| p.profile_id.clone()).collect();
        ids.sort();

        // 2-2 split between the two smallest ids, injected directly so the
        // ballot pattern is exact
        {
            let mut votes = state.votes.write().await;
            for (i, voter) in ids.iter().enumerate() {
                votes.push(Vote {
                    room_id: room.id.clone(),
                    voter_id: voter.clone(),
                    voted_id: ids[i % 2].clone(),
                    round,
                });
            }
        }

        let resolution = state.maybe_resolve_votes(&room.id).await.unwrap();
        let victim = match resolution {
            VoteResolution::CivilianEliminated { profile_id } => profile_id,
            VoteResolution::TraitorEliminated { profile_id } => profile_id,
        };
        assert_eq!(victim, ids[0]);
    }

    #[tokio::test]
    async fn test_quorum_not_reached_no_resolution() {
        let state = AppState::new();
        let (room, _) = room_in_discussion(&state, 4).await;
        let seated = state.room_participants(&room.id).await;

        state
            .cast_vote(&room.id, &seated[0].profile_id, &seated[1].profile_id)
            .await;
        assert!(state.maybe_resolve_votes(&room.id).await.is_none());
        assert!(matches!(
            state.get_room(&room.id).await.unwrap().status,
            RoomStatus::Discussion { .. }
        ));
    }
}
