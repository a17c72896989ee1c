use super::AppState;
use crate::protocol::ServerMessage;
use crate::types::*;
use chrono::{DateTime, Utc};

impl AppState {
    /// Register a client as present in its room. Broadcasts the fresh
    /// snapshot and re-runs host failover, since a returning host client
    /// should keep its seat.
    pub async fn mark_online(&self, room_id: &RoomId, profile_id: &ProfileId) {
        // Only seated participants are tracked
        let seated = self
            .room_participants(room_id)
            .await
            .iter()
            .any(|p| p.profile_id == *profile_id);
        if !seated {
            return;
        }

        let now = Utc::now();
        self.presence
            .write()
            .await
            .entry(room_id.clone())
            .or_default()
            .insert(profile_id.clone(), now);
        self.last_seen
            .write()
            .await
            .entry(room_id.clone())
            .or_default()
            .insert(profile_id.clone(), now);

        self.broadcast_presence(room_id).await;
        self.check_host_presence(room_id).await;
    }

    /// Keep-alive: refresh this client's timestamps without a snapshot
    /// broadcast, since membership did not change.
    pub async fn heartbeat(&self, room_id: &RoomId, profile_id: &ProfileId) {
        let now = Utc::now();
        if let Some(room_presence) = self.presence.write().await.get_mut(room_id) {
            if let Some(online_at) = room_presence.get_mut(profile_id) {
                *online_at = now;
            }
        }
        if let Some(room_seen) = self.last_seen.write().await.get_mut(room_id) {
            if let Some(seen_at) = room_seen.get_mut(profile_id) {
                *seen_at = now;
            }
        }
    }

    /// Drop a client from the presence set (socket closed). The durable
    /// participant row stays; the ghost reaper owns its removal if the
    /// client never returns.
    pub async fn mark_offline(&self, room_id: &RoomId, profile_id: &ProfileId) {
        let removed = self
            .presence
            .write()
            .await
            .get_mut(room_id)
            .map(|room_presence| room_presence.remove(profile_id).is_some())
            .unwrap_or(false);

        if removed && self.get_room(room_id).await.is_some() {
            self.broadcast_presence(room_id).await;
            self.check_host_presence(room_id).await;
        }
    }

    /// Currently-present profile ids, sorted for deterministic snapshots
    pub async fn presence_snapshot(&self, room_id: &RoomId) -> Vec<ProfileId> {
        let mut online: Vec<ProfileId> = self
            .presence
            .read()
            .await
            .get(room_id)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        online.sort();
        online
    }

    /// Last confirmed-present timestamp, if the player was ever seen online
    pub async fn last_seen_at(
        &self,
        room_id: &RoomId,
        profile_id: &ProfileId,
    ) -> Option<DateTime<Utc>> {
        self.last_seen
            .read()
            .await
            .get(room_id)
            .and_then(|m| m.get(profile_id))
            .copied()
    }

    pub(super) async fn broadcast_presence(&self, room_id: &RoomId) {
        let online = self.presence_snapshot(room_id).await;
        self.broadcast_room(room_id, ServerMessage::PresenceSnapshot { online })
            .await;
    }

    /// Host failover: if the current host is absent from a non-empty
    /// presence snapshot, promote the oldest-joined *present* participant.
    /// Join timestamps come from the durable participant store; presence
    /// only gates eligibility. Duplicate runs converge on the same host, so
    /// concurrent invocations are harmless.
    pub async fn check_host_presence(&self, room_id: &RoomId) {
        let online = self.presence_snapshot(room_id).await;
        if online.is_empty() {
            return;
        }

        let host_id = match self.get_room(room_id).await {
            Some(room) => room.host_id,
            None => return,
        };
        if let Some(ref host) = host_id {
            if online.contains(host) {
                return;
            }
        }

        let candidates: Vec<Participant> = self
            .room_participants(room_id)
            .await
            .into_iter()
            .filter(|p| online.contains(&p.profile_id))
            .collect();
        if candidates.is_empty() {
            return;
        }

        self.elect_host(room_id, &candidates).await;
    }
}
