//! Background sweeps that drive time-based coordination: the hint deadline
//! watcher and the ghost-player reaper. Both are periodic polls over all
//! rooms, decoupled from the event-driven presence handler since presence
//! events fire once on change and cannot express "still absent".

use crate::state::AppState;
use crate::types::{RoomId, RoomStatus};
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;

/// How often the hint deadline sweep runs
const DEADLINE_SWEEP_MILLIS: u64 = 1000;

/// How often the ghost reaper sweeps
pub const REAP_INTERVAL_SECS: u64 = 5;

/// How long a participant may be absent from presence before being reaped
pub const REAP_GRACE_SECS: i64 = 10;

/// Spawn a background task that advances rooms whose hint deadline elapsed,
/// synthesizing placeholder hints for players who never submitted.
pub fn spawn_hint_deadline_watcher(state: Arc<AppState>) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_millis(DEADLINE_SWEEP_MILLIS)).await;
            sweep_hint_deadlines(&state).await;
        }
    });
}

/// One pass of the hint deadline sweep
pub async fn sweep_hint_deadlines(state: &AppState) {
    let now = Utc::now();
    let expired: Vec<RoomId> = {
        let rooms = state.rooms.read().await;
        rooms
            .values()
            .filter(|room| match room.status {
                RoomStatus::HintDrop { started_at } => {
                    let deadline =
                        started_at + ChronoDuration::seconds(room.settings.hint_seconds as i64);
                    now >= deadline
                }
                _ => false,
            })
            .map(|room| room.id.clone())
            .collect()
    };

    for room_id in expired {
        let synthesized = state.fill_missing_hints(&room_id).await;
        if synthesized > 0 {
            tracing::info!(
                "Room {}: hint deadline elapsed, synthesized {} placeholder hints",
                room_id,
                synthesized
            );
        }
        state.maybe_finish_hint_drop(&room_id).await;
    }
}

/// Spawn the ghost-player reaper: a periodic sweep removing participants
/// whose client vanished without a clean leave.
pub fn spawn_ghost_reaper(state: Arc<AppState>) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(REAP_INTERVAL_SECS)).await;
            reap_ghosts(&state).await;
        }
    });
}

/// One pass of the reaper. A participant is a ghost when they are absent
/// from the current presence snapshot and their last confirmed-present
/// timestamp is both set and older than the grace period. A player never
/// yet seen online is not reaped: a just-joined client may still be
/// connecting.
pub async fn reap_ghosts(state: &AppState) {
    let now = Utc::now();
    let room_ids: Vec<RoomId> = state.rooms.read().await.keys().cloned().collect();

    for room_id in room_ids {
        let online = state.presence_snapshot(&room_id).await;
        let seated = state.room_participants(&room_id).await;

        for participant in seated {
            if online.contains(&participant.profile_id) {
                continue;
            }
            let Some(seen_at) = state.last_seen_at(&room_id, &participant.profile_id).await
            else {
                continue;
            };
            if now - seen_at <= ChronoDuration::seconds(REAP_GRACE_SECS) {
                continue;
            }

            tracing::info!(
                "Room {}: reaping ghost participant {} (last seen {})",
                room_id,
                participant.profile_id,
                seen_at
            );
            if let Err(e) = state.leave_room(&room_id, &participant.profile_id).await {
                tracing::warn!(
                    "Room {}: failed to reap {}: {}",
                    room_id,
                    participant.profile_id,
                    e
                );
            }
        }
    }
}
