use super::AppState;
use crate::protocol::ServerMessage;
use crate::types::*;
use chrono::Utc;

impl AppState {
    /// Append a discussion message and broadcast it. Chat is open to alive
    /// participants during discussion only.
    pub async fn send_chat(
        &self,
        room_id: &RoomId,
        profile_id: &ProfileId,
        text: String,
    ) -> Result<ChatMessage, String> {
        let text = text.trim().to_string();
        if text.is_empty() {
            return Err("Message is empty".to_string());
        }

        let room = self
            .get_room(room_id)
            .await
            .ok_or_else(|| "Room not found".to_string())?;
        if !matches!(room.status, RoomStatus::Discussion { .. }) {
            return Err("Chat is only open during discussion".to_string());
        }

        let alive = self
            .room_participants(room_id)
            .await
            .iter()
            .any(|p| p.profile_id == *profile_id && p.is_alive);
        if !alive {
            return Err("Spectators cannot chat".to_string());
        }

        let message = ChatMessage {
            id: ulid::Ulid::new().to_string(),
            room_id: room_id.clone(),
            profile_id: profile_id.clone(),
            text,
            sent_at: Utc::now(),
        };

        self.messages.write().await.push(message.clone());
        self.broadcast_room(
            room_id,
            ServerMessage::Chat {
                message: message.clone(),
            },
        )
        .await;

        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_chat_requires_discussion_phase() {
        let state = AppState::new();
        let (room, host) = state.create_room("A".to_string(), None).await;

        let result = state.send_chat(&room.id, &host.id, "hello".to_string()).await;
        assert!(result.unwrap_err().contains("discussion"));
    }

    #[tokio::test]
    async fn test_chat_appends_in_order() {
        let state = AppState::new();
        let (room, host) = state.create_room("A".to_string(), None).await;
        state.join_room(&room.code, "B".to_string()).await.unwrap();
        state.start_round(&room.id, &host.id).await.unwrap();
        state.advance_to_hints(&room.id, &host.id).await.unwrap();
        for p in state.room_participants(&room.id).await {
            state
                .submit_hint(&room.id, &p.profile_id, "hint".to_string())
                .await;
        }

        state
            .send_chat(&room.id, &host.id, "first".to_string())
            .await
            .unwrap();
        state
            .send_chat(&room.id, &host.id, "second".to_string())
            .await
            .unwrap();

        let messages = state.messages.read().await;
        let texts: Vec<_> = messages
            .iter()
            .filter(|m| m.room_id == room.id)
            .map(|m| m.text.as_str())
            .collect();
        assert_eq!(texts, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_blank_chat_rejected() {
        let state = AppState::new();
        let (room, host) = state.create_room("A".to_string(), None).await;
        let result = state.send_chat(&room.id, &host.id, "   ".to_string()).await;
        assert!(result.is_err());
    }
}
