use serde::{Deserialize, Serialize};

use crate::models::ChatMessage;

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum GatewayEvent {
    /// Reply to an `authenticate` command
    Authenticated { success: bool },

    /// Reply to `join_room`
    RoomJoined { room_id: i64 },

    /// Reply to `leave_room`
    RoomLeft { room_id: i64 },

    /// Reply to `join_room` for a room the user has not entered
    JoinDenied { room_id: i64 },

    /// A chat, narrator or spell message was stored
    MessageCreated { room_id: i64, message: ChatMessage },

    /// A character entered or left a room
    PresenceUpdate {
        room_id: i64,
        character_id: i64,
        online: bool,
    },

    /// A room's messages were archived or deleted
    RoomCleared { room_id: i64 },
}

impl GatewayEvent {
    /// Returns the room id if this event is scoped to a room.
    /// Events that return `None` are replies addressed to a single connection.
    pub fn room_id(&self) -> Option<i64> {
        match self {
            Self::MessageCreated { room_id, .. }
            | Self::PresenceUpdate { room_id, .. }
            | Self::RoomCleared { room_id } => Some(*room_id),
            _ => None,
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum GatewayCommand {
    /// The token was already checked at upgrade time; this is acknowledged only.
    Authenticate,

    /// Start receiving events for a room
    JoinRoom { room_id: i64 },

    /// Stop receiving events for a room
    LeaveRoom { room_id: i64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_use_snake_case_tags_and_camel_case_fields() {
        let cmd: GatewayCommand = serde_json::from_str(r#"{"type":"join_room","roomId":4}"#).unwrap();
        assert_eq!(cmd, GatewayCommand::JoinRoom { room_id: 4 });

        let cmd: GatewayCommand =
            serde_json::from_str(r#"{"type":"authenticate","token":"ignored"}"#).unwrap();
        assert_eq!(cmd, GatewayCommand::Authenticate);
    }

    #[test]
    fn acknowledgements_serialize_flat() {
        let json = serde_json::to_value(GatewayEvent::Authenticated { success: true }).unwrap();
        assert_eq!(json, serde_json::json!({"type": "authenticated", "success": true}));

        let json = serde_json::to_value(GatewayEvent::RoomJoined { room_id: 9 }).unwrap();
        assert_eq!(json, serde_json::json!({"type": "room_joined", "roomId": 9}));
        assert_eq!(GatewayEvent::RoomJoined { room_id: 9 }.room_id(), None);
        assert_eq!(GatewayEvent::RoomCleared { room_id: 9 }.room_id(), Some(9));
    }
}
