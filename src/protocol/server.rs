use crate::sim::Decoration;
use crate::sim::PlayerCosmetic;
use serde::Deserialize;
use serde::Serialize;
use std::collections::HashMap;

/// Wrap a payload in the wire envelope `{ "type": ..., "payload": ... }`.
pub fn envelope<T: Serialize>(kind: &str, payload: &T) -> String {
    serde_json::json!({ "type": kind, "payload": payload }).to_string()
}

/// One chat line as broadcast, cached, and appended to the durable log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub room_id: String,
    pub player_id: String,
    pub name: String,
    pub text: String,
    pub server_time_ms: i64,
}

/// Per-player slice of a snapshot. Carried for every player in the room,
/// not just the receivers.
#[derive(Debug, Serialize)]
pub struct PlayerView {
    pub id: String,
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub vx: f64,
    pub vz: f64,
    pub yaw: f64,
    pub cosmetic: PlayerCosmetic,
    pub placed_count: u32,
}

#[derive(Debug, Serialize)]
pub struct TreeView {
    pub decorations: Vec<Decoration>,
}

/// Tree state as persisted to the cache and the durable store.
#[derive(Debug, Serialize)]
pub struct PersistedTree {
    pub room_id: String,
    pub decorations: Vec<Decoration>,
}

#[derive(Debug, Serialize)]
pub struct SnapshotPayload {
    pub server_time_ms: i64,
    pub room_id: String,
    pub phase: String,
    pub players: Vec<PlayerView>,
    pub ack: HashMap<String, u64>,
    pub tree: TreeView,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_shape() {
        let json = envelope("chat.cleared", &serde_json::json!({}));
        let value: serde_json::Value = serde_json::from_str(&json).expect("parse");
        assert_eq!(value["type"], "chat.cleared");
        assert!(value["payload"].is_object());
    }

    #[test]
    fn chat_message_round_trips() {
        let msg = ChatMessage {
            id: String::from("abc"),
            room_id: String::from("public"),
            player_id: String::from("p1"),
            name: String::from("游客"),
            text: String::from("hello"),
            server_time_ms: 42,
        };
        let json = serde_json::to_string(&msg).expect("serialize");
        let back: ChatMessage = serde_json::from_str(&json).expect("parse");
        assert_eq!(back.id, msg.id);
        assert_eq!(back.text, msg.text);
        assert_eq!(back.server_time_ms, msg.server_time_ms);
    }
}
