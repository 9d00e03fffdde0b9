//! Typed `data` payloads for every action in the catalogue.

use crate::lobby::{LobbySettings, LobbyUser};
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Client clock reading sent with a handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClientTimestamp {
    Millis(i64),
    Iso(String),
}

impl ClientTimestamp {
    /// Milliseconds since the unix epoch, or `None` for an unparseable date.
    pub fn to_millis(&self) -> Option<i64> {
        match self {
            ClientTimestamp::Millis(ms) => Some(*ms),
            ClientTimestamp::Iso(text) => DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|dt| dt.timestamp_millis()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandshakeData {
    pub username: String,
    pub timestamp: ClientTimestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AckHandshakeData {
    #[serde(rename = "finalUsername")]
    pub final_username: String,
    #[serde(rename = "sessionID")]
    pub session_id: String,
    pub nonce: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenyHandshakeData {
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogoffData {
    #[serde(rename = "sessionID")]
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingData {
    pub timestamp: i64,
}

/// `internalLatency` is filled in by the connection right before sending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PongData {
    pub client_timestamp: i64,
    pub server_timestamp: i64,
    pub latency: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_latency: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateLobbyData {
    pub username: String,
    #[serde(rename = "sessionID")]
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinLobbyData {
    pub username: String,
    #[serde(rename = "sessionID")]
    pub session_id: String,
    #[serde(rename = "lobbyID")]
    pub lobby_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LobbyNotFoundData {
    #[serde(rename = "lobbyID")]
    pub lobby_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AckJoinLobbyData {
    #[serde(rename = "lobbyID")]
    pub lobby_id: String,
    #[serde(rename = "initialSettings")]
    pub initial_settings: LobbySettings,
    pub users: Vec<LobbyUser>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeLobbySettingsData {
    #[serde(rename = "sessionID")]
    pub session_id: String,
    pub settings: LobbySettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastLobbyUpdateData {
    #[serde(rename = "lobbyID")]
    pub lobby_id: String,
    pub settings: LobbySettings,
    pub users: Vec<LobbyUser>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteLobbyData {
    #[serde(rename = "sessionID")]
    pub session_id: String,
    #[serde(rename = "lobbyID")]
    pub lobby_id: String,
}

/// Why a member was dropped from a lobby.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RemovalReason {
    AdminLeft,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AckRemovedFromLobbyData {
    #[serde(rename = "lobbyID")]
    pub lobby_id: String,
    pub reason: RemovalReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartGameData {
    #[serde(rename = "sessionID")]
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameStartedData {
    #[serde(rename = "lobbyID")]
    pub lobby_id: String,
}

// Envelope for the game simulation; the shape of players and ball is owned by
// whatever produces the updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameUpdateData {
    #[serde(rename = "lobbyID")]
    pub lobby_id: String,
    #[serde(default)]
    pub players: Vec<Value>,
    #[serde(default)]
    pub ball: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lobby::Difficulty;
    use serde_json::json;

    #[test]
    fn test_client_timestamp_forms() {
        let iso: ClientTimestamp = serde_json::from_value(json!("2024-03-01T12:00:00Z")).unwrap();
        assert_eq!(iso.to_millis(), Some(1_709_294_400_000));

        let millis: ClientTimestamp = serde_json::from_value(json!(1_709_294_400_000i64)).unwrap();
        assert_eq!(millis.to_millis(), Some(1_709_294_400_000));

        let garbage = ClientTimestamp::Iso("yesterday".to_string());
        assert_eq!(garbage.to_millis(), None);
    }

    #[test]
    fn test_wire_field_names() {
        let ack = AckHandshakeData {
            final_username: "Ann".to_string(),
            session_id: "id".to_string(),
            nonce: 7,
        };
        let value = serde_json::to_value(&ack).unwrap();
        assert_eq!(value, json!({"finalUsername": "Ann", "sessionID": "id", "nonce": 7}));

        let change: ChangeLobbySettingsData = serde_json::from_value(json!({
            "sessionID": "id",
            "settings": {"winScore": 5, "difficulty": "hard"}
        }))
        .unwrap();
        assert_eq!(change.settings.win_score, 5);
        assert_eq!(change.settings.difficulty, Difficulty::Hard);
    }

    #[test]
    fn test_removal_reason_tag() {
        let data = AckRemovedFromLobbyData {
            lobby_id: "ABCDEF".to_string(),
            reason: RemovalReason::AdminLeft,
        };
        let value = serde_json::to_value(&data).unwrap();
        assert_eq!(value["reason"], "adminLeft");
        assert_eq!(value["lobbyID"], "ABCDEF");
    }

    #[test]
    fn test_pong_omits_unknown_internal_latency() {
        let pong = PongData {
            client_timestamp: 1,
            server_timestamp: 2,
            latency: 1,
            internal_latency: None,
        };
        let value = serde_json::to_value(&pong).unwrap();
        assert!(value.get("internalLatency").is_none());
        assert_eq!(value["clientTimestamp"], 1);
    }
}
