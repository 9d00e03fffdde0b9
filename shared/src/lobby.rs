//! Lobby data model shared by the registry and the client-side snapshot.

use serde::{Deserialize, Serialize};

pub const MIN_WIN_SCORE: u32 = 1;
pub const MAX_WIN_SCORE: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbySettings {
    pub win_score: u32,
    pub difficulty: Difficulty,
}

impl LobbySettings {
    pub fn is_valid(&self) -> bool {
        (MIN_WIN_SCORE..=MAX_WIN_SCORE).contains(&self.win_score)
    }
}

impl Default for LobbySettings {
    fn default() -> Self {
        Self {
            win_score: 8,
            difficulty: Difficulty::Medium,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyUser {
    #[serde(rename = "sessionID")]
    pub session_id: String,
    pub username: String,
    pub is_admin: bool,
}

/// A named group of sessions sharing game settings.
///
/// Admin authority is never stored on the lobby itself; it is derived by
/// scanning `users` for an entry flagged `is_admin`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lobby {
    #[serde(rename = "lobbyID")]
    pub lobby_id: String,
    pub settings: LobbySettings,
    /// Join order
    pub users: Vec<LobbyUser>,
    #[serde(default)]
    pub in_game: bool,
}

impl Lobby {
    /// Creates a lobby whose only member is its admin.
    pub fn new(lobby_id: String, admin_username: String, admin_session_id: String) -> Self {
        Self {
            lobby_id,
            settings: LobbySettings::default(),
            users: vec![LobbyUser {
                session_id: admin_session_id,
                username: admin_username,
                is_admin: true,
            }],
            in_game: false,
        }
    }

    pub fn add_user(&mut self, username: String, session_id: String) {
        self.users.push(LobbyUser {
            session_id,
            username,
            is_admin: false,
        });
    }

    /// Removes a member, returning the removed entry.
    pub fn remove_user(&mut self, session_id: &str) -> Option<LobbyUser> {
        let index = self.users.iter().position(|u| u.session_id == session_id)?;
        Some(self.users.remove(index))
    }

    pub fn is_admin(&self, session_id: &str) -> bool {
        self.users
            .iter()
            .any(|u| u.is_admin && u.session_id == session_id)
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.users.iter().any(|u| u.session_id == session_id)
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.users.iter().map(|u| u.session_id.clone()).collect()
    }
}
