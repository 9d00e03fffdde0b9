//! Lobby registry: the only state shared between connections
//!
//! This module owns every open lobby on the server, including:
//! - Lobby creation with unique, filtered six-symbol IDs
//! - Membership changes (join, leave, dissolve on admin departure)
//! - Admin-only mutations (settings, deletion, game start)
//! - Capacity limits on the number of open lobbies
//!
//! The registry itself is not synchronized. The server keeps it behind a
//! single lock so that every mutation, and every membership snapshot taken
//! for a broadcast, happens under the same exclusion.

use crate::error::RegistryError;
use log::info;
use pung_shared::identity::MAX_GENERATION_ATTEMPTS;
use pung_shared::{IdentityService, Lobby, LobbySettings};
use std::collections::HashMap;

/// Outcome of removing a session from whatever lobby it belongs to
#[derive(Debug, Clone, PartialEq)]
pub enum Departure {
    /// The session was not a member of any lobby
    NotInLobby,
    /// A regular member left; carries the lobby as it is now
    Left(Lobby),
    /// The admin left and the lobby was removed; carries the members that
    /// still need to be told
    Dissolved(Lobby),
}

/// Manages all open lobbies and their membership
///
/// Lobbies are keyed by their ID. A session belongs to at most one lobby at
/// a time, and admin rights are always derived from the lobby's user list.
pub struct LobbyRegistry {
    /// Open lobbies indexed by lobby ID
    lobbies: HashMap<String, Lobby>,
    /// Validates and generates identifiers
    identity: IdentityService,
    /// Maximum number of concurrently open lobbies
    max_lobbies: usize,
}

impl LobbyRegistry {
    /// Creates an empty registry with the given capacity limit
    pub fn new(identity: IdentityService, max_lobbies: usize) -> Self {
        Self {
            lobbies: HashMap::new(),
            identity,
            max_lobbies,
        }
    }

    /// Registers a lobby under an explicit ID with a single admin member
    ///
    /// Fails with `InvalidIdentifier` if the ID is malformed or already
    /// taken. IDs normally come from [`open_lobby`](Self::open_lobby), so
    /// this only triggers on programming errors.
    pub fn create_lobby(
        &mut self,
        lobby_id: &str,
        admin_username: &str,
        admin_session_id: &str,
    ) -> Result<Lobby, RegistryError> {
        if !self.identity.is_valid_lobby_id(lobby_id) || self.lobbies.contains_key(lobby_id) {
            return Err(RegistryError::InvalidIdentifier(lobby_id.to_string()));
        }
        self.check_member(admin_username, admin_session_id)?;

        // Enforce capacity limits
        if self.lobbies.len() >= self.max_lobbies {
            return Err(RegistryError::Full(self.max_lobbies));
        }

        let lobby = Lobby::new(
            lobby_id.to_string(),
            admin_username.to_string(),
            admin_session_id.to_string(),
        );
        info!("Lobby {} created by {}", lobby_id, admin_username);
        self.lobbies.insert(lobby_id.to_string(), lobby.clone());

        Ok(lobby)
    }

    /// Creates a lobby under a freshly generated ID
    ///
    /// Generated IDs that collide with an open lobby are re-rolled, up to
    /// the same attempt limit the identity service uses for filtering.
    pub fn open_lobby(
        &mut self,
        admin_username: &str,
        admin_session_id: &str,
    ) -> Result<Lobby, RegistryError> {
        for _ in 0..MAX_GENERATION_ATTEMPTS {
            let lobby_id = self.identity.generate_lobby_id()?;
            if !self.lobbies.contains_key(&lobby_id) {
                return self.create_lobby(&lobby_id, admin_username, admin_session_id);
            }
        }

        Err(RegistryError::InvalidIdentifier(
            "no unused lobby id found".to_string(),
        ))
    }

    /// Looks up a lobby by its ID
    pub fn find_lobby(&self, lobby_id: &str) -> Option<&Lobby> {
        self.lobbies.get(lobby_id)
    }

    /// Appends a non-admin member to an existing lobby
    ///
    /// Returns the lobby after the join so the caller can acknowledge the
    /// joiner and notify everyone else from the same snapshot.
    pub fn join_lobby(
        &mut self,
        lobby_id: &str,
        username: &str,
        session_id: &str,
    ) -> Result<Lobby, RegistryError> {
        if !self.lobbies.contains_key(lobby_id) {
            return Err(RegistryError::NotFound(lobby_id.to_string()));
        }
        self.check_member(username, session_id)?;

        let lobby = self
            .lobbies
            .get_mut(lobby_id)
            .ok_or_else(|| RegistryError::NotFound(lobby_id.to_string()))?;
        if lobby.in_game {
            return Err(RegistryError::GameInProgress(lobby_id.to_string()));
        }

        lobby.add_user(username.to_string(), session_id.to_string());
        info!("{} joined lobby {}", username, lobby_id);
        Ok(lobby.clone())
    }

    /// Returns true if the session is the admin of the given lobby
    pub fn is_admin(&self, lobby_id: &str, session_id: &str) -> bool {
        self.lobbies
            .get(lobby_id)
            .map(|lobby| lobby.is_admin(session_id))
            .unwrap_or(false)
    }

    /// Replaces a lobby's settings wholesale
    ///
    /// Authorization is checked before the settings themselves, so a
    /// non-admin never learns whether its proposal would have been valid.
    pub fn change_settings(
        &mut self,
        lobby_id: &str,
        session_id: &str,
        settings: LobbySettings,
    ) -> Result<Lobby, RegistryError> {
        let lobby = self.admin_lobby_mut(lobby_id, session_id)?;
        if !settings.is_valid() {
            return Err(RegistryError::InvalidSettings);
        }

        lobby.settings = settings;
        info!(
            "Lobby {} settings changed to win score {} ({:?})",
            lobby_id, settings.win_score, settings.difficulty
        );
        Ok(lobby.clone())
    }

    /// Removes a lobby at its admin's request
    ///
    /// Returns the removed lobby; its members still need to be notified.
    pub fn delete_lobby(&mut self, lobby_id: &str, session_id: &str) -> Result<Lobby, RegistryError> {
        self.admin_lobby_mut(lobby_id, session_id)?;

        let lobby = self
            .lobbies
            .remove(lobby_id)
            .ok_or_else(|| RegistryError::NotFound(lobby_id.to_string()))?;
        info!("Lobby {} deleted by its admin", lobby_id);
        Ok(lobby)
    }

    /// Marks a lobby as in game
    pub fn start_game(&mut self, lobby_id: &str, session_id: &str) -> Result<Lobby, RegistryError> {
        let lobby = self.admin_lobby_mut(lobby_id, session_id)?;
        if lobby.in_game {
            return Err(RegistryError::GameInProgress(lobby_id.to_string()));
        }

        lobby.in_game = true;
        info!("Lobby {} started its game", lobby_id);
        Ok(lobby.clone())
    }

    /// Finds the lobby a session currently belongs to
    pub fn lobby_of(&self, session_id: &str) -> Option<&Lobby> {
        self.lobbies.values().find(|lobby| lobby.contains(session_id))
    }

    /// Removes a session from its lobby
    ///
    /// An admin leaving dissolves the lobby; the returned lobby then holds
    /// the members left behind. A regular member leaving returns the lobby
    /// as it stands afterwards.
    pub fn leave(&mut self, session_id: &str) -> Departure {
        let lobby_id = match self.lobby_of(session_id) {
            Some(lobby) => lobby.lobby_id.clone(),
            None => return Departure::NotInLobby,
        };

        let Some(mut lobby) = self.lobbies.remove(&lobby_id) else {
            return Departure::NotInLobby;
        };

        let was_admin = lobby.is_admin(session_id);
        let Some(user) = lobby.remove_user(session_id) else {
            self.lobbies.insert(lobby_id, lobby);
            return Departure::NotInLobby;
        };

        if was_admin || lobby.users.is_empty() {
            info!("Lobby {} dissolved after {} left", lobby_id, user.username);
            return Departure::Dissolved(lobby);
        }

        info!("{} left lobby {}", user.username, lobby_id);
        self.lobbies.insert(lobby_id, lobby.clone());
        Departure::Left(lobby)
    }

    /// Returns the number of open lobbies
    pub fn len(&self) -> usize {
        self.lobbies.len()
    }

    /// Returns true if no lobbies are open
    pub fn is_empty(&self) -> bool {
        self.lobbies.is_empty()
    }

    fn check_member(&self, username: &str, session_id: &str) -> Result<(), RegistryError> {
        if !self.identity.username_valid(username) {
            return Err(RegistryError::InvalidUsername(username.to_string()));
        }
        if !self.identity.is_valid_session_id(session_id) {
            return Err(RegistryError::InvalidSessionId);
        }
        if self.lobby_of(session_id).is_some() {
            return Err(RegistryError::AlreadyInLobby);
        }
        Ok(())
    }

    fn admin_lobby_mut(&mut self, lobby_id: &str, session_id: &str) -> Result<&mut Lobby, RegistryError> {
        let lobby = self
            .lobbies
            .get_mut(lobby_id)
            .ok_or_else(|| RegistryError::NotFound(lobby_id.to_string()))?;
        if !lobby.is_admin(session_id) {
            return Err(RegistryError::Unauthorized);
        }
        Ok(lobby)
    }
}

/// Test suite for lobby lifecycle, admin authority, and capacity handling
#[cfg(test)]
mod tests {
    use super::*;
    use pung_shared::Difficulty;
    use tokio_test::{assert_err, assert_ok};

    const ADMIN: &str = "0b8a0c7e-6a3b-4f1e-9d1a-2f3c4d5e6f70";
    const MEMBER: &str = "1c9b1d8f-7b4c-4a2f-8e2b-3a4d5e6f7a81";
    const OTHER: &str = "2dac2e90-8c5d-4b30-9f3c-4b5e6f7a8b92";

    fn registry(max_lobbies: usize) -> LobbyRegistry {
        LobbyRegistry::new(IdentityService::default(), max_lobbies)
    }

    fn hard_five() -> LobbySettings {
        LobbySettings {
            win_score: 5,
            difficulty: Difficulty::Hard,
        }
    }

    #[test]
    fn test_registry_creation() {
        let registry = registry(5);
        assert_eq!(registry.max_lobbies, 5);
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_create_lobby() {
        let mut registry = registry(2);

        let lobby = assert_ok!(registry.create_lobby("ABCDEF", "Ann", ADMIN));
        assert_eq!(lobby.lobby_id, "ABCDEF");
        assert_eq!(lobby.users.len(), 1);
        assert!(lobby.users[0].is_admin);
        assert_eq!(lobby.settings, LobbySettings::default());
        assert_eq!(registry.len(), 1);
        assert!(registry.find_lobby("ABCDEF").is_some());
    }

    #[test]
    fn test_create_lobby_invalid_identifier() {
        let mut registry = registry(2);

        assert!(matches!(
            registry.create_lobby("ABC", "Ann", ADMIN),
            Err(RegistryError::InvalidIdentifier(_))
        ));
        assert!(matches!(
            registry.create_lobby("ABC-EF", "Ann", ADMIN),
            Err(RegistryError::InvalidIdentifier(_))
        ));

        assert_ok!(registry.create_lobby("ABCDEF", "Ann", ADMIN));
        assert!(matches!(
            registry.create_lobby("ABCDEF", "Bob", MEMBER),
            Err(RegistryError::InvalidIdentifier(_))
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_create_lobby_max_capacity() {
        let mut registry = registry(1);

        assert_ok!(registry.open_lobby("Ann", ADMIN));
        assert!(matches!(
            registry.open_lobby("Bob", MEMBER),
            Err(RegistryError::Full(1))
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_open_lobby_generates_valid_id() {
        let mut registry = registry(4);
        let identity = IdentityService::default();

        let lobby = assert_ok!(registry.open_lobby("Ann", ADMIN));
        assert!(identity.is_valid_lobby_id(&lobby.lobby_id));
        assert!(registry.find_lobby(&lobby.lobby_id).is_some());
    }

    #[test]
    fn test_one_lobby_per_session() {
        let mut registry = registry(4);

        let lobby = assert_ok!(registry.open_lobby("Ann", ADMIN));
        assert!(matches!(
            registry.open_lobby("Ann", ADMIN),
            Err(RegistryError::AlreadyInLobby)
        ));
        assert!(matches!(
            registry.join_lobby(&lobby.lobby_id, "Ann", ADMIN),
            Err(RegistryError::AlreadyInLobby)
        ));
    }

    #[test]
    fn test_join_lobby() {
        let mut registry = registry(2);
        assert_ok!(registry.create_lobby("ABCDEF", "Ann", ADMIN));

        let lobby = assert_ok!(registry.join_lobby("ABCDEF", "Bob", MEMBER));
        assert_eq!(lobby.users.len(), 2);
        assert_eq!(lobby.users[1].username, "Bob");
        assert!(!lobby.users[1].is_admin);
        assert_eq!(registry.lobby_of(MEMBER).map(|l| l.lobby_id.as_str()), Some("ABCDEF"));
    }

    #[test]
    fn test_join_unknown_lobby_is_not_found_before_validation() {
        let mut registry = registry(2);

        // Even a too-short username reports the missing lobby first
        assert!(matches!(
            registry.join_lobby("ZZZZZZ", "Bo", MEMBER),
            Err(RegistryError::NotFound(id)) if id == "ZZZZZZ"
        ));
    }

    #[test]
    fn test_join_lobby_validates_member() {
        let mut registry = registry(2);
        assert_ok!(registry.create_lobby("ABCDEF", "Ann", ADMIN));

        assert!(matches!(
            registry.join_lobby("ABCDEF", "Bo", MEMBER),
            Err(RegistryError::InvalidUsername(_))
        ));
        assert!(matches!(
            registry.join_lobby("ABCDEF", "Bob", "not-a-session"),
            Err(RegistryError::InvalidSessionId)
        ));
        assert_eq!(registry.find_lobby("ABCDEF").map(|l| l.users.len()), Some(1));
    }

    #[test]
    fn test_join_lobby_in_game() {
        let mut registry = registry(2);
        assert_ok!(registry.create_lobby("ABCDEF", "Ann", ADMIN));
        assert_ok!(registry.start_game("ABCDEF", ADMIN));

        assert!(matches!(
            registry.join_lobby("ABCDEF", "Bob", MEMBER),
            Err(RegistryError::GameInProgress(_))
        ));
    }

    #[test]
    fn test_is_admin() {
        let mut registry = registry(2);
        assert_ok!(registry.create_lobby("ABCDEF", "Ann", ADMIN));
        assert_ok!(registry.join_lobby("ABCDEF", "Bob", MEMBER));

        assert!(registry.is_admin("ABCDEF", ADMIN));
        assert!(!registry.is_admin("ABCDEF", MEMBER));
        assert!(!registry.is_admin("ABCDEF", OTHER));
        assert!(!registry.is_admin("ZZZZZZ", ADMIN));
    }

    #[test]
    fn test_change_settings_by_admin() {
        let mut registry = registry(2);
        assert_ok!(registry.create_lobby("ABCDEF", "Ann", ADMIN));

        let lobby = assert_ok!(registry.change_settings("ABCDEF", ADMIN, hard_five()));
        assert_eq!(lobby.settings.win_score, 5);
        assert_eq!(lobby.settings.difficulty, Difficulty::Hard);
    }

    #[test]
    fn test_change_settings_rejected_for_non_admin() {
        let mut registry = registry(2);
        assert_ok!(registry.create_lobby("ABCDEF", "Ann", ADMIN));
        assert_ok!(registry.join_lobby("ABCDEF", "Bob", MEMBER));

        assert!(matches!(
            registry.change_settings("ABCDEF", MEMBER, hard_five()),
            Err(RegistryError::Unauthorized)
        ));
        assert_eq!(
            registry.find_lobby("ABCDEF").map(|l| l.settings),
            Some(LobbySettings::default())
        );
    }

    #[test]
    fn test_change_settings_out_of_range() {
        let mut registry = registry(2);
        assert_ok!(registry.create_lobby("ABCDEF", "Ann", ADMIN));

        let settings = LobbySettings {
            win_score: 0,
            difficulty: Difficulty::Easy,
        };
        assert!(matches!(
            registry.change_settings("ABCDEF", ADMIN, settings),
            Err(RegistryError::InvalidSettings)
        ));
    }

    #[test]
    fn test_delete_lobby() {
        let mut registry = registry(2);
        assert_ok!(registry.create_lobby("ABCDEF", "Ann", ADMIN));
        assert_ok!(registry.join_lobby("ABCDEF", "Bob", MEMBER));

        assert_err!(registry.delete_lobby("ABCDEF", MEMBER));
        assert_eq!(registry.len(), 1);

        let removed = assert_ok!(registry.delete_lobby("ABCDEF", ADMIN));
        assert_eq!(removed.users.len(), 2);
        assert!(registry.is_empty());
        assert!(registry.lobby_of(MEMBER).is_none());
    }

    #[test]
    fn test_start_game_twice() {
        let mut registry = registry(2);
        assert_ok!(registry.create_lobby("ABCDEF", "Ann", ADMIN));

        assert!(matches!(
            registry.start_game("ABCDEF", MEMBER),
            Err(RegistryError::Unauthorized)
        ));
        let lobby = assert_ok!(registry.start_game("ABCDEF", ADMIN));
        assert!(lobby.in_game);
        assert!(matches!(
            registry.start_game("ABCDEF", ADMIN),
            Err(RegistryError::GameInProgress(_))
        ));
    }

    #[test]
    fn test_member_leaves() {
        let mut registry = registry(2);
        assert_ok!(registry.create_lobby("ABCDEF", "Ann", ADMIN));
        assert_ok!(registry.join_lobby("ABCDEF", "Bob", MEMBER));

        match registry.leave(MEMBER) {
            Departure::Left(lobby) => {
                assert_eq!(lobby.users.len(), 1);
                assert!(lobby.is_admin(ADMIN));
            }
            other => panic!("Wrong departure type: {:?}", other),
        }
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.leave(MEMBER), Departure::NotInLobby);
    }

    #[test]
    fn test_admin_leaving_dissolves_lobby() {
        let mut registry = registry(2);
        assert_ok!(registry.create_lobby("ABCDEF", "Ann", ADMIN));
        assert_ok!(registry.join_lobby("ABCDEF", "Bob", MEMBER));
        assert_ok!(registry.join_lobby("ABCDEF", "Cid", OTHER));

        match registry.leave(ADMIN) {
            Departure::Dissolved(lobby) => {
                assert_eq!(lobby.lobby_id, "ABCDEF");
                assert_eq!(lobby.session_ids(), vec![MEMBER.to_string(), OTHER.to_string()]);
            }
            other => panic!("Wrong departure type: {:?}", other),
        }
        assert!(registry.is_empty());
        assert!(registry.lobby_of(MEMBER).is_none());
    }
}
