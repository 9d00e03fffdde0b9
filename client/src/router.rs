//! Client-side session router
//!
//! Tracks the client's view of its session and lobby, turns server actions
//! into [`ClientEvent`]s for the UI, and turns UI intents into actions only
//! when the current phase allows them.

use crate::error::ClientError;
use log::{debug, warn};
use pung_shared::payload::{
    AckHandshakeData, AckJoinLobbyData, AckRemovedFromLobbyData, BroadcastLobbyUpdateData,
    ChangeLobbySettingsData, ClientTimestamp, CreateLobbyData, DeleteLobbyData, DenyHandshakeData,
    GameStartedData, GameUpdateData, HandshakeData, JoinLobbyData, LobbyNotFoundData, LogoffData,
    PingData, PongData, RemovalReason, StartGameData,
};
use pung_shared::{
    Action, ActionType, ErrorCode, IdentityService, InboundAction, Lobby, LobbySettings,
    TransferAction,
};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientPhase {
    Unauthenticated,
    Authenticated,
    InLobby,
    InGame,
}

/// What the UI gets told
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Authenticated {
        username: String,
        session_id: String,
    },
    HandshakeDenied {
        reason: String,
    },
    Latency {
        /// Measured locally from the echoed client timestamp
        round_trip_ms: i64,
        /// One-way estimate computed by the server
        server_latency_ms: i64,
        /// Server time between its last inbound frame and the pong
        internal_latency_ms: Option<i64>,
    },
    JoinedLobby(Lobby),
    LobbyNotFound {
        lobby_id: String,
    },
    LobbyUpdated(Lobby),
    RemovedFromLobby {
        lobby_id: String,
        reason: RemovalReason,
    },
    GameStarted {
        lobby_id: String,
    },
    GameUpdate(GameUpdateData),
    ServerError {
        code: ErrorCode,
        message: Option<String>,
        response_to: Option<String>,
    },
    /// A command was refused locally and nothing was sent
    Rejected {
        reason: String,
    },
    Disconnected {
        code: Option<u16>,
        reason: String,
    },
}

/// What the UI asks for
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCommand {
    CreateLobby,
    JoinLobby(String),
    ChangeSettings(LobbySettings),
    DeleteLobby,
    StartGame,
    Ping,
    Logoff,
    Quit,
}

pub struct ClientRouter {
    identity: IdentityService,
    username: String,
    session_id: Option<String>,
    lobby: Option<Lobby>,
}

impl ClientRouter {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            identity: IdentityService::default(),
            username: username.into(),
            session_id: None,
            lobby: None,
        }
    }

    pub fn phase(&self) -> ClientPhase {
        match (&self.session_id, &self.lobby) {
            (None, _) => ClientPhase::Unauthenticated,
            (Some(_), None) => ClientPhase::Authenticated,
            (Some(_), Some(lobby)) if lobby.in_game => ClientPhase::InGame,
            (Some(_), Some(_)) => ClientPhase::InLobby,
        }
    }

    /// Username as confirmed by the server once authenticated.
    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn lobby(&self) -> Option<&Lobby> {
        self.lobby.as_ref()
    }

    pub fn is_admin(&self) -> bool {
        match (&self.lobby, &self.session_id) {
            (Some(lobby), Some(session_id)) => lobby.is_admin(session_id),
            _ => false,
        }
    }

    /// The opening handshake. `timestamp` is the local clock as RFC 3339.
    pub fn handshake(&self, timestamp: String) -> Result<Action, ClientError> {
        self.require(ActionType::Handshake, &[ClientPhase::Unauthenticated])?;
        if !self.identity.username_valid(&self.username) {
            return Err(ClientError::InvalidUsername(self.username.clone()));
        }

        build(
            ActionType::Handshake,
            &HandshakeData {
                username: self.username.clone(),
                timestamp: ClientTimestamp::Iso(timestamp),
            },
        )
    }

    /// Builds the action for a UI intent. `Quit` has no action of its own.
    pub fn command(&mut self, command: ClientCommand, now: i64) -> Result<Option<Action>, ClientError> {
        let action = match command {
            ClientCommand::Ping => build(ActionType::Ping, &PingData { timestamp: now })?,
            ClientCommand::CreateLobby => {
                let session_id = self.require(ActionType::CreateLobby, &[ClientPhase::Authenticated])?;
                build(
                    ActionType::CreateLobby,
                    &CreateLobbyData {
                        username: self.username.clone(),
                        session_id,
                    },
                )?
            }
            ClientCommand::JoinLobby(code) => {
                let session_id = self.require(ActionType::JoinLobby, &[ClientPhase::Authenticated])?;
                let lobby_id = self.identity.normalize_lobby_id(&code);
                if !self.identity.is_valid_lobby_id(&lobby_id) {
                    return Err(ClientError::InvalidLobbyId(code));
                }
                build(
                    ActionType::JoinLobby,
                    &JoinLobbyData {
                        username: self.username.clone(),
                        session_id,
                        lobby_id,
                    },
                )?
            }
            ClientCommand::ChangeSettings(settings) => {
                let session_id = self.require_admin(ActionType::ChangeLobbySettings, "change settings")?;
                if !settings.is_valid() {
                    return Err(ClientError::InvalidSettings);
                }
                build(
                    ActionType::ChangeLobbySettings,
                    &ChangeLobbySettingsData {
                        session_id,
                        settings,
                    },
                )?
            }
            ClientCommand::DeleteLobby => {
                let session_id = self.require_admin(ActionType::DeleteLobby, "delete the lobby")?;
                let lobby_id = self
                    .lobby
                    .as_ref()
                    .map(|l| l.lobby_id.clone())
                    .unwrap_or_default();
                build(
                    ActionType::DeleteLobby,
                    &DeleteLobbyData {
                        session_id,
                        lobby_id,
                    },
                )?
            }
            ClientCommand::StartGame => {
                let session_id = self.require_admin(ActionType::StartGame, "start the game")?;
                build(ActionType::StartGame, &StartGameData { session_id })?
            }
            ClientCommand::Logoff => {
                let session_id = self.require(
                    ActionType::Logoff,
                    &[ClientPhase::Authenticated, ClientPhase::InLobby, ClientPhase::InGame],
                )?;
                let action = build(ActionType::Logoff, &LogoffData { session_id })?;
                self.session_id = None;
                self.lobby = None;
                action
            }
            ClientCommand::Quit => return Ok(None),
        };

        Ok(Some(action))
    }

    /// Applies a server action. Returns the event to show, if any.
    ///
    /// An `Err` means the action itself was at fault and should be reported
    /// back to the server.
    pub fn handle(&mut self, inbound: InboundAction, now: i64) -> Result<Option<ClientEvent>, ClientError> {
        let action = match inbound {
            InboundAction::Action(action) => action,
            InboundAction::Error(error) => {
                warn!("Server error {} ({})", error.code, error.name);
                return Ok(Some(ClientEvent::ServerError {
                    code: error.error_code(),
                    message: error.message,
                    response_to: error.response_to,
                }));
            }
        };

        let kind = action
            .action_type()
            .map_err(|e| ClientError::Unsupported(e.0))?;
        debug!("Received '{}' from server", kind);

        let event = match kind {
            ActionType::AckHandshake => {
                let data: AckHandshakeData = action.payload()?;
                self.username = data.final_username.clone();
                self.session_id = Some(data.session_id.clone());
                ClientEvent::Authenticated {
                    username: data.final_username,
                    session_id: data.session_id,
                }
            }
            ActionType::DenyHandshake => {
                let data: DenyHandshakeData = action.payload()?;
                ClientEvent::HandshakeDenied { reason: data.reason }
            }
            ActionType::Pong => {
                let data: PongData = action.payload()?;
                ClientEvent::Latency {
                    round_trip_ms: now.saturating_sub(data.client_timestamp),
                    server_latency_ms: data.latency,
                    internal_latency_ms: data.internal_latency,
                }
            }
            ActionType::AckJoinLobby => {
                let data: AckJoinLobbyData = action.payload()?;
                let lobby = Lobby {
                    lobby_id: data.lobby_id,
                    settings: data.initial_settings,
                    users: data.users,
                    in_game: false,
                };
                self.lobby = Some(lobby.clone());
                ClientEvent::JoinedLobby(lobby)
            }
            ActionType::LobbyNotFound => {
                let data: LobbyNotFoundData = action.payload()?;
                ClientEvent::LobbyNotFound {
                    lobby_id: data.lobby_id,
                }
            }
            ActionType::BroadcastLobbyUpdate => {
                let data: BroadcastLobbyUpdateData = action.payload()?;
                match self.lobby.as_mut() {
                    Some(lobby) if lobby.lobby_id == data.lobby_id => {
                        lobby.settings = data.settings;
                        lobby.users = data.users;
                        ClientEvent::LobbyUpdated(lobby.clone())
                    }
                    _ => return Ok(self.stale(&action)),
                }
            }
            ActionType::AckRemovedFromLobby => {
                let data: AckRemovedFromLobbyData = action.payload()?;
                if self.lobby.as_ref().map(|l| &l.lobby_id) != Some(&data.lobby_id) {
                    return Ok(self.stale(&action));
                }
                self.lobby = None;
                ClientEvent::RemovedFromLobby {
                    lobby_id: data.lobby_id,
                    reason: data.reason,
                }
            }
            ActionType::BroadcastGameStarted => {
                let data: GameStartedData = action.payload()?;
                match self.lobby.as_mut() {
                    Some(lobby) if lobby.lobby_id == data.lobby_id => {
                        lobby.in_game = true;
                        ClientEvent::GameStarted {
                            lobby_id: data.lobby_id,
                        }
                    }
                    _ => return Ok(self.stale(&action)),
                }
            }
            ActionType::BroadcastGameUpdate => ClientEvent::GameUpdate(action.payload()?),
            other => return Err(ClientError::Unsupported(other.as_str().to_string())),
        };

        Ok(Some(event))
    }

    fn stale(&self, action: &TransferAction) -> Option<ClientEvent> {
        debug!("Ignoring '{}' for a lobby this client is not in", action.kind);
        None
    }

    fn require(&self, kind: ActionType, allowed: &[ClientPhase]) -> Result<String, ClientError> {
        let phase = self.phase();
        if !allowed.contains(&phase) {
            return Err(ClientError::NotAllowed {
                action: kind.as_str(),
                phase,
            });
        }
        Ok(self.session_id.clone().unwrap_or_default())
    }

    fn require_admin(&self, kind: ActionType, what: &'static str) -> Result<String, ClientError> {
        let session_id = self.require(kind, &[ClientPhase::InLobby])?;
        if !self.is_admin() {
            return Err(ClientError::NotAdmin(what));
        }
        Ok(session_id)
    }
}

fn build<T: Serialize>(kind: ActionType, payload: &T) -> Result<Action, ClientError> {
    Ok(Action::new(kind, payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pung_shared::Difficulty;
    use serde_json::{json, Value};
    use tokio_test::{assert_err, assert_ok};

    const SESSION: &str = "0b8a0c7e-6a3b-4f1e-9d1a-2f3c4d5e6f70";
    const OTHER: &str = "1c9b1d8f-7b4c-4a2f-8e2b-3a4d5e6f7a81";

    fn inbound(value: Value) -> InboundAction {
        InboundAction::Action(serde_json::from_value(value).unwrap())
    }

    fn authenticated() -> ClientRouter {
        let mut router = ClientRouter::new("Ann");
        let event = router
            .handle(
                inbound(json!({
                    "type": "ackHandshake",
                    "data": {"finalUsername": "Ann", "sessionID": SESSION, "nonce": 7}
                })),
                0,
            )
            .unwrap();
        assert!(matches!(event, Some(ClientEvent::Authenticated { .. })));
        router
    }

    fn in_lobby(admin: &str) -> ClientRouter {
        let mut users = vec![json!({"sessionID": admin, "username": "Boss", "isAdmin": true})];
        if admin != SESSION {
            users.push(json!({"sessionID": SESSION, "username": "Ann", "isAdmin": false}));
        }

        let mut router = authenticated();
        router
            .handle(
                inbound(json!({
                    "type": "ackJoinLobby",
                    "data": {
                        "lobbyID": "ABCDEF",
                        "initialSettings": {"winScore": 8, "difficulty": "medium"},
                        "users": users
                    }
                })),
                0,
            )
            .unwrap();
        router
    }

    #[test]
    fn test_handshake_only_when_unauthenticated() {
        let router = ClientRouter::new("Ann");
        let action = assert_ok!(router.handshake("2024-01-01T00:00:00Z".to_string()));
        assert_eq!(action.kind, ActionType::Handshake);
        assert_eq!(action.data["username"], "Ann");

        let router = authenticated();
        assert!(matches!(
            router.handshake("2024-01-01T00:00:00Z".to_string()),
            Err(ClientError::NotAllowed { .. })
        ));
    }

    #[test]
    fn test_handshake_rejects_bad_username_locally() {
        let router = ClientRouter::new("no spaces allowed");
        assert!(matches!(
            router.handshake("2024-01-01T00:00:00Z".to_string()),
            Err(ClientError::InvalidUsername(_))
        ));
    }

    #[test]
    fn test_ack_handshake_authenticates() {
        let router = authenticated();
        assert_eq!(router.phase(), ClientPhase::Authenticated);
        assert_eq!(router.session_id(), Some(SESSION));
    }

    #[test]
    fn test_commands_gated_by_phase() {
        let mut router = ClientRouter::new("Ann");
        assert!(matches!(
            router.command(ClientCommand::CreateLobby, 0),
            Err(ClientError::NotAllowed { phase: ClientPhase::Unauthenticated, .. })
        ));
        assert_err!(router.command(ClientCommand::Logoff, 0));

        // Pings are always allowed
        let ping = assert_ok!(router.command(ClientCommand::Ping, 42)).unwrap();
        assert_eq!(ping.data["timestamp"], 42);
    }

    #[test]
    fn test_create_and_join_carry_session() {
        let mut router = authenticated();

        let create = assert_ok!(router.command(ClientCommand::CreateLobby, 0)).unwrap();
        assert_eq!(create.kind, ActionType::CreateLobby);
        assert_eq!(create.data["sessionID"], SESSION);

        let join = assert_ok!(router.command(ClientCommand::JoinLobby(" abcdef ".into()), 0)).unwrap();
        assert_eq!(join.data["lobbyID"], "ABCDEF");

        assert!(matches!(
            router.command(ClientCommand::JoinLobby("nope".into()), 0),
            Err(ClientError::InvalidLobbyId(_))
        ));
    }

    #[test]
    fn test_admin_commands() {
        let mut router = in_lobby(SESSION);
        assert_eq!(router.phase(), ClientPhase::InLobby);
        assert!(router.is_admin());

        let settings = LobbySettings {
            win_score: 5,
            difficulty: Difficulty::Hard,
        };
        let change = assert_ok!(router.command(ClientCommand::ChangeSettings(settings), 0)).unwrap();
        assert_eq!(change.data["settings"]["winScore"], 5);

        let delete = assert_ok!(router.command(ClientCommand::DeleteLobby, 0)).unwrap();
        assert_eq!(delete.data["lobbyID"], "ABCDEF");

        let out_of_range = LobbySettings {
            win_score: 99,
            difficulty: Difficulty::Easy,
        };
        assert!(matches!(
            router.command(ClientCommand::ChangeSettings(out_of_range), 0),
            Err(ClientError::InvalidSettings)
        ));
    }

    #[test]
    fn test_member_cannot_use_admin_commands() {
        let mut router = in_lobby(OTHER);
        assert!(!router.is_admin());
        assert!(matches!(
            router.command(ClientCommand::StartGame, 0),
            Err(ClientError::NotAdmin(_))
        ));
        assert!(matches!(
            router.command(ClientCommand::CreateLobby, 0),
            Err(ClientError::NotAllowed { phase: ClientPhase::InLobby, .. })
        ));
    }

    #[test]
    fn test_lobby_update_and_removal() {
        let mut router = in_lobby(OTHER);

        let event = router
            .handle(
                inbound(json!({
                    "type": "broadcastLobbyUpdate",
                    "data": {
                        "lobbyID": "ABCDEF",
                        "settings": {"winScore": 5, "difficulty": "hard"},
                        "users": [{"sessionID": OTHER, "username": "Boss", "isAdmin": true}]
                    }
                })),
                0,
            )
            .unwrap();
        match event {
            Some(ClientEvent::LobbyUpdated(lobby)) => assert_eq!(lobby.settings.win_score, 5),
            other => panic!("Wrong event type: {:?}", other),
        }

        // Updates for other lobbies are ignored
        let stale = router
            .handle(
                inbound(json!({
                    "type": "ackRemovedFromLobby",
                    "data": {"lobbyID": "QQQQQQ", "reason": "adminLeft"}
                })),
                0,
            )
            .unwrap();
        assert!(stale.is_none());
        assert_eq!(router.phase(), ClientPhase::InLobby);

        let removed = router
            .handle(
                inbound(json!({
                    "type": "ackRemovedFromLobby",
                    "data": {"lobbyID": "ABCDEF", "reason": "adminLeft"}
                })),
                0,
            )
            .unwrap();
        assert_eq!(
            removed,
            Some(ClientEvent::RemovedFromLobby {
                lobby_id: "ABCDEF".into(),
                reason: RemovalReason::AdminLeft
            })
        );
        assert_eq!(router.phase(), ClientPhase::Authenticated);
    }

    #[test]
    fn test_game_started_moves_to_in_game() {
        let mut router = in_lobby(SESSION);
        let event = router
            .handle(
                inbound(json!({"type": "broadcastGameStarted", "data": {"lobbyID": "ABCDEF"}})),
                0,
            )
            .unwrap();
        assert!(matches!(event, Some(ClientEvent::GameStarted { .. })));
        assert_eq!(router.phase(), ClientPhase::InGame);
    }

    #[test]
    fn test_pong_reports_latency() {
        let mut router = ClientRouter::new("Ann");
        let event = router
            .handle(
                inbound(json!({
                    "type": "pong",
                    "data": {"clientTimestamp": 1000, "serverTimestamp": 1020, "latency": 20, "internalLatency": 3}
                })),
                1050,
            )
            .unwrap();
        assert_eq!(
            event,
            Some(ClientEvent::Latency {
                round_trip_ms: 50,
                server_latency_ms: 20,
                internal_latency_ms: Some(3),
            })
        );
    }

    #[test]
    fn test_server_bound_action_is_unsupported() {
        let mut router = authenticated();
        let result = router.handle(
            inbound(json!({"type": "createLobby", "data": {"username": "Ann", "sessionID": SESSION}})),
            0,
        );
        let error = assert_err!(result);
        assert_eq!(error.error_code(), ErrorCode::UnsupportedAction);

        let result = router.handle(inbound(json!({"type": "ackJoinLobby", "data": {"lobbyID": 3}})), 0);
        let error = assert_err!(result);
        assert_eq!(error.error_code(), ErrorCode::InvalidActionData);
    }

    #[test]
    fn test_logoff_resets_locally() {
        let mut router = in_lobby(SESSION);
        let logoff = assert_ok!(router.command(ClientCommand::Logoff, 0)).unwrap();
        assert_eq!(logoff.data["sessionID"], SESSION);
        assert_eq!(router.phase(), ClientPhase::Unauthenticated);
    }

    #[test]
    fn test_error_action_becomes_event() {
        let mut router = authenticated();
        let error = InboundAction::Error(pung_shared::ErrorAction::new(
            ErrorCode::Unauthorized,
            Some("not the admin".into()),
            Some("startGame".into()),
        ));
        let event = router.handle(error, 0).unwrap();
        assert_eq!(
            event,
            Some(ClientEvent::ServerError {
                code: ErrorCode::Unauthorized,
                message: Some("not the admin".into()),
                response_to: Some("startGame".into()),
            })
        );
    }
}
