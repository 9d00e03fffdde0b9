//! Server-side session router
//!
//! One router exists per connection. It receives validated actions from the
//! connection, checks them against the session's phase, and delegates lobby
//! work to the shared registry:
//!
//! ```text
//! Unauthenticated --handshake--> Authenticated --create/join--> InLobby --startGame--> InGame
//!        ^                              |                          |
//!        +-----------logoff-------------+--------------------------+
//! ```
//!
//! Only the authentication step is stored here. Lobby membership and game
//! state are always read from the registry so that a lobby dissolved by
//! another connection is reflected immediately.
//!
//! Lock order is registry first, then sessions. Broadcasts happen while the
//! registry lock is held so that every member sees the same membership.

use crate::error::RegistryError;
use crate::network::ServerState;
use crate::registry::Departure;
use crate::sessions::{SessionEntry, SessionTable};
use log::{debug, info, warn};
use pung_shared::action::UnknownActionType;
use pung_shared::identity::DEFAULT_REPLACEMENT;
use pung_shared::payload::{
    AckHandshakeData, AckJoinLobbyData, AckRemovedFromLobbyData, BroadcastLobbyUpdateData,
    ChangeLobbySettingsData, CreateLobbyData, DeleteLobbyData, DenyHandshakeData, GameStartedData,
    HandshakeData, JoinLobbyData, LobbyNotFoundData, LogoffData, PingData, PongData, RemovalReason,
    StartGameData,
};
use pung_shared::utils::{clock_drift, get_timestamp};
use pung_shared::{
    Action, ActionType, CloseCode, Connection, ErrorCode, InboundAction, Lobby, TransferAction,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;

/// Where a connection stands, as far as the server is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterPhase {
    Unauthenticated,
    Authenticated,
    InLobby,
    InGame,
}

/// Payloads that name the session they act for
trait SessionBound {
    fn session_id(&self) -> &str;
}

macro_rules! session_bound {
    ($($payload:ty),* $(,)?) => {
        $(impl SessionBound for $payload {
            fn session_id(&self) -> &str {
                &self.session_id
            }
        })*
    };
}

session_bound!(
    LogoffData,
    CreateLobbyData,
    JoinLobbyData,
    ChangeLobbySettingsData,
    DeleteLobbyData,
    StartGameData,
);

#[derive(Debug, Clone)]
struct Session {
    id: String,
    username: String,
}

pub struct ServerRouter {
    state: Arc<ServerState>,
    connection: Connection,
    addr: SocketAddr,
    session: Option<Session>,
}

impl ServerRouter {
    pub fn new(state: Arc<ServerState>, connection: Connection, addr: SocketAddr) -> Self {
        Self {
            state,
            connection,
            addr,
            session: None,
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.id.as_str())
    }

    /// Current phase, derived from the registry for lobby membership.
    pub async fn phase(&self) -> RouterPhase {
        let Some(session) = &self.session else {
            return RouterPhase::Unauthenticated;
        };

        let registry = self.state.registry.read().await;
        match registry.lobby_of(&session.id) {
            Some(lobby) if lobby.in_game => RouterPhase::InGame,
            Some(_) => RouterPhase::InLobby,
            None => RouterPhase::Authenticated,
        }
    }

    pub async fn handle(&mut self, inbound: InboundAction) {
        let action = match inbound {
            InboundAction::Action(action) => action,
            InboundAction::Error(error) => {
                warn!(
                    "Client {} reported error {} ({}): {}",
                    self.addr,
                    error.code,
                    error.name,
                    error.message.as_deref().unwrap_or("")
                );
                return;
            }
        };

        let kind = match action.action_type() {
            Ok(kind) => kind,
            Err(UnknownActionType(name)) => {
                self.unsupported(&name);
                return;
            }
        };
        debug!("Received '{}' from {}", kind, self.addr);

        match kind {
            ActionType::Handshake => self.handshake(&action).await,
            ActionType::Ping => self.ping(&action),
            ActionType::Logoff => self.logoff(&action).await,
            ActionType::CreateLobby => self.create_lobby(&action).await,
            ActionType::JoinLobby => self.join_lobby(&action).await,
            ActionType::ChangeLobbySettings => self.change_lobby_settings(&action).await,
            ActionType::DeleteLobby => self.delete_lobby(&action).await,
            ActionType::StartGame => self.start_game(&action).await,
            // Server-to-client actions are never valid inbound
            _ => self.unsupported(kind.as_str()),
        }
    }

    /// Releases the session and its lobby membership after the connection
    /// is gone. Same cleanup as logoff.
    pub async fn disconnect(&mut self) {
        self.end_session().await;
    }

    async fn handshake(&mut self, action: &TransferAction) {
        if self.session.is_some() {
            self.deny("This connection is already authenticated");
            return;
        }

        let Some(data) = self.payload::<HandshakeData>(action) else {
            return;
        };

        let now = get_timestamp();
        let Some(client_time) = data.timestamp.to_millis() else {
            self.deny("Handshake timestamp could not be read");
            return;
        };
        let drift = clock_drift(now, client_time);
        if drift.abs() > self.state.config.max_clock_drift_ms {
            warn!("Rejecting handshake from {}: clock drift {}ms", self.addr, drift);
            self.deny(&format!(
                "Your clock is {}ms off from the server's, the limit is {}ms",
                drift, self.state.config.max_clock_drift_ms
            ));
            return;
        }

        let identity = &self.state.identity;
        if !identity.username_valid(&data.username) {
            self.deny("Usernames must be 3 to 20 characters of letters, digits or _-.!?*");
            return;
        }

        let final_username = identity.sanitize_text(&data.username, DEFAULT_REPLACEMENT);
        let session_id = match identity.generate_session_id() {
            Ok(id) => id,
            Err(e) => {
                self.connection.respond_error_to(
                    Some(CloseCode::InternalFault),
                    ErrorCode::Internal,
                    e.to_string(),
                    ActionType::Handshake.as_str(),
                );
                return;
            }
        };

        self.state.sessions.write().await.bind(SessionEntry::new(
            session_id.clone(),
            final_username.clone(),
            self.addr,
            self.connection.clone(),
        ));
        self.session = Some(Session {
            id: session_id.clone(),
            username: final_username.clone(),
        });
        info!("{} authenticated as {}", self.addr, final_username);

        self.reply(
            ActionType::AckHandshake,
            &AckHandshakeData {
                final_username,
                session_id,
                nonce: rand::random::<u32>(),
            },
        );
    }

    fn ping(&self, action: &TransferAction) {
        let Some(data) = self.payload::<PingData>(action) else {
            return;
        };

        let now = get_timestamp();
        self.reply(
            ActionType::Pong,
            &PongData {
                client_timestamp: data.timestamp,
                server_timestamp: now,
                latency: now.saturating_sub(data.timestamp),
                internal_latency: None,
            },
        );
    }

    async fn logoff(&mut self, action: &TransferAction) {
        if self.authorize::<LogoffData>(action).is_none() {
            return;
        }
        self.end_session().await;
    }

    async fn create_lobby(&mut self, action: &TransferAction) {
        let Some((session, data)) = self.authorize::<CreateLobbyData>(action) else {
            return;
        };

        let username = self
            .state
            .identity
            .sanitize_text(&data.username, DEFAULT_REPLACEMENT);

        let mut registry = self.state.registry.write().await;
        match registry.open_lobby(&username, &session.id) {
            Ok(lobby) => self.reply(ActionType::AckJoinLobby, &ack_join(&lobby)),
            Err(e) => self.registry_error(action, e),
        }
    }

    async fn join_lobby(&mut self, action: &TransferAction) {
        let Some((session, data)) = self.authorize::<JoinLobbyData>(action) else {
            return;
        };

        let identity = &self.state.identity;
        let lobby_id = identity.normalize_lobby_id(&data.lobby_id);
        let username = identity.sanitize_text(&data.username, DEFAULT_REPLACEMENT);

        let mut registry = self.state.registry.write().await;
        match registry.join_lobby(&lobby_id, &username, &session.id) {
            Ok(lobby) => {
                self.reply(ActionType::AckJoinLobby, &ack_join(&lobby));

                let sessions = self.state.sessions.read().await;
                broadcast(
                    &sessions,
                    &lobby,
                    ActionType::BroadcastLobbyUpdate,
                    &lobby_update(&lobby),
                    Some(&session.id),
                );
            }
            Err(RegistryError::NotFound(_)) => self.reply(
                ActionType::LobbyNotFound,
                &LobbyNotFoundData {
                    lobby_id: data.lobby_id,
                },
            ),
            Err(e) => self.registry_error(action, e),
        }
    }

    async fn change_lobby_settings(&mut self, action: &TransferAction) {
        let Some((session, data)) = self.authorize::<ChangeLobbySettingsData>(action) else {
            return;
        };

        let mut registry = self.state.registry.write().await;
        let Some(lobby_id) = registry.lobby_of(&session.id).map(|l| l.lobby_id.clone()) else {
            self.not_in_lobby(action);
            return;
        };

        match registry.change_settings(&lobby_id, &session.id, data.settings) {
            Ok(lobby) => {
                let sessions = self.state.sessions.read().await;
                broadcast(
                    &sessions,
                    &lobby,
                    ActionType::BroadcastLobbyUpdate,
                    &lobby_update(&lobby),
                    None,
                );
            }
            Err(e) => self.registry_error(action, e),
        }
    }

    async fn delete_lobby(&mut self, action: &TransferAction) {
        let Some((session, data)) = self.authorize::<DeleteLobbyData>(action) else {
            return;
        };
        let lobby_id = self.state.identity.normalize_lobby_id(&data.lobby_id);

        let mut registry = self.state.registry.write().await;
        match registry.delete_lobby(&lobby_id, &session.id) {
            Ok(lobby) => {
                let sessions = self.state.sessions.read().await;
                broadcast(
                    &sessions,
                    &lobby,
                    ActionType::AckRemovedFromLobby,
                    &removed_from(&lobby),
                    None,
                );
            }
            Err(RegistryError::NotFound(_)) => self.reply(
                ActionType::LobbyNotFound,
                &LobbyNotFoundData {
                    lobby_id: data.lobby_id,
                },
            ),
            Err(e) => self.registry_error(action, e),
        }
    }

    async fn start_game(&mut self, action: &TransferAction) {
        let Some((session, _)) = self.authorize::<StartGameData>(action) else {
            return;
        };

        let mut registry = self.state.registry.write().await;
        let Some(lobby_id) = registry.lobby_of(&session.id).map(|l| l.lobby_id.clone()) else {
            self.not_in_lobby(action);
            return;
        };

        match registry.start_game(&lobby_id, &session.id) {
            Ok(lobby) => {
                let sessions = self.state.sessions.read().await;
                broadcast(
                    &sessions,
                    &lobby,
                    ActionType::BroadcastGameStarted,
                    &GameStartedData {
                        lobby_id: lobby.lobby_id.clone(),
                    },
                    None,
                );
            }
            Err(e) => self.registry_error(action, e),
        }
    }

    async fn end_session(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        let mut registry = self.state.registry.write().await;
        let departure = registry.leave(&session.id);

        let mut sessions = self.state.sessions.write().await;
        sessions.unbind(&session.id);

        match departure {
            Departure::NotInLobby => {}
            Departure::Left(lobby) => broadcast(
                &sessions,
                &lobby,
                ActionType::BroadcastLobbyUpdate,
                &lobby_update(&lobby),
                None,
            ),
            Departure::Dissolved(lobby) => broadcast(
                &sessions,
                &lobby,
                ActionType::AckRemovedFromLobby,
                &removed_from(&lobby),
                None,
            ),
        }
        info!("{} logged off", session.username);
    }

    /// Decodes the payload and checks it names this connection's session.
    fn authorize<T>(&self, action: &TransferAction) -> Option<(Session, T)>
    where
        T: DeserializeOwned + SessionBound,
    {
        let Some(session) = self.session.clone() else {
            warn!("'{}' from {} before handshake", action.kind, self.addr);
            self.connection.respond_error_to(
                None,
                ErrorCode::NotAuthenticated,
                "A successful handshake is required first",
                &action.kind,
            );
            return None;
        };

        let data = self.payload::<T>(action)?;
        if data.session_id() != session.id {
            warn!("Session mismatch on '{}' from {}", action.kind, self.addr);
            self.connection.respond_error_to(
                None,
                ErrorCode::Unauthorized,
                "The sessionID does not belong to this connection",
                &action.kind,
            );
            return None;
        }

        Some((session, data))
    }

    fn payload<T: DeserializeOwned>(&self, action: &TransferAction) -> Option<T> {
        match action.payload::<T>() {
            Ok(data) => Some(data),
            Err(e) => {
                warn!("Invalid data from {}: {}", self.addr, e);
                self.connection.respond_error_to(
                    None,
                    ErrorCode::InvalidActionData,
                    e.to_string(),
                    &action.kind,
                );
                None
            }
        }
    }

    fn reply<T: Serialize>(&self, kind: ActionType, payload: &T) {
        match Action::new(kind, payload) {
            Ok(action) => self.connection.dispatch(action),
            Err(e) => {
                warn!("Could not build '{}': {}", kind, e);
                self.connection
                    .respond_error(None, ErrorCode::Internal, e.to_string());
            }
        }
    }

    fn deny(&self, reason: &str) {
        self.reply(
            ActionType::DenyHandshake,
            &DenyHandshakeData {
                reason: reason.to_string(),
            },
        );
    }

    fn unsupported(&self, kind: &str) {
        warn!("Unsupported action '{}' from {}", kind, self.addr);
        self.connection.respond_error_to(
            Some(CloseCode::ProtocolViolation),
            ErrorCode::UnsupportedAction,
            format!("'{}' is not an action this server accepts", kind),
            kind,
        );
    }

    fn not_in_lobby(&self, action: &TransferAction) {
        self.connection.respond_error_to(
            None,
            ErrorCode::Unauthorized,
            "This session is not a member of any lobby",
            &action.kind,
        );
    }

    fn registry_error(&self, action: &TransferAction, error: RegistryError) {
        warn!("'{}' from {} rejected: {}", action.kind, self.addr, error);
        self.connection
            .respond_error_to(None, error.error_code(), error.to_string(), &action.kind);
    }
}

fn ack_join(lobby: &Lobby) -> AckJoinLobbyData {
    AckJoinLobbyData {
        lobby_id: lobby.lobby_id.clone(),
        initial_settings: lobby.settings,
        users: lobby.users.clone(),
    }
}

fn lobby_update(lobby: &Lobby) -> BroadcastLobbyUpdateData {
    BroadcastLobbyUpdateData {
        lobby_id: lobby.lobby_id.clone(),
        settings: lobby.settings,
        users: lobby.users.clone(),
    }
}

fn removed_from(lobby: &Lobby) -> AckRemovedFromLobbyData {
    AckRemovedFromLobbyData {
        lobby_id: lobby.lobby_id.clone(),
        reason: RemovalReason::AdminLeft,
    }
}

fn broadcast<T: Serialize>(
    sessions: &SessionTable,
    lobby: &Lobby,
    kind: ActionType,
    payload: &T,
    exclude: Option<&str>,
) {
    match Action::new(kind, payload) {
        Ok(action) => {
            let sent = sessions.broadcast(&lobby.users, &action, exclude);
            debug!("Broadcast '{}' to {} members of {}", kind, sent, lobby.lobby_id);
        }
        Err(e) => warn!("Could not build '{}' broadcast: {}", kind, e),
    }
}
