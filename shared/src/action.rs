//! Action types exchanged between the two actors.
//!
//! An [`Action`] is what the application layer produces: a closed
//! [`ActionType`] tag plus a JSON object payload. On the wire it travels as a
//! [`TransferAction`], enriched with the sending [`Actor`] and a timestamp.
//! Errors use the reserved [`ErrorAction`] shape, which never carries `data`.

use crate::error::ActionError;
use crate::error_code::ErrorCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Type tag of the reserved error shape.
pub const ERROR_TYPE: &str = "error";

/// One of the two protocol roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Actor {
    Client,
    Server,
}

impl Actor {
    pub fn as_str(self) -> &'static str {
        match self {
            Actor::Client => "client",
            Actor::Server => "server",
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

macro_rules! action_types {
    ($($variant:ident => $tag:literal),+ $(,)?) => {
        /// Closed catalogue of action types.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum ActionType {
            $($variant),+
        }

        impl ActionType {
            pub const ALL: &'static [ActionType] = &[$(ActionType::$variant),+];

            /// Wire tag of this action type.
            pub fn as_str(self) -> &'static str {
                match self {
                    $(ActionType::$variant => $tag),+
                }
            }
        }

        impl FromStr for ActionType {
            type Err = UnknownActionType;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($tag => Ok(ActionType::$variant),)+
                    other => Err(UnknownActionType(other.to_string())),
                }
            }
        }
    };
}

action_types! {
    Handshake => "handshake",
    AckHandshake => "ackHandshake",
    DenyHandshake => "denyHandshake",
    Logoff => "logoff",
    Ping => "ping",
    Pong => "pong",
    CreateLobby => "createLobby",
    JoinLobby => "joinLobby",
    LobbyNotFound => "lobbyNotFound",
    AckJoinLobby => "ackJoinLobby",
    ChangeLobbySettings => "changeLobbySettings",
    BroadcastLobbyUpdate => "broadcastLobbyUpdate",
    DeleteLobby => "deleteLobby",
    AckRemovedFromLobby => "ackRemovedFromLobby",
    StartGame => "startGame",
    BroadcastGameStarted => "broadcastGameStarted",
    BroadcastGameUpdate => "broadcastGameUpdate",
    Error => "error",
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a wire tag is not in the catalogue.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown action type '{0}'")]
pub struct UnknownActionType(pub String);

/// An intent or notification produced by one of the actors.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub kind: ActionType,
    pub data: Map<String, Value>,
}

impl Action {
    /// Builds an action from a typed payload.
    ///
    /// The payload must serialize to a non-empty JSON object, which is what
    /// the receiving side's shape gate demands.
    pub fn new<T: Serialize>(kind: ActionType, payload: &T) -> Result<Self, ActionError> {
        let value = serde_json::to_value(payload).map_err(|source| ActionError::Payload {
            kind: kind.to_string(),
            source,
        })?;

        match value {
            Value::Object(data) if !data.is_empty() => Ok(Self { kind, data }),
            _ => Err(ActionError::NotAnObject(kind.as_str())),
        }
    }

    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, ActionError> {
        decode_payload(self.kind.as_str(), &self.data)
    }
}

/// The only form that crosses the wire for regular actions.
///
/// `actor` and `timestamp` are optional on input so that hand-written frames
/// are still accepted; this side always fills them in when sending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferAction {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<Actor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl TransferAction {
    pub fn outbound(action: Action, actor: Actor, timestamp: i64) -> Self {
        Self {
            kind: action.kind.as_str().to_string(),
            data: action.data,
            error: false,
            actor: Some(actor),
            timestamp: Some(timestamp),
        }
    }

    /// Resolves the wire tag against the catalogue.
    pub fn action_type(&self) -> Result<ActionType, UnknownActionType> {
        self.kind.parse()
    }

    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, ActionError> {
        decode_payload(&self.kind, &self.data)
    }
}

fn decode_payload<T: DeserializeOwned>(kind: &str, data: &Map<String, Value>) -> Result<T, ActionError> {
    T::deserialize(Value::Object(data.clone())).map_err(|source| ActionError::Payload {
        kind: kind.to_string(),
        source,
    })
}

/// Reserved error shape.
///
/// Only `type` is required inbound: a missing `code` reads as
/// [`ErrorCode::Unknown`] and a missing `name` is taken from the code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorAction {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default = "error_flag")]
    pub error: bool,
    #[serde(default = "unknown_code")]
    pub code: u16,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_to: Option<String>,
}

impl ErrorAction {
    pub fn new(code: ErrorCode, message: Option<String>, response_to: Option<String>) -> Self {
        Self {
            kind: ERROR_TYPE.to_string(),
            error: true,
            code: code.code(),
            name: code.name().to_string(),
            message: message.filter(|m| !m.is_empty()),
            response_to,
        }
    }

    pub fn error_code(&self) -> ErrorCode {
        ErrorCode::from_code(self.code)
    }

    /// Fills in `name` from the code when the sender left it out.
    pub fn resolve_name(mut self) -> Self {
        if self.name.is_empty() {
            self.name = self.error_code().name().to_string();
        }
        self
    }
}

fn error_flag() -> bool {
    true
}

fn unknown_code() -> u16 {
    ErrorCode::Unknown.code()
}

/// A validated inbound frame, as handed to a router.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundAction {
    Action(TransferAction),
    Error(ErrorAction),
}
