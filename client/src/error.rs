use crate::router::ClientPhase;
use pung_shared::{ActionError, CloseCode, ErrorCode};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("cannot {action} while {phase:?}")]
    NotAllowed {
        action: &'static str,
        phase: ClientPhase,
    },
    #[error("only the lobby admin can {0}")]
    NotAdmin(&'static str),
    #[error("username '{0}' must be 3 to 20 characters of letters, digits or _-.!?*")]
    InvalidUsername(String),
    #[error("'{0}' is not a lobby code")]
    InvalidLobbyId(String),
    #[error("win score must be between 1 and 20")]
    InvalidSettings,
    #[error("server sent '{0}', which a client does not handle")]
    Unsupported(String),
    #[error(transparent)]
    Payload(#[from] ActionError),
    #[error("could not reach server: {0}")]
    Connect(#[from] tokio_tungstenite::tungstenite::Error),
}

impl ClientError {
    /// Code to report back when the fault lies with an inbound action.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            ClientError::Unsupported(_) => ErrorCode::UnsupportedAction,
            ClientError::Payload(_) => ErrorCode::InvalidActionData,
            _ => ErrorCode::Unknown,
        }
    }

    /// Unsupported action types are protocol faults and end the connection.
    pub fn close_code(&self) -> Option<CloseCode> {
        match self {
            ClientError::Unsupported(_) => Some(CloseCode::ProtocolViolation),
            _ => None,
        }
    }
}
