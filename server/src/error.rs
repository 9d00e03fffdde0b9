use pung_shared::{ErrorCode, IdentityError};

/// Rejections from the lobby registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("'{0}' is not a usable lobby id")]
    InvalidIdentifier(String),
    #[error("no lobby with id '{0}'")]
    NotFound(String),
    #[error("only the lobby admin may do that")]
    Unauthorized,
    #[error("username '{0}' is not allowed")]
    InvalidUsername(String),
    #[error("malformed session id")]
    InvalidSessionId,
    #[error("lobby settings are out of range")]
    InvalidSettings,
    #[error("session is already a member of a lobby")]
    AlreadyInLobby,
    #[error("lobby '{0}' is already in game")]
    GameInProgress(String),
    #[error("lobby limit of {0} reached")]
    Full(usize),
    #[error(transparent)]
    Identity(#[from] IdentityError),
}

impl RegistryError {
    /// Error code reported to the peer when this rejection is surfaced.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            RegistryError::Unauthorized => ErrorCode::Unauthorized,
            RegistryError::InvalidUsername(_)
            | RegistryError::InvalidSessionId
            | RegistryError::InvalidSettings => ErrorCode::InvalidActionData,
            RegistryError::AlreadyInLobby => ErrorCode::AlreadyInLobby,
            RegistryError::GameInProgress(_) => ErrorCode::GameInProgress,
            RegistryError::NotFound(_) => ErrorCode::InvalidActionData,
            RegistryError::InvalidIdentifier(_)
            | RegistryError::Full(_)
            | RegistryError::Identity(_) => ErrorCode::Internal,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
