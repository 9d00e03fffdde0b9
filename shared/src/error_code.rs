//! Protocol error codes and websocket close codes.
//!
//! Every [`ErrorAction`](crate::action::ErrorAction) carries one of these
//! codes. The human label sent alongside it is resolved from the same table,
//! so peers never have to agree on names, only on numbers.

/// Fixed table of protocol error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Unknown = 100,
    InvalidAction = 101,
    MalformedPayload = 102,
    UnsupportedAction = 103,
    InvalidActionData = 104,
    Unauthorized = 105,
    NotAuthenticated = 106,
    AlreadyInLobby = 107,
    GameInProgress = 108,
    Internal = 500,
}

impl ErrorCode {
    pub const ALL: [ErrorCode; 10] = [
        ErrorCode::Unknown,
        ErrorCode::InvalidAction,
        ErrorCode::MalformedPayload,
        ErrorCode::UnsupportedAction,
        ErrorCode::InvalidActionData,
        ErrorCode::Unauthorized,
        ErrorCode::NotAuthenticated,
        ErrorCode::AlreadyInLobby,
        ErrorCode::GameInProgress,
        ErrorCode::Internal,
    ];

    pub fn code(self) -> u16 {
        self as u16
    }

    /// Human readable label sent as the `name` of an error frame.
    pub fn name(self) -> &'static str {
        match self {
            ErrorCode::Unknown => "Unknown Error",
            ErrorCode::InvalidAction => "Invalid Action",
            ErrorCode::MalformedPayload => "Malformed Payload",
            ErrorCode::UnsupportedAction => "Unsupported Action",
            ErrorCode::InvalidActionData => "Invalid Action Data",
            ErrorCode::Unauthorized => "Unauthorized",
            ErrorCode::NotAuthenticated => "Not Authenticated",
            ErrorCode::AlreadyInLobby => "Already In Lobby",
            ErrorCode::GameInProgress => "Game In Progress",
            ErrorCode::Internal => "Internal Error",
        }
    }

    /// Looks up a numeric code, falling back to [`ErrorCode::Unknown`].
    pub fn from_code(code: u16) -> Self {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.code() == code)
            .unwrap_or(ErrorCode::Unknown)
    }
}

/// Close codes used when an error forces the connection down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCode {
    /// 1007, the peer sent data that is not a valid action
    ProtocolViolation,
    /// 1011, something broke on this side
    InternalFault,
}

impl CloseCode {
    pub fn code(self) -> u16 {
        match self {
            CloseCode::ProtocolViolation => 1007,
            CloseCode::InternalFault => 1011,
        }
    }
}
