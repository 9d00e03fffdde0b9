//! # Pung Shared Library
//!
//! Everything both sides of a Pung session agree on: the action protocol, the
//! connection session that carries it, and the identity and lobby types the
//! server hands out.
//!
//! ## Protocol
//!
//! Every websocket text frame is a JSON object. Regular frames are
//! [`TransferAction`]s:
//!
//! ```json
//! {"type": "ping", "data": {"timestamp": 1700000000000}, "error": false,
//!  "actor": "client", "timestamp": 1700000000000}
//! ```
//!
//! Error frames are [`ErrorAction`]s and carry no data:
//!
//! ```json
//! {"type": "error", "error": true, "code": 102, "name": "Malformed Payload",
//!  "message": "..."}
//! ```
//!
//! Frames that are not JSON, or not shaped like an action, never reach
//! application code. The receiving side answers with an error frame and
//! closes with `1007`.
//!
//! ## Module Organization
//!
//! ### Action Module (`action`)
//! Action types, the wire envelope, and the error envelope.
//!
//! ### Codec Module (`codec`)
//! Parsing and structural validation of raw frames, plus serialization.
//!
//! ### Connection Module (`connection`)
//! One websocket wrapped in a lifecycle state machine with timestamps and a
//! bounded close.
//!
//! ### Identity Module (`identity`)
//! Session and lobby identifiers, username validation, and content filtering.
//!
//! ### Lobby Module (`lobby`)
//! Lobby records and their settings.
//!
//! ### Payload Module (`payload`)
//! Typed `data` objects for every action type.

pub mod action;
pub mod codec;
pub mod connection;
pub mod error;
pub mod error_code;
pub mod identity;
pub mod lobby;
pub mod payload;
pub mod utils;

pub use action::{Action, ActionType, Actor, ErrorAction, InboundAction, TransferAction};
pub use connection::{Connection, ConnectionEvent, ConnectionState, DEFAULT_CLOSE_TIMEOUT};
pub use error::{ActionError, CodecError, ConnectionError, IdentityError};
pub use error_code::{CloseCode, ErrorCode};
pub use identity::{ContentFilter, IdentityService};
pub use lobby::{Difficulty, Lobby, LobbySettings, LobbyUser};

/// Port the server listens on unless told otherwise.
pub const DEFAULT_PORT: u16 = 6942;

/// Largest tolerated difference between a client's clock and the server's.
pub const DEFAULT_MAX_CLOCK_DRIFT_MS: i64 = 60_000;
