//! Error types shared by both actors.

/// Failure to turn a raw frame into an action.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The frame is not JSON at all.
    #[error("payload could not be parsed: {0}")]
    Malformed(#[source] serde_json::Error),
    /// The frame is JSON but not shaped like an action.
    #[error("payload is not a valid action: {0}")]
    Shape(String),
    /// An outbound action could not be encoded.
    #[error("action could not be serialized: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Failure to build an action or read its payload.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("payload of '{0}' must serialize to a non-empty object")]
    NotAnObject(&'static str),
    #[error("payload of '{kind}' is invalid: {source}")]
    Payload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Failure to produce an identifier that passes the content filter.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("gave up generating a {0} after {1} filtered attempts")]
    FilterExhausted(&'static str, usize),
}

/// Local faults raised by a connection session.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("error actions must be sent with respond_error, not dispatch")]
    ErrorDispatched,
    #[error("refusing to dispatch '{0}' with an empty data object")]
    EmptyData(&'static str),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("connection writer has shut down")]
    WriterGone,
}
