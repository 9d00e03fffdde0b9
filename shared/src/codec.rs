//! Action codec: the single gate between raw frames and typed actions.

use crate::action::{ErrorAction, InboundAction, TransferAction, ERROR_TYPE};
use crate::error::CodecError;
use crate::utils::elapsed_since;
use serde_json::{Map, Value};

/// Key injected into `pong` data right before sending.
pub const INTERNAL_LATENCY_KEY: &str = "internalLatency";

/// Decodes raw bytes as JSON. Anything that is not JSON is a
/// [`CodecError::Malformed`], distinct from a shape error.
pub fn parse(raw: &[u8]) -> Result<Value, CodecError> {
    serde_json::from_slice(raw).map_err(CodecError::Malformed)
}

/// Structural predicate every inbound frame must pass: an object with a
/// string `type` and, unless it is an error, a non-empty object `data`.
pub fn is_valid_action(value: &Value) -> bool {
    let Some(object) = value.as_object() else {
        return false;
    };

    let Some(kind) = object.get("type").and_then(Value::as_str) else {
        return false;
    };

    if kind == ERROR_TYPE {
        return true;
    }

    matches!(object.get("data"), Some(Value::Object(data)) if !data.is_empty())
}

/// Runs the full inbound pipeline on one frame.
pub fn decode(raw: &[u8]) -> Result<InboundAction, CodecError> {
    let value = parse(raw)?;

    if !is_valid_action(&value) {
        return Err(CodecError::Shape(
            "type or data properties are invalid or missing".to_string(),
        ));
    }

    let is_error = value.get("type").and_then(Value::as_str) == Some(ERROR_TYPE);
    if is_error {
        serde_json::from_value::<ErrorAction>(value)
            .map(|error| InboundAction::Error(error.resolve_name()))
            .map_err(|e| CodecError::Shape(e.to_string()))
    } else {
        serde_json::from_value::<TransferAction>(value)
            .map(InboundAction::Action)
            .map_err(|e| CodecError::Shape(e.to_string()))
    }
}

pub fn serialize(action: &TransferAction) -> Result<String, CodecError> {
    serde_json::to_string(action).map_err(CodecError::Serialize)
}

pub fn serialize_error(action: &ErrorAction) -> Result<String, CodecError> {
    serde_json::to_string(action).map_err(CodecError::Serialize)
}

/// Writes the time since the last received message into `pong` data,
/// `-1` when nothing has been received yet.
pub fn inject_internal_latency(data: &mut Map<String, Value>, now: i64, last_message: i64) {
    data.insert(
        INTERNAL_LATENCY_KEY.to_string(),
        Value::from(elapsed_since(now, last_message)),
    );
}
