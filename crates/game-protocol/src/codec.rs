//! Codec for decoding client requests and encoding server messages.

use crate::message::{ClientRequest, ServerMessage};
use crate::package::Package;
use serde_json::Value;

/// Error type for codec operations
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Payload is not valid UTF-8
    #[error("Invalid UTF-8 payload: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// Payload is not JSON
    #[error("Malformed JSON: {0}")]
    MalformedJson(#[source] serde_json::Error),

    /// JSON object has no string `type` field
    #[error("Missing message type")]
    MissingType,

    /// `type` names a message this side does not handle
    #[error("Unidentified message type: {0}")]
    UnidentifiedType(String),

    /// Known `type` but the remaining fields do not fit
    #[error("Invalid {message_type} message: {source}")]
    InvalidFields {
        /// Declared message type
        message_type: String,
        /// Underlying deserialization error
        #[source]
        source: serde_json::Error,
    },

    /// Serialization of an outbound message failed
    #[error("Failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),
}

impl CodecError {
    /// Declared `type` of the offending message, when there was one.
    #[must_use]
    pub fn message_type(&self) -> Option<&str> {
        match self {
            CodecError::UnidentifiedType(t) => Some(t),
            CodecError::InvalidFields { message_type, .. } => Some(message_type),
            _ => None,
        }
    }
}

/// Decode a request sent by a client that has not joined a game yet.
///
/// # Errors
///
/// Returns an error if the payload is not a JSON object with a known `type`
/// and the fields that type requires.
pub fn decode_request(payload: &[u8]) -> Result<ClientRequest, CodecError> {
    let value: Value = serde_json::from_slice(payload).map_err(CodecError::MalformedJson)?;

    let message_type = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(CodecError::MissingType)?
        .to_string();

    if !ClientRequest::KNOWN_TYPES.contains(&message_type.as_str()) {
        return Err(CodecError::UnidentifiedType(message_type));
    }

    serde_json::from_value(value).map_err(|source| CodecError::InvalidFields {
        message_type,
        source,
    })
}

/// Encode a server message into a shareable package
///
/// # Errors
///
/// Returns an error if encoding fails
pub fn encode_message(message: &ServerMessage) -> Result<Package, CodecError> {
    let text = serde_json::to_string(message).map_err(CodecError::Encode)?;
    Ok(Package::from_text(text))
}
