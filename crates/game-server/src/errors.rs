//! Game server error types.
//!
//! Errors fall into three groups: replies a client can act on (full game,
//! bad request), failures that end one session (transport, server going
//! away), and bind failures that stop the process. Internal details are
//! logged server-side and never sent to clients.

use game_protocol::message::{SHUTTING_DOWN_MESSAGE, UNIDENTIFIED_PACKAGE_MESSAGE};
use game_protocol::CodecError;
use thiserror::Error;

/// Game server error type.
#[derive(Debug, Error)]
pub enum GsError {
    /// Socket bind, accept or WebSocket failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Inbound message could not be decoded, or outbound could not be encoded.
    #[error("Protocol error: {0}")]
    Protocol(#[from] CodecError),

    /// Connection is not known to the registry.
    #[error("Connection not registered: {0}")]
    NotRegistered(String),

    /// Connection already belongs to a game.
    #[error("Connection already joined a game: {0}")]
    AlreadyJoined(String),

    /// Requested team has no free slot.
    #[error("Game is full: {0}")]
    GameFull(String),

    /// Session no longer accepts writes.
    #[error("Session closed: {0}")]
    SessionClosed(String),

    /// Server is shutting down and no longer accepts joins.
    #[error("Server is draining")]
    Draining,

    /// Internal error with context (usually an actor channel failure).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GsError {
    /// Short, bounded label for metrics and logs.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            GsError::Transport(_) => "transport",
            GsError::Protocol(_) => "protocol",
            GsError::NotRegistered(_) => "not_registered",
            GsError::AlreadyJoined(_) => "already_joined",
            GsError::GameFull(_) => "game_full",
            GsError::SessionClosed(_) => "session_closed",
            GsError::Draining => "draining",
            GsError::Internal(_) => "internal",
        }
    }

    /// Whether a join failed only because there was no room for the player.
    ///
    /// Clients see these as a `full` join result and may try again.
    #[must_use]
    pub const fn is_join_rejection(&self) -> bool {
        matches!(self, GsError::GameFull(_) | GsError::AlreadyJoined(_))
    }

    /// Whether the session that hit this error cannot continue.
    #[must_use]
    pub const fn is_terminal_for_session(&self) -> bool {
        match self {
            GsError::Transport(_)
            | GsError::NotRegistered(_)
            | GsError::SessionClosed(_)
            | GsError::Draining
            | GsError::Internal(_) => true,
            GsError::Protocol(_) | GsError::AlreadyJoined(_) | GsError::GameFull(_) => false,
        }
    }

    /// Returns a client-safe error message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            GsError::Protocol(_) => UNIDENTIFIED_PACKAGE_MESSAGE.to_string(),
            GsError::GameFull(_) | GsError::AlreadyJoined(_) => "Game is full.".to_string(),
            GsError::Transport(_)
            | GsError::NotRegistered(_)
            | GsError::SessionClosed(_)
            | GsError::Draining
            | GsError::Internal(_) => SHUTTING_DOWN_MESSAGE.to_string(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_join_rejections() {
        assert!(GsError::GameFull("g1".to_string()).is_join_rejection());
        assert!(GsError::AlreadyJoined("conn-1".to_string()).is_join_rejection());
        assert!(!GsError::Draining.is_join_rejection());
        assert!(!GsError::Internal("x".to_string()).is_join_rejection());
    }

    #[test]
    fn test_terminal_classification() {
        assert!(GsError::Transport("reset".to_string()).is_terminal_for_session());
        assert!(GsError::Draining.is_terminal_for_session());
        assert!(GsError::Internal("channel send failed".to_string()).is_terminal_for_session());
        assert!(!GsError::GameFull("g1".to_string()).is_terminal_for_session());
        assert!(!GsError::Protocol(CodecError::MissingType).is_terminal_for_session());
    }

    #[test]
    fn test_client_messages_hide_internal_details() {
        let err = GsError::Internal("channel send failed: receiver dropped".to_string());
        assert_eq!(err.client_message(), SHUTTING_DOWN_MESSAGE);
        assert!(!err.client_message().contains("receiver"));

        let err = GsError::Protocol(CodecError::UnidentifiedType("frobnicate".to_string()));
        assert_eq!(err.client_message(), UNIDENTIFIED_PACKAGE_MESSAGE);
    }

    #[test]
    fn test_error_display() {
        assert_eq!(GsError::GameFull("g1".to_string()).to_string(), "Game is full: g1");
        assert_eq!(GsError::Draining.to_string(), "Server is draining");
        assert_eq!(
            GsError::Protocol(CodecError::MissingType).to_string(),
            "Protocol error: Missing message type"
        );
    }

    #[test]
    fn test_error_codes_are_distinct() {
        let codes = [
            GsError::Transport(String::new()).error_code(),
            GsError::Protocol(CodecError::MissingType).error_code(),
            GsError::NotRegistered(String::new()).error_code(),
            GsError::AlreadyJoined(String::new()).error_code(),
            GsError::GameFull(String::new()).error_code(),
            GsError::SessionClosed(String::new()).error_code(),
            GsError::Draining.error_code(),
            GsError::Internal(String::new()).error_code(),
        ];
        let unique: std::collections::HashSet<_> = codes.iter().collect();
        assert_eq!(unique.len(), codes.len());
    }
}
