//! Typed protocol messages.
//!
//! Inbound messages carry a `type` discriminator. Only `join` is understood
//! before a connection has joined a game; after that every frame is relayed
//! verbatim and never decoded here.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Warning text sent for anything the router does not understand.
pub const UNIDENTIFIED_PACKAGE_MESSAGE: &str = "Received an unidentified package.";

/// Warning text sent when the server can no longer route requests.
pub const SHUTTING_DOWN_MESSAGE: &str = "Server is shutting down.";

/// One of the two teams of a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Team {
    /// First team
    First,
    /// Second team
    Second,
}

impl Team {
    /// Returns the team as a string for logs and metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Team::First => "first",
            Team::Second => "second",
        }
    }
}

/// Team requested by a joining player.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamPreference {
    /// Join the first team
    First,
    /// Join the second team
    Second,
    /// Let the server pick the smaller team
    #[default]
    Random,
}

impl TeamPreference {
    /// Returns the preference as a string for logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            TeamPreference::First => "first",
            TeamPreference::Second => "second",
            TeamPreference::Random => "random",
        }
    }
}

/// Requests an unjoined client may send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientRequest {
    /// Join (and lazily create) a named game.
    Join(JoinRequest),
}

impl ClientRequest {
    /// Every `type` value this enum understands.
    pub const KNOWN_TYPES: &'static [&'static str] = &["join"];

    /// Returns the wire `type` of this request.
    #[must_use]
    pub const fn message_type(&self) -> &'static str {
        match self {
            ClientRequest::Join(_) => "join",
        }
    }
}

/// Body of a `join` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinRequest {
    /// Client-chosen correlation id, echoed in the response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    /// Game name.
    pub game: String,
    /// Player nickname.
    pub nick: String,
    /// Requested team.
    #[serde(default)]
    pub team: TeamPreference,
}

/// A player as it appears in a roster snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerInfo {
    /// Slot id, stable while the player stays in the game
    pub id: u32,
    /// Nickname given at join time
    pub nick: String,
    /// Team the player was placed on
    pub team: Team,
}

/// Messages the server originates.
///
/// Game traffic relayed between members is not represented here; it is
/// forwarded as the raw [`crate::Package`] the sender produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Response to a `join` request.
    JoinResult(JoinResult),
    /// Something went wrong with an inbound message.
    Warning(Warning),
}

/// Body of a `join-result` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinResult {
    /// Correlation id copied from the request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    /// Outcome of the join.
    #[serde(flatten)]
    pub status: JoinStatus,
}

/// Outcome carried by a `join-result`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "lowercase")]
pub enum JoinStatus {
    /// The player is now a member of the game.
    Joined {
        /// Slot id assigned to the joining player
        my_id: u32,
        /// Every member of the game, the joiner included
        players: Vec<PlayerInfo>,
    },
    /// The requested team (or both teams) had no room.
    Full,
}

/// Body of a `warning` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    /// Human-readable description
    pub message: String,
    /// Whether the server is closing the connection
    pub closed: bool,
}

impl ServerMessage {
    /// Successful `join-result`.
    #[must_use]
    pub fn joined(id: Option<Value>, my_id: u32, players: Vec<PlayerInfo>) -> Self {
        ServerMessage::JoinResult(JoinResult {
            id,
            status: JoinStatus::Joined { my_id, players },
        })
    }

    /// `join-result` for a game with no room.
    #[must_use]
    pub fn full(id: Option<Value>) -> Self {
        ServerMessage::JoinResult(JoinResult {
            id,
            status: JoinStatus::Full,
        })
    }

    /// Warning for a message the router could not identify.
    #[must_use]
    pub fn unidentified_package() -> Self {
        ServerMessage::Warning(Warning {
            message: UNIDENTIFIED_PACKAGE_MESSAGE.to_string(),
            closed: false,
        })
    }

    /// Warning sent right before the server drops the connection.
    #[must_use]
    pub fn shutting_down() -> Self {
        ServerMessage::Warning(Warning {
            message: SHUTTING_DOWN_MESSAGE.to_string(),
            closed: true,
        })
    }
}
