//! Message types for actor communication.
//!
//! All inter-actor communication uses strongly-typed message passing via `tokio::sync::mpsc`.
//! Response patterns use `tokio::sync::oneshot` for request-reply semantics.

use crate::errors::GsError;

use super::game::GameActorHandle;
use super::session::SessionHandle;

use game_protocol::{Package, PlayerInfo, Team, TeamPreference};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tokio::sync::oneshot;

/// Identity of one client connection.
///
/// Allocated from a process-wide counter and never reused while the process
/// lives, so it is safe as a map key after the connection is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Wrap a raw id.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw numeric value.
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Messages sent to `RegistryActor`.
#[derive(Debug)]
pub enum RegistryMessage {
    /// A connection started; record it as unjoined.
    Register {
        connection_id: ConnectionId,
        /// Handle the registry passes to the game on join.
        session: SessionHandle,
        /// Response channel for the initial delegate.
        respond_to: oneshot::Sender<Delegate>,
    },

    /// A connection ended; drop it from its game or the unjoined set.
    Unregister {
        connection_id: ConnectionId,
        /// Whether the connection was registered.
        respond_to: oneshot::Sender<bool>,
    },

    /// Route a decoded `join` request.
    RouteJoin {
        ticket: JoinTicket,
        /// Response channel for the join result or error.
        respond_to: oneshot::Sender<Result<GameJoin, GsError>>,
    },

    /// Look up a live game by name.
    GetGame {
        game_name: String,
        respond_to: oneshot::Sender<Option<GameInfo>>,
    },

    /// Get current registry status (for health checks and tests).
    GetStatus {
        respond_to: oneshot::Sender<RegistryStatus>,
    },

    /// Initiate graceful shutdown.
    Shutdown {
        /// Deadline for stopping game actors.
        deadline: Duration,
        /// Response channel for confirmation.
        respond_to: oneshot::Sender<Result<(), GsError>>,
    },
}

/// Messages sent to `GameActor`.
#[derive(Debug)]
pub enum GameMessage {
    /// Place a connection on a team.
    Join {
        request: PlayerJoin,
        /// Response channel for the assigned slot or the rejection.
        respond_to: oneshot::Sender<Result<JoinedPlayer, GsError>>,
    },

    /// Remove a connection from whichever roster holds it.
    Leave {
        connection_id: ConnectionId,
        respond_to: oneshot::Sender<LeaveResult>,
    },

    /// Relay a package to every current member.
    Broadcast { package: Package },

    /// Sum of both roster sizes.
    GetPlayersCount {
        respond_to: oneshot::Sender<usize>,
    },

    /// Full game snapshot (for debugging and tests).
    GetState {
        respond_to: oneshot::Sender<GameState>,
    },
}

/// Commands sent to a `SessionActor`.
#[derive(Debug)]
pub enum SessionCommand {
    /// Queue a package for delivery to the client.
    Write(Package),

    /// Close the connection gracefully.
    Close { reason: String },
}

// ----------------------------------------------------------------------------
// Supporting Types
// ----------------------------------------------------------------------------

/// Current inbound handler of a session.
#[derive(Debug, Clone)]
pub enum Delegate {
    /// Not in a game: inbound messages go to the protocol router.
    Unjoined,
    /// In a game: inbound messages are broadcast to it.
    InGame {
        game_name: String,
        game: GameActorHandle,
    },
}

impl Delegate {
    /// Name of the current game, if any.
    #[must_use]
    pub fn game_name(&self) -> Option<&str> {
        match self {
            Delegate::Unjoined => None,
            Delegate::InGame { game_name, .. } => Some(game_name),
        }
    }
}

/// A decoded `join` request on its way to the registry.
#[derive(Debug, Clone)]
pub struct JoinTicket {
    pub connection_id: ConnectionId,
    pub game_name: String,
    pub nick: String,
    pub team: TeamPreference,
    /// Echoed back in the `join-result`.
    pub correlation_id: Option<Value>,
}

/// A join forwarded by the registry to a game.
#[derive(Debug, Clone)]
pub struct PlayerJoin {
    pub connection_id: ConnectionId,
    pub nick: String,
    pub team: TeamPreference,
    /// Outbound queue of the joining session.
    pub session: SessionHandle,
    /// Echoed back in the `join-result`.
    pub correlation_id: Option<Value>,
}

/// What the game reports back after placing a player.
#[derive(Debug, Clone)]
pub struct JoinedPlayer {
    /// Slot id assigned to the player.
    pub slot: u32,
    /// Team the player was placed on.
    pub team: Team,
    /// All members after the join, ordered by slot.
    pub players: Vec<PlayerInfo>,
}

/// Result of a successful join, as returned by the registry.
#[derive(Debug, Clone)]
pub struct GameJoin {
    pub game_name: String,
    /// Delegate for the joined game.
    pub game: GameActorHandle,
    pub slot: u32,
    pub team: Team,
    pub players: Vec<PlayerInfo>,
}

impl GameJoin {
    /// The session delegate that routes to this game.
    #[must_use]
    pub fn delegate(&self) -> Delegate {
        Delegate::InGame {
            game_name: self.game_name.clone(),
            game: self.game.clone(),
        }
    }
}

/// Outcome of a leave, taken in the same step as the removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaveResult {
    /// Whether the connection was a member.
    pub removed: bool,
    /// Players left in the game.
    pub remaining: usize,
}

/// Game information returned by `GetGame`.
#[derive(Debug, Clone)]
pub struct GameInfo {
    pub game_name: String,
    pub player_count: usize,
    pub created_at: i64,
}

/// Registry status for health checks.
#[derive(Debug, Clone)]
pub struct RegistryStatus {
    pub game_count: usize,
    pub registered_count: usize,
    pub unjoined_count: usize,
    pub session_count: usize,
    pub is_draining: bool,
    pub mailbox_depth: usize,
}

/// Game state snapshot.
#[derive(Debug, Clone)]
pub struct GameState {
    pub game_name: String,
    /// Members ordered by slot.
    pub players: Vec<PlayerInfo>,
    pub first_team_size: usize,
    pub second_team_size: usize,
    pub created_at: i64,
    pub mailbox_depth: usize,
}

impl GameState {
    /// Sum of both roster sizes.
    #[must_use]
    pub fn player_count(&self) -> usize {
        self.first_team_size + self.second_team_size
    }
}
