//! Actor model implementation for the game server.
//!
//! ```text
//! RegistryActor (singleton per server instance)
//! ├── tracks every connection (unjoined or in a game)
//! └── supervises N GameActors
//!     └── GameActor (one per named game with at least one player)
//!         └── owns the first and second team rosters
//!
//! SessionActor (one per TCP connection)
//! ├── owns the WebSocket and the outbound write queue
//! └── delegates inbound frames to the router or to its GameActor
//! ```
//!
//! # Key Design Decisions
//!
//! - **Single writer per map**: the registry owns games and membership, each
//!   game owns its rosters; nothing is shared behind a lock
//! - **No wait cycle**: sessions wait on the registry and games, the registry
//!   waits on games, games never wait (session writes are non-blocking)
//! - **CancellationToken propagation**: games get child tokens of the
//!   registry; sessions get child tokens of the server's session token
//! - **Mailbox monitoring**: depth thresholds per actor type
//!
//! # Modules
//!
//! - [`registry`] - `RegistryActor` singleton that supervises games
//! - [`game`] - `GameActor` per live game, owns rosters and broadcasts
//! - [`session`] - `SessionActor` per WebSocket connection
//! - [`messages`] - Message types for actor communication
//! - [`metrics`] - Mailbox monitoring and actor metrics

pub mod game;
pub mod messages;
pub mod metrics;
pub mod registry;
pub mod session;

// Re-export primary types
pub use game::{GameActor, GameActorHandle};
pub use messages::*;
pub use metrics::{ActorMetrics, ActorType, MailboxMonitor};
pub use registry::{RegistryActor, RegistryActorHandle};
pub use session::{SessionActor, SessionContext, SessionHandle, SessionState};
