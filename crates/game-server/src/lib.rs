//! Team Arena game server library.
//!
//! A WebSocket server that groups players into named games of two teams and
//! relays every message a player sends to everyone in its game:
//!
//! - Connections start unjoined and may only send `join`
//! - The first `join` for a name creates the game; the last player leaving
//!   destroys it
//! - `random` team requests go to the smaller team, and each team holds at
//!   most `GS_MAX_PLAYERS_PER_TEAM` players
//! - Once joined, frames are broadcast verbatim to the whole game
//!
//! # Architecture
//!
//! ```text
//! Acceptor ── spawns ──> SessionActor (per connection)
//!                           │  unjoined: Router ──> RegistryActor
//!                           │  joined:   GameActor.broadcast
//!                           v
//!                     outbound queue ──> WebSocket
//! ```
//!
//! # Modules
//!
//! - [`actors`] - Registry, game and session actors
//! - [`router`] - Handling of frames from unjoined connections
//! - [`acceptor`] - TCP listener
//! - [`server`] - Assembly and graceful shutdown
//! - [`config`] - Configuration from environment
//! - [`errors`] - Error types
//! - [`observability`] - Metrics and health endpoints

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod acceptor;
pub mod actors;
pub mod config;
pub mod errors;
pub mod observability;
pub mod router;
pub mod server;
