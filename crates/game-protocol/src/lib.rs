//! Wire protocol for Team Arena.
//!
//! Clients and the game server exchange one JSON object per WebSocket text
//! frame. This crate holds the typed messages, the codec that turns frames
//! into requests and responses into [`Package`]s, and the `Package` type
//! itself: an immutable, reference-counted buffer that a broadcast hands to
//! every recipient without copying.

#![warn(clippy::pedantic)]

pub mod codec;
pub mod message;
pub mod package;

pub use codec::{decode_request, encode_message, CodecError};
pub use message::{
    ClientRequest, JoinRequest, JoinResult, JoinStatus, PlayerInfo, ServerMessage, Team,
    TeamPreference, Warning,
};
pub use package::Package;
