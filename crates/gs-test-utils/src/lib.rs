//! # Game Server Test Utilities
//!
//! Shared test utilities for the Team Arena game server.
//!
//! This crate provides:
//! - Server test harness (`TestGameServer` on an ephemeral port)
//! - WebSocket test client (`TestClient`) with JSON helpers and timeouts
//! - Request fixtures (`JoinRequestBuilder`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gs_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> anyhow::Result<()> {
//!     let server = TestGameServer::spawn().await?;
//!     let mut alice = TestClient::connect(&server.url()).await?;
//!
//!     let reply = alice.join(JoinRequestBuilder::new("g1", "alice")).await?;
//!     assert_eq!(reply["result"], "joined");
//!
//!     server.shutdown().await
//! }
//! ```

pub mod client;
pub mod fixtures;
pub mod server_harness;

// Re-export commonly used items
pub use client::TestClient;
pub use fixtures::*;
pub use server_harness::TestGameServer;
