//! Test server harness for end-to-end tests.
//!
//! Provides `TestGameServer` for spawning real game server instances in tests.

use game_server::actors::RegistryActorHandle;
use game_server::config::Config;
use game_server::server::GameServer;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

/// Test harness for spawning the game server in tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_join_e2e() -> anyhow::Result<()> {
///     let server = TestGameServer::spawn().await?;
///     let mut client = TestClient::connect(&server.url()).await?;
///     // ...
///     server.shutdown().await
/// }
/// ```
pub struct TestGameServer {
    addr: SocketAddr,
    server: GameServer,
}

impl TestGameServer {
    /// Spawn a server with default settings.
    ///
    /// The server binds to a random available port (127.0.0.1:0).
    pub async fn spawn() -> Result<Self, anyhow::Error> {
        Self::spawn_with(HashMap::new()).await
    }

    /// Spawn a server with extra `GS_*` variables layered over the test
    /// defaults.
    pub async fn spawn_with(overrides: HashMap<String, String>) -> Result<Self, anyhow::Error> {
        let mut vars = HashMap::from([
            ("GS_BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
            ("GS_SERVER_ID".to_string(), "gs-test".to_string()),
            ("GS_HANDSHAKE_TIMEOUT_SECONDS".to_string(), "5".to_string()),
        ]);
        vars.extend(overrides);

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let server = GameServer::start(&config)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to start game server: {}", e))?;

        Ok(Self {
            addr: server.local_addr(),
            server,
        })
    }

    /// Get the server's bound address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// WebSocket URL of the server.
    pub fn url(&self) -> String {
        format!("ws://{}/", self.addr)
    }

    /// Registry handle, for inspecting games and connections.
    pub fn registry(&self) -> &RegistryActorHandle {
        self.server.registry()
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.server.context().metrics().session_count()
    }

    /// Poll until no game named `game_name` exists, or fail after `timeout`.
    pub async fn wait_for_game_removed(
        &self,
        game_name: &str,
        timeout: Duration,
    ) -> Result<(), anyhow::Error> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let game = self
                .registry()
                .get_game(game_name)
                .await
                .map_err(|e| anyhow::anyhow!("Registry query failed: {}", e))?;
            if game.is_none() {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                anyhow::bail!("game {game_name} still exists after {timeout:?}");
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Gracefully stop the server.
    pub async fn shutdown(self) -> Result<(), anyhow::Error> {
        self.server
            .shutdown(Duration::from_secs(5))
            .await
            .map_err(|e| anyhow::anyhow!("Shutdown failed: {}", e))
    }
}
