//! Server assembly: registry, acceptor and the context every session shares.
//!
//! Nothing here is global. Each `GameServer` builds its own registry,
//! connection id allocator and shutdown token, so tests can run any number
//! of independent servers in one process.

use crate::acceptor::Acceptor;
use crate::actors::{
    ActorMetrics, ActorType, ConnectionId, RegistryActor, RegistryActorHandle, SessionActor,
    SessionContext,
};
use crate::config::Config;
use crate::errors::GsError;
use crate::observability::HealthState;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// How often shutdown re-checks the live session count.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// State shared by the acceptor and every session.
#[derive(Debug)]
pub struct ServerContext {
    session: SessionContext,
    next_connection_id: AtomicU64,
}

impl ServerContext {
    /// Build a context. Sessions get child tokens of `sessions_token`.
    #[must_use]
    pub fn new(
        registry: RegistryActorHandle,
        metrics: Arc<ActorMetrics>,
        sessions_token: CancellationToken,
        handshake_timeout: Duration,
    ) -> Self {
        Self {
            session: SessionContext {
                registry,
                metrics,
                cancel_token: sessions_token,
                handshake_timeout,
            },
            next_connection_id: AtomicU64::new(1),
        }
    }

    /// Allocate a connection id; ids are never reused within a process.
    pub fn next_connection_id(&self) -> ConnectionId {
        ConnectionId::new(self.next_connection_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Start a session over an accepted stream.
    pub fn spawn_session<S>(&self, stream: S, peer: Option<SocketAddr>) -> ConnectionId
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let connection_id = self.next_connection_id();
        let (_handle, task_handle) =
            SessionActor::spawn(stream, connection_id, peer, &self.session);

        // A panicking session never reaches its own cleanup
        let metrics = Arc::clone(&self.session.metrics);
        tokio::spawn(async move {
            if let Err(join_error) = task_handle.await {
                if join_error.is_panic() {
                    error!(
                        target: "gs.actor.session",
                        connection_id = %connection_id,
                        error = ?join_error,
                        "Session actor panicked"
                    );
                    metrics.record_panic(ActorType::Session);
                    metrics.session_closed();
                }
            }
        });

        connection_id
    }

    /// Registry handle.
    #[must_use]
    pub fn registry(&self) -> &RegistryActorHandle {
        &self.session.registry
    }

    /// Shared actor metrics.
    #[must_use]
    pub fn metrics(&self) -> &Arc<ActorMetrics> {
        &self.session.metrics
    }
}

/// A running game server.
pub struct GameServer {
    server_id: String,
    local_addr: SocketAddr,
    context: Arc<ServerContext>,
    shutdown_token: CancellationToken,
    health: HealthState,
    acceptor_task: JoinHandle<()>,
    registry_task: JoinHandle<()>,
}

impl GameServer {
    /// Spawn the registry and start accepting on `config.bind_address`.
    ///
    /// # Errors
    ///
    /// `GsError::Transport` if the listener cannot be bound.
    pub async fn start(config: &Config) -> Result<Self, GsError> {
        let metrics = ActorMetrics::new();
        let (registry, registry_task) = RegistryActor::spawn(
            config.server_id.clone(),
            config.max_players_per_team,
            Arc::clone(&metrics),
        );

        let shutdown_token = CancellationToken::new();
        let context = Arc::new(ServerContext::new(
            registry.clone(),
            metrics,
            shutdown_token.child_token(),
            Duration::from_secs(config.handshake_timeout_seconds),
        ));

        let acceptor = match Acceptor::bind(config.bind_address, Arc::clone(&context)).await {
            Ok(acceptor) => acceptor,
            Err(e) => {
                registry.cancel();
                return Err(e);
            }
        };
        let local_addr = acceptor.local_addr()?;

        let health = HealthState::new(shutdown_token.clone());
        health.mark_listening();

        let acceptor_task = tokio::spawn(acceptor.run(shutdown_token.child_token()));

        info!(
            target: "gs.server",
            server_id = %config.server_id,
            addr = %local_addr,
            max_players_per_team = config.max_players_per_team,
            "Game server listening"
        );

        Ok(Self {
            server_id: config.server_id.clone(),
            local_addr,
            context,
            shutdown_token,
            health,
            acceptor_task,
            registry_task,
        })
    }

    /// Address the WebSocket listener is bound to.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Shared server context.
    #[must_use]
    pub fn context(&self) -> &Arc<ServerContext> {
        &self.context
    }

    /// Registry handle.
    #[must_use]
    pub fn registry(&self) -> &RegistryActorHandle {
        self.context.registry()
    }

    /// Readiness view for the health endpoints.
    #[must_use]
    pub fn health(&self) -> HealthState {
        self.health.clone()
    }

    /// Stop accepting, close every session, then stop the registry.
    ///
    /// Sessions get until `timeout` to send their closing warning and
    /// unregister; whatever remains after that is abandoned.
    pub async fn shutdown(self, timeout: Duration) -> Result<(), GsError> {
        let deadline = tokio::time::Instant::now() + timeout;

        info!(
            target: "gs.server",
            server_id = %self.server_id,
            sessions = self.context.metrics().session_count(),
            games = self.context.metrics().game_count(),
            "Shutting down game server"
        );

        self.shutdown_token.cancel();

        if tokio::time::timeout_at(deadline, self.acceptor_task)
            .await
            .is_err()
        {
            warn!(target: "gs.server", server_id = %self.server_id, "Acceptor did not stop in time");
        }

        while self.context.metrics().session_count() > 0 {
            if tokio::time::Instant::now() >= deadline {
                warn!(
                    target: "gs.server",
                    server_id = %self.server_id,
                    sessions_remaining = self.context.metrics().session_count(),
                    "Sessions did not drain before the deadline"
                );
                break;
            }
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }

        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        let result = self.context.registry().shutdown(remaining).await;

        match tokio::time::timeout(remaining + Duration::from_secs(1), self.registry_task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(target: "gs.server", server_id = %self.server_id, error = ?e, "Registry task failed");
            }
            Err(_) => {
                warn!(target: "gs.server", server_id = %self.server_id, "Registry did not stop in time");
            }
        }

        info!(target: "gs.server", server_id = %self.server_id, "Game server stopped");
        result
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn test_config() -> Config {
        let vars = HashMap::from([
            ("GS_BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
            ("GS_SERVER_ID".to_string(), "gs-unit".to_string()),
        ]);
        Config::from_vars(&vars).unwrap()
    }

    #[tokio::test]
    async fn test_connection_ids_are_unique_and_increasing() {
        let (registry, _task) = RegistryActor::spawn("gs-unit".to_string(), 5, ActorMetrics::new());
        let context = ServerContext::new(
            registry,
            ActorMetrics::new(),
            CancellationToken::new(),
            Duration::from_secs(1),
        );

        let a = context.next_connection_id();
        let b = context.next_connection_id();
        assert_eq!(a.as_u64(), 1);
        assert!(b > a);
    }

    #[tokio::test]
    async fn test_start_binds_ephemeral_port_and_shuts_down() {
        let server = GameServer::start(&test_config()).await.unwrap();
        assert_ne!(server.local_addr().port(), 0);

        let health = server.health();
        assert!(health.is_ready());

        let status = server.registry().get_status().await.unwrap();
        assert_eq!(status.game_count, 0);

        server.shutdown(Duration::from_secs(5)).await.unwrap();
        assert!(!health.is_ready());
    }

    #[tokio::test]
    async fn test_start_fails_on_taken_port() {
        let first = GameServer::start(&test_config()).await.unwrap();

        let mut config = test_config();
        config.bind_address = first.local_addr();
        let result = GameServer::start(&config).await;
        assert!(matches!(result, Err(GsError::Transport(_))));

        first.shutdown(Duration::from_secs(5)).await.unwrap();
    }
}
