//! `RegistryActor` - singleton supervisor for game actors.
//!
//! The `RegistryActor` is the top-level actor of the game server:
//!
//! - Singleton per server instance
//! - Tracks every live connection, joined or not
//! - Creates a `GameActor` on the first join for a name, and drops it when
//!   its last player leaves
//! - Owns the root `CancellationToken` for game actors
//! - Monitors game actor health (panic detection via `JoinHandle`)
//!
//! Game creation, membership changes and removal of an empty game all run as
//! single registry messages, so a join can never land on a game that is in
//! the middle of being dropped.
//!
//! # Graceful Shutdown
//!
//! On shutdown the registry:
//! 1. Sets `accepting_joins = false`
//! 2. Cancels the root `CancellationToken` (propagates to all games)
//! 3. Waits for game tasks to finish, bounded by the shutdown deadline

use crate::errors::GsError;

use super::game::{GameActor, GameActorHandle};
use super::messages::{
    ConnectionId, Delegate, GameInfo, GameJoin, JoinTicket, PlayerJoin, RegistryMessage,
    RegistryStatus,
};
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};
use super::session::SessionHandle;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Default channel buffer size for the registry mailbox.
const REGISTRY_CHANNEL_BUFFER: usize = 1000;

/// How long a removed game gets to finish its task.
const GAME_REMOVAL_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to the `RegistryActor`.
///
/// This is the public interface for sessions and the router.
/// All methods are async and return results via oneshot channels.
#[derive(Clone, Debug)]
pub struct RegistryActorHandle {
    sender: mpsc::Sender<RegistryMessage>,
    cancel_token: CancellationToken,
}

impl RegistryActorHandle {
    /// Record a new connection as unjoined.
    ///
    /// Returns the session's initial delegate.
    pub async fn register(
        &self,
        connection_id: ConnectionId,
        session: SessionHandle,
    ) -> Result<Delegate, GsError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(RegistryMessage::Register {
                connection_id,
                session,
                respond_to: tx,
            })
            .await
            .map_err(|e| GsError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| GsError::Internal(format!("response receive failed: {e}")))
    }

    /// Forget a connection, leaving its game if it had one.
    ///
    /// Returns `false` if the connection was not registered.
    pub async fn unregister(&self, connection_id: ConnectionId) -> Result<bool, GsError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(RegistryMessage::Unregister {
                connection_id,
                respond_to: tx,
            })
            .await
            .map_err(|e| GsError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| GsError::Internal(format!("response receive failed: {e}")))
    }

    /// Place a connection in the named game, creating the game if needed.
    pub async fn route_join(&self, ticket: JoinTicket) -> Result<GameJoin, GsError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(RegistryMessage::RouteJoin {
                ticket,
                respond_to: tx,
            })
            .await
            .map_err(|e| GsError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| GsError::Internal(format!("response receive failed: {e}")))?
    }

    /// Look up a live game.
    pub async fn get_game(&self, game_name: impl Into<String>) -> Result<Option<GameInfo>, GsError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(RegistryMessage::GetGame {
                game_name: game_name.into(),
                respond_to: tx,
            })
            .await
            .map_err(|e| GsError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| GsError::Internal(format!("response receive failed: {e}")))
    }

    /// Get the current registry status.
    pub async fn get_status(&self) -> Result<RegistryStatus, GsError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(RegistryMessage::GetStatus { respond_to: tx })
            .await
            .map_err(|e| GsError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| GsError::Internal(format!("response receive failed: {e}")))
    }

    /// Initiate graceful shutdown.
    pub async fn shutdown(&self, deadline: Duration) -> Result<(), GsError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(RegistryMessage::Shutdown {
                deadline,
                respond_to: tx,
            })
            .await
            .map_err(|e| GsError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| GsError::Internal(format!("response receive failed: {e}")))?
    }

    /// Cancel the actor (for immediate shutdown).
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the actor is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// Internal state for a managed game.
struct ManagedGame {
    /// Handle to the game actor.
    handle: GameActorHandle,
    /// Join handle for monitoring the actor task.
    task_handle: JoinHandle<()>,
    /// Game creation timestamp.
    created_at: i64,
}

/// What the registry knows about one connection.
struct Membership {
    /// Game the connection joined, if any.
    game: Option<String>,
    /// Outbound queue, handed to the game on join.
    session: SessionHandle,
}

/// The `RegistryActor` implementation.
pub struct RegistryActor {
    /// Server instance ID.
    server_id: String,
    /// Message receiver.
    receiver: mpsc::Receiver<RegistryMessage>,
    /// Cancellation token (root for game actors).
    cancel_token: CancellationToken,
    /// Live games by name.
    games: HashMap<String, ManagedGame>,
    /// Every registered connection.
    membership: HashMap<ConnectionId, Membership>,
    /// Registered connections that have not joined a game.
    unjoined: HashSet<ConnectionId>,
    /// Whether joins are still accepted.
    accepting_joins: bool,
    /// Deadline for game tasks once shutdown starts.
    shutdown_deadline: Duration,
    /// Roster capacity for new games.
    max_players_per_team: usize,
    /// Shared metrics.
    metrics: Arc<ActorMetrics>,
    /// Mailbox monitor.
    mailbox: MailboxMonitor,
}

impl RegistryActor {
    /// Spawn the registry actor.
    ///
    /// Returns a handle and the task join handle.
    pub fn spawn(
        server_id: String,
        max_players_per_team: usize,
        metrics: Arc<ActorMetrics>,
    ) -> (RegistryActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(REGISTRY_CHANNEL_BUFFER);
        let cancel_token = CancellationToken::new();

        let actor = Self {
            mailbox: MailboxMonitor::new(ActorType::Registry, &server_id),
            server_id,
            receiver,
            cancel_token: cancel_token.clone(),
            games: HashMap::new(),
            membership: HashMap::new(),
            unjoined: HashSet::new(),
            accepting_joins: true,
            shutdown_deadline: Duration::from_secs(30),
            max_players_per_team,
            metrics,
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = RegistryActorHandle {
            sender,
            cancel_token,
        };

        (handle, task_handle)
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "gs.actor.registry", fields(server_id = %self.server_id))]
    async fn run(mut self) {
        info!(
            target: "gs.actor.registry",
            server_id = %self.server_id,
            max_players_per_team = self.max_players_per_team,
            "RegistryActor started"
        );

        loop {
            // Check for terminated game actors
            self.check_game_health().await;

            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "gs.actor.registry",
                        server_id = %self.server_id,
                        "RegistryActor received cancellation signal"
                    );
                    self.graceful_shutdown().await;
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.mailbox.record_enqueue();
                            self.handle_message(message).await;
                            self.mailbox.record_dequeue();
                            self.metrics.record_message_processed();
                        }
                        None => {
                            info!(
                                target: "gs.actor.registry",
                                server_id = %self.server_id,
                                "RegistryActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "gs.actor.registry",
            server_id = %self.server_id,
            games_remaining = self.games.len(),
            connections_remaining = self.membership.len(),
            messages_processed = self.mailbox.messages_processed(),
            "RegistryActor stopped"
        );
    }

    /// Handle a single message.
    async fn handle_message(&mut self, message: RegistryMessage) {
        match message {
            RegistryMessage::Register {
                connection_id,
                session,
                respond_to,
            } => {
                let delegate = self.register(connection_id, session);
                let _ = respond_to.send(delegate);
            }

            RegistryMessage::Unregister {
                connection_id,
                respond_to,
            } => {
                let known = self.unregister(connection_id).await;
                let _ = respond_to.send(known);
            }

            RegistryMessage::RouteJoin { ticket, respond_to } => {
                let result = self.route_join(ticket).await;
                let _ = respond_to.send(result);
            }

            RegistryMessage::GetGame {
                game_name,
                respond_to,
            } => {
                let info = self.get_game(&game_name).await;
                let _ = respond_to.send(info);
            }

            RegistryMessage::GetStatus { respond_to } => {
                let _ = respond_to.send(self.get_status());
            }

            RegistryMessage::Shutdown {
                deadline,
                respond_to,
            } => {
                let result = self.initiate_shutdown(deadline);
                let _ = respond_to.send(result);
            }
        }
    }

    fn register(&mut self, connection_id: ConnectionId, session: SessionHandle) -> Delegate {
        if self.membership.contains_key(&connection_id) {
            warn!(
                target: "gs.actor.registry",
                server_id = %self.server_id,
                connection_id = %connection_id,
                "Connection registered twice, ignoring"
            );
            return Delegate::Unjoined;
        }

        self.membership.insert(
            connection_id,
            Membership {
                game: None,
                session,
            },
        );
        self.unjoined.insert(connection_id);

        debug!(
            target: "gs.actor.registry",
            server_id = %self.server_id,
            connection_id = %connection_id,
            registered = self.membership.len(),
            "Connection registered"
        );

        Delegate::Unjoined
    }

    /// Drop a connection, and its game if it was the last player.
    async fn unregister(&mut self, connection_id: ConnectionId) -> bool {
        let Some(member) = self.membership.remove(&connection_id) else {
            warn!(
                target: "gs.actor.registry",
                server_id = %self.server_id,
                connection_id = %connection_id,
                "Unregister for unknown connection"
            );
            return false;
        };

        self.unjoined.remove(&connection_id);

        if let Some(game_name) = member.game {
            let left = match self.games.get(&game_name) {
                Some(managed) => managed.handle.leave(connection_id).await,
                None => Err(GsError::Internal(format!("game {game_name} is gone"))),
            };

            match left {
                Ok(result) if result.remaining == 0 => {
                    self.remove_game(&game_name);
                }
                Ok(_) => {}
                Err(e) => {
                    debug!(
                        target: "gs.actor.registry",
                        server_id = %self.server_id,
                        connection_id = %connection_id,
                        game_name = %game_name,
                        error = %e,
                        "Leave skipped, game already stopped"
                    );
                }
            }
        }

        debug!(
            target: "gs.actor.registry",
            server_id = %self.server_id,
            connection_id = %connection_id,
            registered = self.membership.len(),
            "Connection unregistered"
        );

        true
    }

    /// Resolve the game for a join and forward the player to it.
    async fn route_join(&mut self, ticket: JoinTicket) -> Result<GameJoin, GsError> {
        if !self.accepting_joins {
            return Err(GsError::Draining);
        }

        let JoinTicket {
            connection_id,
            game_name,
            nick,
            team,
            correlation_id,
        } = ticket;

        let session = match self.membership.get(&connection_id) {
            None => return Err(GsError::NotRegistered(connection_id.to_string())),
            Some(member) if member.game.is_some() => {
                return Err(GsError::AlreadyJoined(connection_id.to_string()));
            }
            Some(member) => member.session.clone(),
        };

        let created = !self.games.contains_key(&game_name);
        let game = match self.games.get(&game_name) {
            Some(managed) => managed.handle.clone(),
            None => self.create_game(&game_name),
        };

        let request = PlayerJoin {
            connection_id,
            nick,
            team,
            session,
            correlation_id,
        };

        match game.join(request).await {
            Ok(joined) => {
                self.unjoined.remove(&connection_id);
                if let Some(member) = self.membership.get_mut(&connection_id) {
                    member.game = Some(game_name.clone());
                }

                Ok(GameJoin {
                    game_name,
                    game,
                    slot: joined.slot,
                    team: joined.team,
                    players: joined.players,
                })
            }
            Err(e) => {
                // A game created for this join must not outlive its rejection
                if created {
                    self.remove_game(&game_name);
                }
                Err(e)
            }
        }
    }

    fn create_game(&mut self, game_name: &str) -> GameActorHandle {
        let (handle, task_handle) = GameActor::spawn(
            game_name.to_string(),
            self.max_players_per_team,
            self.cancel_token.child_token(),
            Arc::clone(&self.metrics),
        );

        self.games.insert(
            game_name.to_string(),
            ManagedGame {
                handle: handle.clone(),
                task_handle,
                created_at: chrono::Utc::now().timestamp(),
            },
        );

        self.metrics.game_created();

        info!(
            target: "gs.actor.registry",
            server_id = %self.server_id,
            game_name = %game_name,
            total_games = self.games.len(),
            "Game actor created"
        );

        handle
    }

    /// Cancel a game and drop it from the map.
    ///
    /// The actor task is awaited in the background so the message loop
    /// never blocks on it.
    fn remove_game(&mut self, game_name: &str) {
        let Some(managed) = self.games.remove(game_name) else {
            return;
        };

        managed.handle.cancel();

        let game_name_owned = game_name.to_string();
        let server_id = self.server_id.clone();
        tokio::spawn(async move {
            match tokio::time::timeout(GAME_REMOVAL_TIMEOUT, managed.task_handle).await {
                Ok(Ok(())) => {
                    debug!(
                        target: "gs.actor.registry",
                        server_id = %server_id,
                        game_name = %game_name_owned,
                        "Game actor task completed cleanly"
                    );
                }
                Ok(Err(e)) => {
                    warn!(
                        target: "gs.actor.registry",
                        server_id = %server_id,
                        game_name = %game_name_owned,
                        error = ?e,
                        "Game actor task panicked during removal"
                    );
                }
                Err(_) => {
                    warn!(
                        target: "gs.actor.registry",
                        server_id = %server_id,
                        game_name = %game_name_owned,
                        "Game actor task cleanup timed out"
                    );
                }
            }
        });

        self.metrics.game_removed();

        info!(
            target: "gs.actor.registry",
            server_id = %self.server_id,
            game_name = %game_name,
            total_games = self.games.len(),
            "Game actor removed"
        );
    }

    /// Query a game for its live player count.
    async fn get_game(&self, game_name: &str) -> Option<GameInfo> {
        let managed = self.games.get(game_name)?;

        let player_count = match managed.handle.players_count().await {
            Ok(count) => count,
            Err(_) => {
                warn!(
                    target: "gs.actor.registry",
                    server_id = %self.server_id,
                    game_name = %game_name,
                    "Failed to query game actor, reporting no players"
                );
                0
            }
        };

        Some(GameInfo {
            game_name: game_name.to_string(),
            player_count,
            created_at: managed.created_at,
        })
    }

    fn get_status(&self) -> RegistryStatus {
        RegistryStatus {
            game_count: self.games.len(),
            registered_count: self.membership.len(),
            unjoined_count: self.unjoined.len(),
            session_count: self.metrics.session_count(),
            is_draining: !self.accepting_joins,
            mailbox_depth: self.mailbox.current_depth(),
        }
    }

    /// Stop accepting joins and cancel every game.
    fn initiate_shutdown(&mut self, deadline: Duration) -> Result<(), GsError> {
        info!(
            target: "gs.actor.registry",
            server_id = %self.server_id,
            game_count = self.games.len(),
            deadline_seconds = deadline.as_secs(),
            "Initiating graceful shutdown"
        );

        self.accepting_joins = false;
        self.shutdown_deadline = deadline;

        // Cancel the root token (propagates to all games)
        self.cancel_token.cancel();

        Ok(())
    }

    /// Wait for every game task, sharing one deadline.
    async fn graceful_shutdown(&mut self) {
        info!(
            target: "gs.actor.registry",
            server_id = %self.server_id,
            game_count = self.games.len(),
            "Performing graceful shutdown"
        );

        self.accepting_joins = false;

        for managed in self.games.values() {
            managed.handle.cancel();
        }

        for (connection_id, membership) in &self.membership {
            if let Err(e) = membership.session.close("server shutting down") {
                debug!(
                    target: "gs.actor.registry",
                    connection_id = %connection_id,
                    error = %e,
                    "Session already closed"
                );
            }
        }

        let deadline = tokio::time::Instant::now() + self.shutdown_deadline;
        for (game_name, managed) in self.games.drain() {
            match tokio::time::timeout_at(deadline, managed.task_handle).await {
                Ok(Ok(())) => {
                    debug!(
                        target: "gs.actor.registry",
                        server_id = %self.server_id,
                        game_name = %game_name,
                        "Game actor completed cleanly"
                    );
                }
                Ok(Err(e)) => {
                    warn!(
                        target: "gs.actor.registry",
                        server_id = %self.server_id,
                        game_name = %game_name,
                        error = ?e,
                        "Game actor task panicked during shutdown"
                    );
                }
                Err(_) => {
                    warn!(
                        target: "gs.actor.registry",
                        server_id = %self.server_id,
                        game_name = %game_name,
                        "Game actor shutdown timed out"
                    );
                }
            }
            self.metrics.game_removed();
        }

        info!(
            target: "gs.actor.registry",
            server_id = %self.server_id,
            "Graceful shutdown complete"
        );
    }

    /// Reap game actors whose task ended on its own.
    async fn check_game_health(&mut self) {
        let finished: Vec<String> = self
            .games
            .iter()
            .filter(|(_, managed)| managed.task_handle.is_finished())
            .map(|(game_name, _)| game_name.clone())
            .collect();

        for game_name in finished {
            let Some(managed) = self.games.remove(&game_name) else {
                continue;
            };

            warn!(
                target: "gs.actor.registry",
                server_id = %self.server_id,
                game_name = %game_name,
                "Game actor task finished unexpectedly"
            );

            if let Err(join_error) = managed.task_handle.await {
                if join_error.is_panic() {
                    error!(
                        target: "gs.actor.registry",
                        server_id = %self.server_id,
                        game_name = %game_name,
                        error = ?join_error,
                        "Game actor panicked"
                    );
                    self.metrics.record_panic(ActorType::Game);
                }
            }

            let mut closed = 0usize;
            for (connection_id, membership) in &self.membership {
                if membership.game.as_deref() != Some(game_name.as_str()) {
                    continue;
                }
                if let Err(e) = membership.session.close("game stopped") {
                    debug!(
                        target: "gs.actor.registry",
                        connection_id = %connection_id,
                        error = %e,
                        "Member session already closed"
                    );
                }
                closed += 1;
            }

            debug!(
                target: "gs.actor.registry",
                server_id = %self.server_id,
                game_name = %game_name,
                sessions_closed = closed,
                "Closed members of stopped game"
            );
            self.metrics.game_removed();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::actors::messages::SessionCommand;
    use game_protocol::{Team, TeamPreference};
    use tokio::sync::mpsc::UnboundedReceiver;

    fn spawn_registry() -> (RegistryActorHandle, JoinHandle<()>, Arc<ActorMetrics>) {
        let metrics = ActorMetrics::new();
        let (handle, task) = RegistryActor::spawn("gs-test".to_string(), 5, Arc::clone(&metrics));
        (handle, task, metrics)
    }

    async fn connect(
        registry: &RegistryActorHandle,
        id: u64,
    ) -> (ConnectionId, UnboundedReceiver<SessionCommand>) {
        let connection_id = ConnectionId::new(id);
        let (session, outbox) = SessionHandle::detached(connection_id);
        let delegate = registry.register(connection_id, session).await.unwrap();
        assert!(delegate.game_name().is_none());
        (connection_id, outbox)
    }

    fn ticket(connection_id: ConnectionId, game: &str, team: TeamPreference) -> JoinTicket {
        JoinTicket {
            connection_id,
            game_name: game.to_string(),
            nick: format!("nick-{}", connection_id.as_u64()),
            team,
            correlation_id: None,
        }
    }

    #[tokio::test]
    async fn test_register_counts_unjoined() {
        let (registry, _task, _metrics) = spawn_registry();
        let _a = connect(&registry, 1).await;
        let _b = connect(&registry, 2).await;

        let status = registry.get_status().await.unwrap();
        assert_eq!(status.registered_count, 2);
        assert_eq!(status.unjoined_count, 2);
        assert_eq!(status.game_count, 0);
        assert!(!status.is_draining);

        registry.cancel();
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let (registry, _task, metrics) = spawn_registry();

        // Twice while unjoined
        let (a, _outbox_a) = connect(&registry, 1).await;
        let (again, _outbox_again) = SessionHandle::detached(a);
        let delegate = registry.register(a, again).await.unwrap();
        assert!(delegate.game_name().is_none());

        let status = registry.get_status().await.unwrap();
        assert_eq!(status.registered_count, 1);
        assert_eq!(status.unjoined_count, 1);

        // Again after joining: membership is kept
        registry
            .route_join(ticket(a, "g1", TeamPreference::Random))
            .await
            .unwrap();
        let (late, _outbox_late) = SessionHandle::detached(a);
        let delegate = registry.register(a, late).await.unwrap();
        assert!(delegate.game_name().is_none());

        let status = registry.get_status().await.unwrap();
        assert_eq!(status.registered_count, 1);
        assert_eq!(status.unjoined_count, 0);
        assert_eq!(status.game_count, 1);

        assert!(registry.unregister(a).await.unwrap());
        let status = registry.get_status().await.unwrap();
        assert_eq!(status.registered_count, 0);
        assert_eq!(status.game_count, 0);
        assert!(registry.get_game("g1").await.unwrap().is_none());
        assert_eq!(metrics.game_count(), 0);

        registry.cancel();
    }

    #[tokio::test]
    async fn test_first_join_creates_game() {
        let (registry, _task, metrics) = spawn_registry();
        let (id, _outbox) = connect(&registry, 1).await;

        let join = registry
            .route_join(ticket(id, "g1", TeamPreference::Random))
            .await
            .unwrap();
        assert_eq!(join.game_name, "g1");
        assert_eq!(join.slot, 0);
        assert_eq!(join.team, Team::First);
        assert_eq!(join.delegate().game_name(), Some("g1"));

        let info = registry.get_game("g1").await.unwrap().unwrap();
        assert_eq!(info.player_count, 1);
        assert_eq!(metrics.game_count(), 1);

        let status = registry.get_status().await.unwrap();
        assert_eq!(status.unjoined_count, 0);
        assert_eq!(status.registered_count, 1);

        registry.cancel();
    }

    #[tokio::test]
    async fn test_join_requires_registration() {
        let (registry, _task, _metrics) = spawn_registry();

        let result = registry
            .route_join(ticket(ConnectionId::new(7), "g1", TeamPreference::Random))
            .await;
        assert!(matches!(result, Err(GsError::NotRegistered(_))));
        assert!(registry.get_game("g1").await.unwrap().is_none());

        registry.cancel();
    }

    #[tokio::test]
    async fn test_second_join_from_same_connection_rejected() {
        let (registry, _task, _metrics) = spawn_registry();
        let (id, _outbox) = connect(&registry, 1).await;

        registry
            .route_join(ticket(id, "g1", TeamPreference::Random))
            .await
            .unwrap();
        let result = registry
            .route_join(ticket(id, "g2", TeamPreference::Random))
            .await;
        assert!(matches!(result, Err(GsError::AlreadyJoined(_))));

        // The rejected join did not leave an empty game behind
        assert!(registry.get_game("g2").await.unwrap().is_none());

        registry.cancel();
    }

    #[tokio::test]
    async fn test_full_team_is_rejected_without_side_effects() {
        let (registry, _task, _metrics) = spawn_registry();
        let mut outboxes = Vec::new();

        for n in 1..=5 {
            let (id, outbox) = connect(&registry, n).await;
            outboxes.push(outbox);
            registry
                .route_join(ticket(id, "g1", TeamPreference::First))
                .await
                .unwrap();
        }

        let (id, _outbox) = connect(&registry, 6).await;
        let result = registry
            .route_join(ticket(id, "g1", TeamPreference::First))
            .await;
        assert!(matches!(result, Err(GsError::GameFull(_))));

        let info = registry.get_game("g1").await.unwrap().unwrap();
        assert_eq!(info.player_count, 5);

        // Still unjoined, so a retry elsewhere works
        let status = registry.get_status().await.unwrap();
        assert_eq!(status.unjoined_count, 1);
        registry
            .route_join(ticket(id, "g2", TeamPreference::First))
            .await
            .unwrap();

        registry.cancel();
    }

    #[tokio::test]
    async fn test_last_leave_destroys_game() {
        let (registry, _task, metrics) = spawn_registry();
        let (a, _outbox_a) = connect(&registry, 1).await;
        let (b, _outbox_b) = connect(&registry, 2).await;

        registry
            .route_join(ticket(a, "g1", TeamPreference::Random))
            .await
            .unwrap();
        registry
            .route_join(ticket(b, "g1", TeamPreference::Random))
            .await
            .unwrap();

        assert!(registry.unregister(a).await.unwrap());
        let info = registry.get_game("g1").await.unwrap().unwrap();
        assert_eq!(info.player_count, 1);

        assert!(registry.unregister(b).await.unwrap());
        assert!(registry.get_game("g1").await.unwrap().is_none());
        assert_eq!(metrics.game_count(), 0);

        // Same name creates a fresh game
        let (c, _outbox_c) = connect(&registry, 3).await;
        let join = registry
            .route_join(ticket(c, "g1", TeamPreference::Random))
            .await
            .unwrap();
        assert_eq!(join.slot, 0);
        assert_eq!(join.players.len(), 1);

        registry.cancel();
    }

    #[tokio::test]
    async fn test_unregister_is_idempotent() {
        let (registry, _task, _metrics) = spawn_registry();
        let (id, _outbox) = connect(&registry, 1).await;

        assert!(registry.unregister(id).await.unwrap());
        assert!(!registry.unregister(id).await.unwrap());

        let status = registry.get_status().await.unwrap();
        assert_eq!(status.registered_count, 0);
        assert_eq!(status.unjoined_count, 0);

        registry.cancel();
    }

    #[tokio::test]
    async fn test_concurrent_joins_to_new_game_create_one_game() {
        let (registry, _task, metrics) = spawn_registry();
        let mut outboxes = Vec::new();
        let mut ids = Vec::new();
        for n in 1..=8 {
            let (id, outbox) = connect(&registry, n).await;
            outboxes.push(outbox);
            ids.push(id);
        }

        let joins: Vec<_> = ids
            .into_iter()
            .map(|id| {
                let registry = registry.clone();
                tokio::spawn(async move {
                    registry
                        .route_join(ticket(id, "race", TeamPreference::Random))
                        .await
                })
            })
            .collect();

        let mut slots = Vec::new();
        for join in joins {
            slots.push(join.await.unwrap().unwrap().slot);
        }
        slots.sort_unstable();

        assert_eq!(slots, (0..8).collect::<Vec<u32>>());
        assert_eq!(metrics.game_count(), 1);
        let info = registry.get_game("race").await.unwrap().unwrap();
        assert_eq!(info.player_count, 8);

        registry.cancel();
    }

    #[tokio::test]
    async fn test_stopped_game_is_reaped_and_members_closed() {
        let (registry, _task, metrics) = spawn_registry();
        let (a, mut outbox_a) = connect(&registry, 1).await;
        let join = registry
            .route_join(ticket(a, "g1", TeamPreference::Random))
            .await
            .unwrap();

        let delegate = join.delegate();
        assert!(matches!(delegate, Delegate::InGame { .. }));
        let Delegate::InGame { game, .. } = delegate else {
            return;
        };
        game.cancel();

        let mut game_count = 1;
        for _ in 0..100 {
            game_count = registry.get_status().await.unwrap().game_count;
            if game_count == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(game_count, 0);
        assert_eq!(metrics.game_count(), 0);
        assert!(registry.get_game("g1").await.unwrap().is_none());

        let mut close_requested = false;
        while let Ok(command) = outbox_a.try_recv() {
            close_requested |= matches!(command, SessionCommand::Close { .. });
        }
        assert!(close_requested);

        registry.cancel();
    }

    #[tokio::test]
    async fn test_shutdown_stops_joins_and_games() {
        let (registry, task, metrics) = spawn_registry();
        let (a, mut outbox_a) = connect(&registry, 1).await;
        registry
            .route_join(ticket(a, "g1", TeamPreference::Random))
            .await
            .unwrap();

        registry.shutdown(Duration::from_secs(5)).await.unwrap();
        assert!(registry.is_cancelled());

        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(metrics.game_count(), 0);

        // Registered sessions were asked to close
        let mut close_requested = false;
        while let Ok(command) = outbox_a.try_recv() {
            close_requested |= matches!(command, SessionCommand::Close { .. });
        }
        assert!(close_requested);

        // The actor is gone, so further requests fail
        assert!(registry.get_status().await.is_err());
    }
}
