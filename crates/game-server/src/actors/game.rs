//! `GameActor` - per-game actor that owns the two team rosters.
//!
//! Each `GameActor`:
//! - Owns the first and second team rosters of one named game
//! - Places joining players on a team, balancing `random` requests
//! - Relays every broadcast to all current members, sender included
//! - Reports its player count so the registry can drop it when empty
//!
//! Because every operation is one mailbox message, team selection and
//! insertion cannot interleave with another join, and all members observe
//! broadcasts in the same order.

use crate::errors::GsError;
use crate::observability::metrics as prom;

use super::messages::{
    ConnectionId, GameMessage, GameState, JoinedPlayer, LeaveResult, PlayerJoin,
};
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};
use super::session::SessionHandle;

use game_protocol::{encode_message, Package, PlayerInfo, ServerMessage, Team, TeamPreference};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Default channel buffer size for the game mailbox.
const GAME_CHANNEL_BUFFER: usize = 500;

/// Handle to a `GameActor`.
#[derive(Clone, Debug)]
pub struct GameActorHandle {
    sender: mpsc::Sender<GameMessage>,
    cancel_token: CancellationToken,
    game_name: String,
}

impl GameActorHandle {
    /// Get the game name.
    #[must_use]
    pub fn game_name(&self) -> &str {
        &self.game_name
    }

    /// Place a player on a team.
    ///
    /// On success the player's `join-result` has already been queued on its
    /// session, ahead of any broadcast that follows.
    ///
    /// # Errors
    ///
    /// `GsError::AlreadyJoined` if the connection is already a member,
    /// `GsError::GameFull` if the resolved team has no room.
    pub async fn join(&self, request: PlayerJoin) -> Result<JoinedPlayer, GsError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(GameMessage::Join {
                request,
                respond_to: tx,
            })
            .await
            .map_err(|e| GsError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| GsError::Internal(format!("response receive failed: {e}")))?
    }

    /// Remove a connection from the game.
    pub async fn leave(&self, connection_id: ConnectionId) -> Result<LeaveResult, GsError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(GameMessage::Leave {
                connection_id,
                respond_to: tx,
            })
            .await
            .map_err(|e| GsError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| GsError::Internal(format!("response receive failed: {e}")))
    }

    /// Relay a package to every member.
    pub async fn broadcast(&self, package: Package) -> Result<(), GsError> {
        self.sender
            .send(GameMessage::Broadcast { package })
            .await
            .map_err(|e| GsError::Internal(format!("channel send failed: {e}")))
    }

    /// Number of players in both teams.
    pub async fn players_count(&self) -> Result<usize, GsError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(GameMessage::GetPlayersCount { respond_to: tx })
            .await
            .map_err(|e| GsError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| GsError::Internal(format!("response receive failed: {e}")))
    }

    /// Get the current game state.
    pub async fn get_state(&self) -> Result<GameState, GsError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(GameMessage::GetState { respond_to: tx })
            .await
            .map_err(|e| GsError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| GsError::Internal(format!("response receive failed: {e}")))
    }

    /// Cancel the game actor.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the actor is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// A member of one roster.
#[derive(Debug, Clone)]
struct Player {
    slot: u32,
    nick: String,
    session: SessionHandle,
}

/// One team's members, keyed by connection.
#[derive(Debug)]
struct Roster {
    team: Team,
    players: BTreeMap<ConnectionId, Player>,
}

impl Roster {
    fn new(team: Team) -> Self {
        Self {
            team,
            players: BTreeMap::new(),
        }
    }

    fn len(&self) -> usize {
        self.players.len()
    }

    fn infos(&self) -> impl Iterator<Item = PlayerInfo> + '_ {
        self.players.values().map(|player| PlayerInfo {
            id: player.slot,
            nick: player.nick.clone(),
            team: self.team,
        })
    }
}

/// The `GameActor` implementation.
pub struct GameActor {
    /// Game name (registry key).
    game_name: String,
    /// Message receiver.
    receiver: mpsc::Receiver<GameMessage>,
    /// Cancellation token (child of the registry's token).
    cancel_token: CancellationToken,
    /// Roster capacity per team.
    max_players_per_team: usize,
    /// First team.
    first_team: Roster,
    /// Second team.
    second_team: Roster,
    /// Which roster each member is on; mirrors the rosters exactly.
    team_of: HashMap<ConnectionId, Team>,
    /// Shared metrics.
    metrics: Arc<ActorMetrics>,
    /// Mailbox monitor.
    mailbox: MailboxMonitor,
    /// Creation timestamp.
    created_at: i64,
}

impl GameActor {
    /// Spawn a new game actor.
    ///
    /// Returns a handle and the task join handle.
    pub fn spawn(
        game_name: String,
        max_players_per_team: usize,
        cancel_token: CancellationToken,
        metrics: Arc<ActorMetrics>,
    ) -> (GameActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(GAME_CHANNEL_BUFFER);

        let actor = Self {
            game_name: game_name.clone(),
            receiver,
            cancel_token: cancel_token.clone(),
            max_players_per_team,
            first_team: Roster::new(Team::First),
            second_team: Roster::new(Team::Second),
            team_of: HashMap::new(),
            metrics,
            mailbox: MailboxMonitor::new(ActorType::Game, &game_name),
            created_at: chrono::Utc::now().timestamp(),
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = GameActorHandle {
            sender,
            cancel_token,
            game_name,
        };

        (handle, task_handle)
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "gs.actor.game", fields(game_name = %self.game_name))]
    async fn run(mut self) {
        debug!(
            target: "gs.actor.game",
            game_name = %self.game_name,
            max_players_per_team = self.max_players_per_team,
            "GameActor started"
        );

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(
                        target: "gs.actor.game",
                        game_name = %self.game_name,
                        "GameActor received cancellation signal"
                    );
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.mailbox.record_enqueue();
                            self.handle_message(message);
                            self.mailbox.record_dequeue();
                            self.metrics.record_message_processed();
                        }
                        None => {
                            debug!(
                                target: "gs.actor.game",
                                game_name = %self.game_name,
                                "GameActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "gs.actor.game",
            game_name = %self.game_name,
            players_remaining = self.players_count(),
            messages_processed = self.mailbox.messages_processed(),
            "GameActor stopped"
        );
    }

    /// Handle a single message.
    fn handle_message(&mut self, message: GameMessage) {
        match message {
            GameMessage::Join {
                request,
                respond_to,
            } => {
                let result = self.handle_join(request);
                let _ = respond_to.send(result);
            }

            GameMessage::Leave {
                connection_id,
                respond_to,
            } => {
                let result = self.handle_leave(connection_id);
                let _ = respond_to.send(result);
            }

            GameMessage::Broadcast { package } => {
                self.handle_broadcast(&package);
            }

            GameMessage::GetPlayersCount { respond_to } => {
                let _ = respond_to.send(self.players_count());
            }

            GameMessage::GetState { respond_to } => {
                let _ = respond_to.send(self.get_state());
            }
        }
    }

    /// Place a player, then queue its `join-result`.
    fn handle_join(&mut self, request: PlayerJoin) -> Result<JoinedPlayer, GsError> {
        let PlayerJoin {
            connection_id,
            nick,
            team,
            session,
            correlation_id,
        } = request;

        if self.team_of.contains_key(&connection_id) {
            warn!(
                target: "gs.actor.game",
                game_name = %self.game_name,
                connection_id = %connection_id,
                "Connection is already a member"
            );
            return Err(GsError::AlreadyJoined(connection_id.to_string()));
        }

        let resolved = self.resolve_team(team);
        if self.roster(resolved).len() >= self.max_players_per_team {
            debug!(
                target: "gs.actor.game",
                game_name = %self.game_name,
                connection_id = %connection_id,
                requested = team.as_str(),
                resolved = resolved.as_str(),
                "Team is full"
            );
            return Err(GsError::GameFull(self.game_name.clone()));
        }

        let slot = self.next_free_slot();
        let mut players = self.snapshot();
        players.push(PlayerInfo {
            id: slot,
            nick: nick.clone(),
            team: resolved,
        });
        players.sort_by_key(|player| player.id);

        // Encode before inserting so a failure leaves the rosters untouched
        let welcome = encode_message(&ServerMessage::joined(
            correlation_id,
            slot,
            players.clone(),
        ))?;

        self.roster_mut(resolved).players.insert(
            connection_id,
            Player {
                slot,
                nick,
                session: session.clone(),
            },
        );
        self.team_of.insert(connection_id, resolved);

        if let Err(e) = session.write(welcome) {
            // Session is tearing down; its unregister will remove the player
            debug!(
                target: "gs.actor.game",
                game_name = %self.game_name,
                connection_id = %connection_id,
                error = %e,
                "Could not queue join result"
            );
        }

        info!(
            target: "gs.actor.game",
            game_name = %self.game_name,
            connection_id = %connection_id,
            slot = slot,
            team = resolved.as_str(),
            first_team_size = self.first_team.len(),
            second_team_size = self.second_team.len(),
            "Player joined"
        );

        Ok(JoinedPlayer {
            slot,
            team: resolved,
            players,
        })
    }

    /// Remove a player from whichever roster holds it.
    fn handle_leave(&mut self, connection_id: ConnectionId) -> LeaveResult {
        let removed = match self.team_of.remove(&connection_id) {
            Some(team) => self.roster_mut(team).players.remove(&connection_id).is_some(),
            None => false,
        };

        let remaining = self.players_count();

        if removed {
            info!(
                target: "gs.actor.game",
                game_name = %self.game_name,
                connection_id = %connection_id,
                players_remaining = remaining,
                "Player left"
            );
        } else {
            debug!(
                target: "gs.actor.game",
                game_name = %self.game_name,
                connection_id = %connection_id,
                "Leave for a connection that is not a member"
            );
        }

        LeaveResult { removed, remaining }
    }

    /// Queue the same package on every member's session.
    fn handle_broadcast(&self, package: &Package) {
        let mut delivered = 0usize;

        for player in self
            .first_team
            .players
            .values()
            .chain(self.second_team.players.values())
        {
            match player.session.write(package.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    debug!(
                        target: "gs.actor.game",
                        game_name = %self.game_name,
                        connection_id = %player.session.connection_id(),
                        error = %e,
                        "Skipping closed session"
                    );
                }
            }
        }

        prom::record_broadcast(delivered);

        debug!(
            target: "gs.actor.game",
            game_name = %self.game_name,
            recipients = delivered,
            bytes = package.len(),
            "Broadcast relayed"
        );
    }

    /// `random` goes to the strictly smaller roster, ties to the first team.
    fn resolve_team(&self, preference: TeamPreference) -> Team {
        match preference {
            TeamPreference::First => Team::First,
            TeamPreference::Second => Team::Second,
            TeamPreference::Random => {
                if self.second_team.len() < self.first_team.len() {
                    Team::Second
                } else {
                    Team::First
                }
            }
        }
    }

    /// Lowest slot id not held by a current member.
    fn next_free_slot(&self) -> u32 {
        let used: BTreeSet<u32> = self
            .first_team
            .players
            .values()
            .chain(self.second_team.players.values())
            .map(|player| player.slot)
            .collect();

        let mut slot = 0;
        while used.contains(&slot) {
            slot += 1;
        }
        slot
    }

    fn roster(&self, team: Team) -> &Roster {
        match team {
            Team::First => &self.first_team,
            Team::Second => &self.second_team,
        }
    }

    fn roster_mut(&mut self, team: Team) -> &mut Roster {
        match team {
            Team::First => &mut self.first_team,
            Team::Second => &mut self.second_team,
        }
    }

    fn players_count(&self) -> usize {
        self.first_team.len() + self.second_team.len()
    }

    /// All members ordered by slot.
    fn snapshot(&self) -> Vec<PlayerInfo> {
        let mut players: Vec<PlayerInfo> = self
            .first_team
            .infos()
            .chain(self.second_team.infos())
            .collect();
        players.sort_by_key(|player| player.id);
        players
    }

    fn get_state(&self) -> GameState {
        GameState {
            game_name: self.game_name.clone(),
            players: self.snapshot(),
            first_team_size: self.first_team.len(),
            second_team_size: self.second_team.len(),
            created_at: self.created_at,
            mailbox_depth: self.mailbox.current_depth(),
        }
    }
}
