//! `SessionActor` - per-connection actor that owns one WebSocket.
//!
//! Each `SessionActor`:
//! - Registers with the registry before the WebSocket handshake
//! - Serializes every outbound write through a single queue
//! - Hands inbound frames to its current delegate: the protocol router
//!   while unjoined, the game's broadcast once joined
//! - Unregisters exactly once, whatever ends the connection
//!
//! # Lifecycle
//!
//! `Connecting -> HandshakePending -> Active -> Closing -> Closed`, with any
//! state before `Closing` allowed to jump straight to `Closing`.

use crate::errors::GsError;
use crate::observability::metrics as prom;
use crate::router::{Routed, Router};

use super::messages::{ConnectionId, Delegate, SessionCommand};
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};
use super::registry::RegistryActorHandle;

use bytes::Bytes;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use game_protocol::{encode_message, Package, ServerMessage};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message, Utf8Bytes};
use tokio_tungstenite::{accept_async, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// How long the closing handshake may take before the socket is dropped.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// TCP connection accepted, not yet registered.
    Connecting,
    /// Registered; WebSocket handshake in progress.
    HandshakePending,
    /// Handshake done; frames flow both ways.
    Active,
    /// Draining the close handshake and unregistering.
    Closing,
    /// Terminal.
    Closed,
}

impl SessionState {
    /// Returns the state as a string for logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            SessionState::Connecting => "connecting",
            SessionState::HandshakePending => "handshake_pending",
            SessionState::Active => "active",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        }
    }

    /// Whether moving from `self` to `next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(&self, next: SessionState) -> bool {
        matches!(
            (self, next),
            (SessionState::Connecting, SessionState::HandshakePending)
                | (SessionState::HandshakePending, SessionState::Active)
                | (
                    SessionState::Connecting
                        | SessionState::HandshakePending
                        | SessionState::Active,
                    SessionState::Closing
                )
                | (SessionState::Closing, SessionState::Closed)
        )
    }

    /// Whether the session has fully ended.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed)
    }
}

/// Handle to a `SessionActor`.
///
/// Writes never block: the outbound queue is unbounded and drained by the
/// session's own task, so a game can fan out without waiting on slow clients.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    sender: mpsc::UnboundedSender<SessionCommand>,
    cancel_token: CancellationToken,
    connection_id: ConnectionId,
    mailbox: Arc<MailboxMonitor>,
}

impl SessionHandle {
    /// Get the connection ID.
    #[must_use]
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Queue a package for the client.
    ///
    /// # Errors
    ///
    /// `GsError::SessionClosed` once the session has stopped draining its
    /// queue.
    pub fn write(&self, package: Package) -> Result<(), GsError> {
        self.mailbox.record_enqueue();
        self.sender
            .send(SessionCommand::Write(package))
            .map_err(|_| GsError::SessionClosed(self.connection_id.to_string()))
    }

    /// Ask the session to close after the writes already queued.
    ///
    /// # Errors
    ///
    /// `GsError::SessionClosed` if the session is already gone.
    pub fn close(&self, reason: impl Into<String>) -> Result<(), GsError> {
        self.mailbox.record_enqueue();
        self.sender
            .send(SessionCommand::Close {
                reason: reason.into(),
            })
            .map_err(|_| GsError::SessionClosed(self.connection_id.to_string()))
    }

    /// Cancel the session actor.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the actor is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Handle with no actor behind it; commands land on the returned receiver.
    #[cfg(any(test, feature = "test-utils"))]
    #[must_use]
    pub fn detached(
        connection_id: ConnectionId,
    ) -> (Self, mpsc::UnboundedReceiver<SessionCommand>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let handle = Self {
            sender,
            cancel_token: CancellationToken::new(),
            connection_id,
            mailbox: Arc::new(MailboxMonitor::new(
                ActorType::Session,
                connection_id.to_string(),
            )),
        };
        (handle, receiver)
    }
}

/// Why the active loop ended.
#[derive(Debug)]
enum ExitReason {
    /// Client sent a close frame or the stream ended.
    PeerClosed,
    /// Server shutdown.
    Cancelled,
    /// `SessionHandle::close` was called.
    Requested(String),
    /// Reading or writing the socket failed.
    TransportError(String),
    /// The router decided the connection must end, optionally with a last word.
    Terminate(Option<Package>),
    /// The WebSocket handshake failed or timed out.
    HandshakeFailed(String),
    /// The registry could not be reached at startup.
    RegistryUnavailable,
}

impl ExitReason {
    const fn as_str(&self) -> &'static str {
        match self {
            ExitReason::PeerClosed => "peer_closed",
            ExitReason::Cancelled => "cancelled",
            ExitReason::Requested(_) => "requested",
            ExitReason::TransportError(_) => "transport_error",
            ExitReason::Terminate(_) => "terminated",
            ExitReason::HandshakeFailed(_) => "handshake_failed",
            ExitReason::RegistryUnavailable => "registry_unavailable",
        }
    }
}

/// Everything a session needs from the server around it.
#[derive(Clone, Debug)]
pub struct SessionContext {
    pub registry: RegistryActorHandle,
    pub metrics: Arc<ActorMetrics>,
    /// Parent token; each session gets a child.
    pub cancel_token: CancellationToken,
    pub handshake_timeout: Duration,
}

/// The `SessionActor` implementation.
pub struct SessionActor {
    /// Connection ID.
    connection_id: ConnectionId,
    /// Remote address, when known.
    peer: Option<SocketAddr>,
    /// Lifecycle state.
    state: SessionState,
    /// Where inbound frames go.
    delegate: Delegate,
    /// Outbound queue.
    receiver: mpsc::UnboundedReceiver<SessionCommand>,
    /// Own handle, used for router replies so they share the outbound queue.
    self_handle: SessionHandle,
    /// Cancellation token (child of the server's session token).
    cancel_token: CancellationToken,
    /// Registry handle.
    registry: RegistryActorHandle,
    /// Router for unjoined traffic.
    router: Router,
    /// Shared metrics.
    metrics: Arc<ActorMetrics>,
    /// Outbound queue monitor, shared with every handle.
    mailbox: Arc<MailboxMonitor>,
    /// WebSocket handshake deadline.
    handshake_timeout: Duration,
}

impl SessionActor {
    /// Spawn a new session actor over an accepted stream.
    ///
    /// Returns a handle and the task join handle.
    pub fn spawn<S>(
        stream: S,
        connection_id: ConnectionId,
        peer: Option<SocketAddr>,
        context: &SessionContext,
    ) -> (SessionHandle, JoinHandle<()>)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (sender, receiver) = mpsc::unbounded_channel();
        let cancel_token = context.cancel_token.child_token();
        let mailbox = Arc::new(MailboxMonitor::new(
            ActorType::Session,
            connection_id.to_string(),
        ));

        let handle = SessionHandle {
            sender,
            cancel_token: cancel_token.clone(),
            connection_id,
            mailbox: Arc::clone(&mailbox),
        };

        let actor = Self {
            connection_id,
            peer,
            state: SessionState::Connecting,
            delegate: Delegate::Unjoined,
            receiver,
            self_handle: handle.clone(),
            cancel_token,
            registry: context.registry.clone(),
            router: Router::new(context.registry.clone()),
            metrics: Arc::clone(&context.metrics),
            mailbox,
            handshake_timeout: context.handshake_timeout,
        };

        let task_handle = tokio::spawn(actor.run(stream));

        (handle, task_handle)
    }

    /// Drive the session from registration to `Closed`.
    #[instrument(skip_all, name = "gs.actor.session", fields(connection_id = %self.connection_id))]
    async fn run<S>(mut self, stream: S)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        self.metrics.session_opened();

        debug!(
            target: "gs.actor.session",
            connection_id = %self.connection_id,
            peer = ?self.peer,
            "SessionActor started"
        );

        let registered = match self
            .registry
            .register(self.connection_id, self.self_handle.clone())
            .await
        {
            Ok(delegate) => {
                self.delegate = delegate;
                true
            }
            Err(e) => {
                warn!(
                    target: "gs.actor.session",
                    connection_id = %self.connection_id,
                    error = %e,
                    "Registry unavailable, dropping connection"
                );
                false
            }
        };

        let reason = if registered {
            self.transition(SessionState::HandshakePending);
            match self.handshake(stream).await {
                Ok(ws) => {
                    self.transition(SessionState::Active);
                    self.serve(ws).await
                }
                Err(reason) => reason,
            }
        } else {
            ExitReason::RegistryUnavailable
        };

        self.transition(SessionState::Closing);

        match &reason {
            ExitReason::TransportError(detail) | ExitReason::HandshakeFailed(detail) => {
                prom::record_session_error(reason.as_str());
                debug!(
                    target: "gs.actor.session",
                    connection_id = %self.connection_id,
                    error = %detail,
                    "Session ended on error"
                );
            }
            _ => {}
        }

        if registered {
            self.unregister().await;
        }

        self.transition(SessionState::Closed);
        self.metrics.session_closed();

        info!(
            target: "gs.actor.session",
            connection_id = %self.connection_id,
            reason = reason.as_str(),
            game_name = self.delegate.game_name().unwrap_or(""),
            messages_processed = self.mailbox.messages_processed(),
            "SessionActor stopped"
        );
    }

    /// Complete the WebSocket upgrade, bounded by the handshake timeout.
    async fn handshake<S>(&self, stream: S) -> Result<WebSocketStream<S>, ExitReason>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        tokio::select! {
            () = self.cancel_token.cancelled() => Err(ExitReason::Cancelled),

            result = tokio::time::timeout(self.handshake_timeout, accept_async(stream)) => {
                match result {
                    Ok(Ok(ws)) => Ok(ws),
                    Ok(Err(e)) => Err(ExitReason::HandshakeFailed(e.to_string())),
                    Err(_) => Err(ExitReason::HandshakeFailed(format!(
                        "no handshake within {}s",
                        self.handshake_timeout.as_secs()
                    ))),
                }
            }
        }
    }

    /// Pump outbound writes and inbound frames until something ends the
    /// session, then run the closing handshake.
    async fn serve<S>(&mut self, ws: WebSocketStream<S>) -> ExitReason
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (mut sink, mut stream) = ws.split();

        let reason = loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(
                        target: "gs.actor.session",
                        connection_id = %self.connection_id,
                        "SessionActor received cancellation signal"
                    );
                    break ExitReason::Cancelled;
                }

                command = self.receiver.recv() => {
                    match command {
                        Some(SessionCommand::Write(package)) => {
                            self.mailbox.record_dequeue();
                            if let Err(e) = send_package(&mut sink, package).await {
                                break ExitReason::TransportError(e.to_string());
                            }
                        }
                        Some(SessionCommand::Close { reason }) => {
                            self.mailbox.record_dequeue();
                            break ExitReason::Requested(reason);
                        }
                        // Unreachable while self_handle lives
                        None => break ExitReason::Requested("handles dropped".to_string()),
                    }
                }

                frame = stream.next() => {
                    let payload = match frame {
                        Some(Ok(Message::Text(text))) => Bytes::from(text),
                        Some(Ok(Message::Binary(data))) => data,
                        Some(Ok(Message::Close(_))) | None => break ExitReason::PeerClosed,
                        // Pings are answered by tungstenite itself
                        Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
                        Some(Err(e)) => break classify_read_error(e),
                    };

                    if let Some(reason) = self.deliver(payload).await {
                        break reason;
                    }
                }
            }
        };

        self.transition(SessionState::Closing);

        let farewell = match &reason {
            ExitReason::Cancelled => encode_message(&ServerMessage::shutting_down()).ok(),
            ExitReason::Terminate(package) => package.clone(),
            _ => None,
        };

        // Nothing queued after this point reaches the client
        let mut discarded = 0usize;
        while self.receiver.try_recv().is_ok() {
            self.mailbox.record_dequeue();
            discarded += 1;
        }
        if discarded > 0 {
            debug!(
                target: "gs.actor.session",
                connection_id = %self.connection_id,
                discarded = discarded,
                "Discarded queued writes on close"
            );
        }

        if !matches!(reason, ExitReason::TransportError(_)) {
            let close = async {
                if let Some(package) = farewell {
                    send_package(&mut sink, package).await?;
                }
                sink.close().await
            };
            match tokio::time::timeout(CLOSE_TIMEOUT, close).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(
                    target: "gs.actor.session",
                    connection_id = %self.connection_id,
                    error = %e,
                    "Close handshake failed"
                ),
                Err(_) => debug!(
                    target: "gs.actor.session",
                    connection_id = %self.connection_id,
                    "Close handshake timed out"
                ),
            }
        }

        reason
    }

    /// Hand one inbound payload to the current delegate.
    ///
    /// Returns `Some` when the session must end.
    async fn deliver(&mut self, payload: Bytes) -> Option<ExitReason> {
        let game = match &self.delegate {
            Delegate::Unjoined => None,
            Delegate::InGame { game, .. } => Some(game.clone()),
        };

        let Some(game) = game else {
            return match self.router.route(self.connection_id, &payload).await {
                Routed::Reply(package) => {
                    if let Err(e) = self.self_handle.write(package) {
                        debug!(
                            target: "gs.actor.session",
                            connection_id = %self.connection_id,
                            error = %e,
                            "Could not queue reply"
                        );
                    }
                    None
                }
                Routed::Joined(join) => {
                    debug!(
                        target: "gs.actor.session",
                        connection_id = %self.connection_id,
                        game_name = %join.game_name,
                        slot = join.slot,
                        "Session delegate switched to game"
                    );
                    self.delegate = join.delegate();
                    None
                }
                Routed::Terminate(package) => Some(ExitReason::Terminate(package)),
                Routed::Ignored => None,
            };
        };

        let package = match Package::from_utf8(payload) {
            Ok(package) => package,
            Err(e) => {
                warn!(
                    target: "gs.actor.session",
                    connection_id = %self.connection_id,
                    error = %e,
                    "Dropping non UTF-8 frame"
                );
                return None;
            }
        };

        match game.broadcast(package).await {
            Ok(()) => None,
            Err(e) => {
                warn!(
                    target: "gs.actor.session",
                    connection_id = %self.connection_id,
                    game_name = %game.game_name(),
                    error = %e,
                    "Game unavailable, closing session"
                );
                Some(ExitReason::Terminate(
                    encode_message(&ServerMessage::shutting_down()).ok(),
                ))
            }
        }
    }

    async fn unregister(&self) {
        match self.registry.unregister(self.connection_id).await {
            Ok(true) => {}
            Ok(false) => debug!(
                target: "gs.actor.session",
                connection_id = %self.connection_id,
                "Registry did not know this connection"
            ),
            Err(e) => warn!(
                target: "gs.actor.session",
                connection_id = %self.connection_id,
                error = %e,
                "Unregister failed"
            ),
        }
    }

    fn transition(&mut self, next: SessionState) {
        if self.state == next {
            return;
        }
        if !self.state.can_transition_to(next) {
            warn!(
                target: "gs.actor.session",
                connection_id = %self.connection_id,
                from = self.state.as_str(),
                to = next.as_str(),
                "Ignoring illegal state transition"
            );
            return;
        }
        debug!(
            target: "gs.actor.session",
            connection_id = %self.connection_id,
            from = self.state.as_str(),
            to = next.as_str(),
            "Session state changed"
        );
        self.state = next;
    }
}

/// Write one package as a text frame.
async fn send_package<S>(
    sink: &mut SplitSink<WebSocketStream<S>, Message>,
    package: Package,
) -> Result<(), tungstenite::Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let text = Utf8Bytes::try_from(Bytes::from(package)).map_err(|e| {
        tungstenite::Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    })?;
    sink.send(Message::Text(text)).await
}

/// Resets without a close frame count as the peer going away.
fn classify_read_error(error: tungstenite::Error) -> ExitReason {
    match error {
        tungstenite::Error::ConnectionClosed
        | tungstenite::Error::AlreadyClosed
        | tungstenite::Error::Protocol(
            tungstenite::error::ProtocolError::ResetWithoutClosingHandshake,
        ) => ExitReason::PeerClosed,
        other => ExitReason::TransportError(other.to_string()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::actors::registry::RegistryActor;
    use tokio::io::DuplexStream;
    use tokio_tungstenite::client_async;

    struct Harness {
        context: SessionContext,
        _registry_task: JoinHandle<()>,
    }

    fn harness() -> Harness {
        let metrics = ActorMetrics::new();
        let (registry, registry_task) =
            RegistryActor::spawn("gs-test".to_string(), 5, Arc::clone(&metrics));
        Harness {
            context: SessionContext {
                registry,
                metrics,
                cancel_token: CancellationToken::new(),
                handshake_timeout: Duration::from_secs(5),
            },
            _registry_task: registry_task,
        }
    }

    fn start_session(
        harness: &Harness,
        id: u64,
    ) -> (SessionHandle, JoinHandle<()>, DuplexStream) {
        let (server_side, client_side) = tokio::io::duplex(64 * 1024);
        let (handle, task) =
            SessionActor::spawn(server_side, ConnectionId::new(id), None, &harness.context);
        (handle, task, client_side)
    }

    async fn next_text(ws: &mut WebSocketStream<DuplexStream>) -> String {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
                .await
                .expect("timed out waiting for frame")
                .expect("stream ended")
                .expect("read failed");
            if let Message::Text(text) = frame {
                return text.to_string();
            }
        }
    }

    #[test]
    fn test_state_transitions() {
        use SessionState::{Active, Closed, Closing, Connecting, HandshakePending};

        assert!(Connecting.can_transition_to(HandshakePending));
        assert!(HandshakePending.can_transition_to(Active));
        assert!(Active.can_transition_to(Closing));
        assert!(Connecting.can_transition_to(Closing));
        assert!(HandshakePending.can_transition_to(Closing));
        assert!(Closing.can_transition_to(Closed));

        assert!(!Connecting.can_transition_to(Active));
        assert!(!Active.can_transition_to(Closed));
        assert!(!Closed.can_transition_to(Connecting));
        assert!(!Closing.can_transition_to(Active));
        assert!(Closed.is_terminal());
        assert!(!Closing.is_terminal());
    }

    #[test]
    fn test_detached_handle_reports_closed_session() {
        let (handle, receiver) = SessionHandle::detached(ConnectionId::new(9));
        assert!(handle.write(Package::from_text("{}")).is_ok());

        drop(receiver);
        let result = handle.write(Package::from_text("{}"));
        assert!(matches!(result, Err(GsError::SessionClosed(_))));
    }

    #[tokio::test]
    async fn test_writes_queued_before_handshake_are_delivered_in_order() {
        let harness = harness();
        let (handle, _task, client_side) = start_session(&harness, 1);

        for i in 0..3 {
            handle
                .write(Package::from_text(format!(r#"{{"seq":{i}}}"#)))
                .unwrap();
        }

        let (mut ws, _) = client_async("ws://localhost/", client_side).await.unwrap();
        for i in 0..3 {
            assert_eq!(next_text(&mut ws).await, format!(r#"{{"seq":{i}}}"#));
        }
    }

    #[tokio::test]
    async fn test_concurrent_producers_keep_per_producer_order() {
        let harness = harness();
        let (handle, _task, client_side) = start_session(&harness, 2);
        let (mut ws, _) = client_async("ws://localhost/", client_side).await.unwrap();

        let producers: Vec<_> = (0..4)
            .map(|producer| {
                let handle = handle.clone();
                tokio::spawn(async move {
                    for seq in 0..50 {
                        handle
                            .write(Package::from_text(format!("{producer}:{seq}")))
                            .unwrap();
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.await.unwrap();
        }

        let mut last_seen = [None::<u32>; 4];
        for _ in 0..200 {
            let text = next_text(&mut ws).await;
            let (producer, seq) = text.split_once(':').unwrap();
            let producer: usize = producer.parse().unwrap();
            let seq: u32 = seq.parse().unwrap();

            let slot = last_seen.get_mut(producer).unwrap();
            if let Some(previous) = *slot {
                assert!(seq > previous, "producer {producer} reordered");
            }
            *slot = Some(seq);
        }
        assert!(last_seen.iter().all(|seen| *seen == Some(49)));
    }

    #[tokio::test]
    async fn test_concurrent_producers_match_enqueue_order() {
        let harness = harness();
        let (handle, _task, client_side) = start_session(&harness, 6);
        let (mut ws, _) = client_async("ws://localhost/", client_side).await.unwrap();

        // Taking a sequence number and enqueueing form one critical section,
        // so the sequence is the global enqueue order.
        let next_seq = Arc::new(std::sync::Mutex::new(0u32));

        let producers: Vec<_> = (0..4)
            .map(|_| {
                let handle = handle.clone();
                let next_seq = Arc::clone(&next_seq);
                tokio::spawn(async move {
                    for _ in 0..50 {
                        {
                            let mut seq = next_seq.lock().unwrap();
                            handle
                                .write(Package::from_text(seq.to_string()))
                                .unwrap();
                            *seq += 1;
                        }
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.await.unwrap();
        }

        for expected in 0..200u32 {
            assert_eq!(next_text(&mut ws).await, expected.to_string());
        }
    }

    #[tokio::test]
    async fn test_unknown_message_gets_warning() {
        let harness = harness();
        let (_handle, _task, client_side) = start_session(&harness, 3);
        let (mut ws, _) = client_async("ws://localhost/", client_side).await.unwrap();

        ws.send(Message::text(r#"{"type":"frobnicate"}"#))
            .await
            .unwrap();

        let reply: serde_json::Value = serde_json::from_str(&next_text(&mut ws).await).unwrap();
        assert_eq!(reply.get("type"), Some(&serde_json::json!("warning")));
        assert_eq!(reply.get("closed"), Some(&serde_json::json!(false)));
    }

    #[tokio::test]
    async fn test_cancel_sends_shutdown_warning_and_unregisters() {
        let harness = harness();
        let (handle, task, client_side) = start_session(&harness, 4);
        let (mut ws, _) = client_async("ws://localhost/", client_side).await.unwrap();

        // Registration happens before the handshake completes
        let status = harness.context.registry.get_status().await.unwrap();
        assert_eq!(status.registered_count, 1);

        handle.cancel();

        let warning: serde_json::Value =
            serde_json::from_str(&next_text(&mut ws).await).unwrap();
        assert_eq!(warning.get("closed"), Some(&serde_json::json!(true)));

        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();

        let status = harness.context.registry.get_status().await.unwrap();
        assert_eq!(status.registered_count, 0);
        assert_eq!(harness.context.metrics.session_count(), 0);
    }

    #[tokio::test]
    async fn test_dropped_before_handshake_unregisters() {
        let harness = harness();
        let (_handle, task, client_side) = start_session(&harness, 5);

        drop(client_side);

        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();

        let status = harness.context.registry.get_status().await.unwrap();
        assert_eq!(status.registered_count, 0);
        assert_eq!(status.unjoined_count, 0);
    }
}
