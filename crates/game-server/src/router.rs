//! Protocol router for connections that have not joined a game.
//!
//! Decodes the frame, and for a `join` asks the registry to place the
//! connection. Everything the router answers goes back on the session's own
//! outbound queue, so replies and game traffic never interleave out of order.

use crate::actors::{ConnectionId, GameJoin, JoinTicket, RegistryActorHandle};
use crate::errors::GsError;
use crate::observability::metrics as prom;

use game_protocol::{
    decode_request, encode_message, ClientRequest, JoinRequest, Package, ServerMessage, Warning,
};
use std::time::Instant;
use tracing::{debug, info, warn};

/// What the session should do with a routed frame.
#[derive(Debug)]
pub enum Routed {
    /// Send this reply and stay unjoined.
    Reply(Package),
    /// The connection joined a game; its `join-result` is already queued.
    Joined(GameJoin),
    /// End the session, optionally sending a last message first.
    Terminate(Option<Package>),
    /// Nothing to send.
    Ignored,
}

/// Routes frames from unjoined connections.
#[derive(Debug, Clone)]
pub struct Router {
    registry: RegistryActorHandle,
}

impl Router {
    /// Create a router over the given registry.
    #[must_use]
    pub fn new(registry: RegistryActorHandle) -> Self {
        Self { registry }
    }

    /// Handle one inbound frame.
    pub async fn route(&self, connection_id: ConnectionId, payload: &[u8]) -> Routed {
        match decode_request(payload) {
            Ok(ClientRequest::Join(request)) => self.join(connection_id, request).await,
            Err(e) => {
                warn!(
                    target: "gs.router",
                    connection_id = %connection_id,
                    message_type = e.message_type().unwrap_or(""),
                    error = %e,
                    "Received an unidentified package"
                );
                prom::record_unidentified_package();
                reply(&ServerMessage::unidentified_package())
            }
        }
    }

    async fn join(&self, connection_id: ConnectionId, request: JoinRequest) -> Routed {
        let started = Instant::now();
        let correlation_id = request.id.clone();

        debug!(
            target: "gs.router",
            connection_id = %connection_id,
            game_name = %request.game,
            team = request.team.as_str(),
            "Routing join"
        );

        let ticket = JoinTicket {
            connection_id,
            game_name: request.game,
            nick: request.nick,
            team: request.team,
            correlation_id: request.id,
        };

        let routed = match self.registry.route_join(ticket).await {
            Ok(join) => {
                prom::record_join("joined");
                info!(
                    target: "gs.router",
                    connection_id = %connection_id,
                    game_name = %join.game_name,
                    slot = join.slot,
                    team = join.team.as_str(),
                    players = join.players.len(),
                    "Connection joined game"
                );
                Routed::Joined(join)
            }
            Err(e) if e.is_join_rejection() => {
                prom::record_join("full");
                debug!(
                    target: "gs.router",
                    connection_id = %connection_id,
                    error = %e,
                    "Join rejected"
                );
                reply(&ServerMessage::full(correlation_id))
            }
            Err(e) => {
                prom::record_join("rejected");
                terminate(connection_id, &e)
            }
        };

        prom::record_join_latency(started.elapsed());
        routed
    }
}

fn reply(message: &ServerMessage) -> Routed {
    match encode_message(message) {
        Ok(package) => Routed::Reply(package),
        Err(e) => {
            warn!(target: "gs.router", error = %e, "Failed to encode reply");
            Routed::Ignored
        }
    }
}

/// Close the connection with a warning that hides internal details.
fn terminate(connection_id: ConnectionId, error: &GsError) -> Routed {
    if error.is_terminal_for_session() {
        warn!(
            target: "gs.router",
            connection_id = %connection_id,
            error_code = error.error_code(),
            error = %error,
            "Join failed, closing connection"
        );
    }

    let warning = ServerMessage::Warning(Warning {
        message: error.client_message(),
        closed: true,
    });
    Routed::Terminate(encode_message(&warning).ok())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::actors::{ActorMetrics, RegistryActor, SessionCommand, SessionHandle};
    use game_protocol::message::{SHUTTING_DOWN_MESSAGE, UNIDENTIFIED_PACKAGE_MESSAGE};
    use game_protocol::Team;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn router() -> (Router, RegistryActorHandle) {
        let (registry, _task) = RegistryActor::spawn("gs-test".to_string(), 5, ActorMetrics::new());
        (Router::new(registry.clone()), registry)
    }

    async fn register(
        registry: &RegistryActorHandle,
        id: u64,
    ) -> (ConnectionId, UnboundedReceiver<SessionCommand>) {
        let connection_id = ConnectionId::new(id);
        let (session, outbox) = SessionHandle::detached(connection_id);
        registry.register(connection_id, session).await.unwrap();
        (connection_id, outbox)
    }

    fn reply_json(routed: Routed) -> Value {
        match routed {
            Routed::Reply(package) => serde_json::from_slice(package.as_bytes()).unwrap(),
            other => json!({ "unexpected": format!("{other:?}") }),
        }
    }

    fn farewell_json(routed: Routed) -> Value {
        match routed {
            Routed::Terminate(Some(package)) => serde_json::from_slice(package.as_bytes()).unwrap(),
            other => json!({ "unexpected": format!("{other:?}") }),
        }
    }

    #[tokio::test]
    async fn test_unknown_type_gets_warning() {
        let (router, registry) = router();
        let (id, _outbox) = register(&registry, 1).await;

        let reply = reply_json(router.route(id, br#"{"type":"frobnicate"}"#).await);
        assert_eq!(
            reply,
            json!({
                "type": "warning",
                "message": UNIDENTIFIED_PACKAGE_MESSAGE,
                "closed": false
            })
        );
    }

    #[tokio::test]
    async fn test_garbage_gets_warning() {
        let (router, registry) = router();
        let (id, _outbox) = register(&registry, 1).await;

        let payloads: [&[u8]; 4] = [b"not json", b"[1,2,3]", b"{}", &[0xff, 0xfe]];
        for payload in payloads {
            let reply = reply_json(router.route(id, payload).await);
            assert_eq!(reply.get("type"), Some(&json!("warning")));
        }
    }

    #[tokio::test]
    async fn test_join_succeeds() {
        let (router, registry) = router();
        let (id, _outbox) = register(&registry, 1).await;

        let routed = router
            .route(
                id,
                br#"{"type":"join","id":7,"game":"g1","nick":"alice","team":"random"}"#,
            )
            .await;

        assert!(matches!(
            &routed,
            Routed::Joined(join) if join.game_name == "g1" && join.slot == 0 && join.team == Team::First
        ));
    }

    #[tokio::test]
    async fn test_full_team_gets_full_reply_with_echoed_id() {
        let (router, registry) = router();

        let mut outboxes = Vec::new();
        for n in 1..=5 {
            let (id, outbox) = register(&registry, n).await;
            outboxes.push(outbox);
            let routed = router
                .route(id, br#"{"type":"join","game":"g1","nick":"p","team":"first"}"#)
                .await;
            assert!(matches!(routed, Routed::Joined(_)));
        }

        let (id, _outbox) = register(&registry, 6).await;
        let reply = reply_json(
            router
                .route(
                    id,
                    br#"{"type":"join","id":"x","game":"g1","nick":"late","team":"first"}"#,
                )
                .await,
        );
        let expected = serde_json::to_value(ServerMessage::full(Some(json!("x")))).unwrap();
        assert_eq!(reply, expected);
        assert_eq!(reply.get("result"), Some(&json!("full")));
    }

    #[tokio::test]
    async fn test_unregistered_connection_is_terminated() {
        let (router, _registry) = router();

        let routed = router
            .route(
                ConnectionId::new(99),
                br#"{"type":"join","game":"g1","nick":"ghost"}"#,
            )
            .await;

        let warning = farewell_json(routed);
        assert_eq!(warning.get("closed"), Some(&json!(true)));
        assert_eq!(warning.get("message"), Some(&json!(SHUTTING_DOWN_MESSAGE)));
    }

    #[tokio::test]
    async fn test_join_after_registry_shutdown_is_terminated() {
        let (router, registry) = router();
        let (id, _outbox) = register(&registry, 1).await;

        registry.shutdown(Duration::from_secs(1)).await.unwrap();

        let routed = router
            .route(id, br#"{"type":"join","game":"g1","nick":"late"}"#)
            .await;
        assert!(matches!(routed, Routed::Terminate(Some(_))));
    }
}
