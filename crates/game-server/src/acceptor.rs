//! Transport acceptor: owns the TCP listener and hands every accepted
//! stream to a new session.

use crate::errors::GsError;
use crate::server::ServerContext;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Pause after a failed `accept` (e.g. out of file descriptors).
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Accepts connections until cancelled.
pub struct Acceptor {
    listener: TcpListener,
    context: Arc<ServerContext>,
}

impl Acceptor {
    /// Bind the listening socket.
    ///
    /// # Errors
    ///
    /// `GsError::Transport` if the address cannot be bound.
    pub async fn bind(addr: SocketAddr, context: Arc<ServerContext>) -> Result<Self, GsError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| GsError::Transport(format!("failed to bind {addr}: {e}")))?;

        Ok(Self { listener, context })
    }

    /// Address actually bound (resolves port 0).
    pub fn local_addr(&self) -> Result<SocketAddr, GsError> {
        self.listener
            .local_addr()
            .map_err(|e| GsError::Transport(format!("failed to read local address: {e}")))
    }

    /// Accept until `cancel_token` fires. Dropping the listener on return
    /// refuses further connections.
    pub async fn run(self, cancel_token: CancellationToken) {
        info!(
            target: "gs.acceptor",
            addr = ?self.listener.local_addr().ok(),
            "Acceptor started"
        );

        loop {
            tokio::select! {
                () = cancel_token.cancelled() => {
                    info!(target: "gs.acceptor", "Acceptor received cancellation signal");
                    break;
                }

                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            if let Err(e) = stream.set_nodelay(true) {
                                debug!(
                                    target: "gs.acceptor",
                                    peer = %peer,
                                    error = %e,
                                    "Failed to set TCP_NODELAY"
                                );
                            }
                            let connection_id = self.context.spawn_session(stream, Some(peer));
                            debug!(
                                target: "gs.acceptor",
                                peer = %peer,
                                connection_id = %connection_id,
                                "Connection accepted"
                            );
                        }
                        Err(e) => {
                            warn!(target: "gs.acceptor", error = %e, "Accept failed");
                            tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                        }
                    }
                }
            }
        }

        info!(target: "gs.acceptor", "Acceptor stopped");
    }
}
