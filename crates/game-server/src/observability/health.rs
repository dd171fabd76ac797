//! Health endpoints for the game server.
//!
//! - `GET /health` - Liveness probe, 200 while the process runs
//! - `GET /ready` - Readiness probe, 200 while the WebSocket listener is bound
//!   and the server is not draining
//!
//! `/metrics` is merged onto the same router in `main.rs`.

use axum::{extract::State, http::StatusCode, routing::get, Router};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Readiness as seen by the probes.
///
/// Derived from server state rather than set by hand: ready once the
/// listener is bound, not ready from the moment the shutdown token fires.
#[derive(Debug, Clone)]
pub struct HealthState {
    listening: Arc<AtomicBool>,
    draining: CancellationToken,
}

impl HealthState {
    /// Track readiness against the server's shutdown token.
    #[must_use]
    pub fn new(draining: CancellationToken) -> Self {
        Self {
            listening: Arc::new(AtomicBool::new(false)),
            draining,
        }
    }

    /// The WebSocket listener is bound.
    pub fn mark_listening(&self) {
        self.listening.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.listening.load(Ordering::SeqCst) && !self.draining.is_cancelled()
    }
}

/// Create the health router with liveness and readiness endpoints.
pub fn health_router(health_state: HealthState) -> Router {
    Router::new()
        .route("/health", get(|| async { StatusCode::OK }))
        .route("/ready", get(readiness_handler))
        .with_state(health_state)
}

async fn readiness_handler(State(state): State<HealthState>) -> StatusCode {
    if state.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::util::ServiceExt;

    #[test]
    fn test_ready_follows_listener_and_drain() {
        let token = CancellationToken::new();
        let state = HealthState::new(token.clone());
        assert!(!state.is_ready());

        state.mark_listening();
        assert!(state.is_ready());

        // Clones share the flag
        let shared = state.clone();
        token.cancel();
        assert!(!shared.is_ready());
        assert!(!state.is_ready());
    }

    async fn status_of(app: Router, uri: &str) -> StatusCode {
        let request = Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("Failed to build request");
        app.oneshot(request)
            .await
            .expect("Failed to execute request")
            .status()
    }

    #[tokio::test]
    async fn test_health_router_endpoints() {
        let token = CancellationToken::new();
        let state = HealthState::new(token.clone());

        assert_eq!(
            status_of(health_router(state.clone()), "/health").await,
            StatusCode::OK
        );
        assert_eq!(
            status_of(health_router(state.clone()), "/ready").await,
            StatusCode::SERVICE_UNAVAILABLE
        );

        state.mark_listening();
        assert_eq!(
            status_of(health_router(state.clone()), "/ready").await,
            StatusCode::OK
        );

        token.cancel();
        assert_eq!(
            status_of(health_router(state.clone()), "/ready").await,
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(health_router(state.clone()), "/health").await,
            StatusCode::OK
        );
        assert_eq!(
            status_of(health_router(state), "/unknown").await,
            StatusCode::NOT_FOUND
        );
    }
}
