//! Metrics definitions for the game server.
//!
//! All metrics follow Prometheus naming conventions:
//! - `gs_` prefix for the game server
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `result`: joined, full, rejected
//! - `kind`: session exit reasons (~3 values)
//! - `actor_type`: registry, game, session
//!
//! Game names and nicknames are client-chosen and never used as labels.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Join latency buckets - one registry round trip plus one game round trip
        .set_buckets_for_metric(
            Matcher::Prefix("gs_join".to_string()),
            &[
                0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000,
            ],
        )
        .map_err(|e| format!("Failed to set join latency buckets: {e}"))?
        // Broadcast fan-out buckets - recipients per broadcast
        .set_buckets_for_metric(
            Matcher::Full("gs_broadcast_recipients".to_string()),
            &[0.0, 1.0, 2.0, 4.0, 6.0, 8.0, 10.0, 20.0],
        )
        .map_err(|e| format!("Failed to set broadcast buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

// ============================================================================
// Session & Game Metrics (Gauges)
// ============================================================================

/// Set the number of live sessions.
///
/// Metric: `gs_sessions_active`
/// Labels: none
pub fn set_sessions_active(count: u64) {
    // u64 to f64 conversion is safe for realistic session counts (< 2^53)
    #[allow(clippy::cast_precision_loss)]
    gauge!("gs_sessions_active").set(count as f64);
}

/// Set the number of live games.
///
/// Metric: `gs_games_active`
/// Labels: none
pub fn set_games_active(count: u64) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("gs_games_active").set(count as f64);
}

// ============================================================================
// Router Metrics
// ============================================================================

/// Record the outcome of a `join` request.
///
/// Metric: `gs_joins_total`
/// Labels: `result` (joined, full, rejected)
pub fn record_join(result: &str) {
    counter!("gs_joins_total", "result" => result.to_string()).increment(1);
}

/// Record how long a `join` took from decode to reply.
///
/// Metric: `gs_join_latency_seconds`
/// Labels: none
pub fn record_join_latency(duration: Duration) {
    histogram!("gs_join_latency_seconds").record(duration.as_secs_f64());
}

/// Record an inbound message the router could not identify.
///
/// Metric: `gs_unidentified_packages_total`
/// Labels: none
pub fn record_unidentified_package() {
    counter!("gs_unidentified_packages_total").increment(1);
}

// ============================================================================
// Game Metrics
// ============================================================================

/// Record one broadcast and how many sessions it was queued on.
///
/// Metrics: `gs_broadcasts_total` (counter), `gs_broadcast_recipients` (histogram)
/// Labels: none
pub fn record_broadcast(recipients: usize) {
    counter!("gs_broadcasts_total").increment(1);
    #[allow(clippy::cast_precision_loss)]
    histogram!("gs_broadcast_recipients").record(recipients as f64);
}

// ============================================================================
// Error Metrics
// ============================================================================

/// Record a session that ended on an error.
///
/// Metric: `gs_session_errors_total`
/// Labels: `kind` (transport_error, handshake_failed)
pub fn record_session_error(kind: &str) {
    counter!("gs_session_errors_total", "kind" => kind.to_string()).increment(1);
}

/// Record an actor panic event.
///
/// Metric: `gs_actor_panics_total`
/// Labels: `actor_type`
///
/// ALERT: Any non-zero value indicates a bug and should trigger investigation.
pub fn record_actor_panic(actor_type: &str) {
    counter!("gs_actor_panics_total", "actor_type" => actor_type.to_string()).increment(1);
}
