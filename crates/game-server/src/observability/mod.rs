//! Observability for the game server: Prometheus metrics and health probes.
//!
//! # Privacy by Default
//!
//! Actor loops use `#[instrument(skip_all)]` with explicit fields. Game names
//! and nicknames are client-chosen, so they appear in log fields but never
//! as metric labels.

pub mod health;
pub mod metrics;

pub use health::{health_router, HealthState};
pub use metrics::init_metrics_recorder;
