//! Game server configuration.
//!
//! Configuration is loaded from environment variables. Every value has a
//! default; values that are present but malformed are rejected so a typo
//! never silently changes roster sizes or listener addresses.

use std::collections::HashMap;
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use thiserror::Error;

/// Default WebSocket bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default health endpoint bind address.
pub const DEFAULT_HEALTH_BIND_ADDRESS: &str = "0.0.0.0:8081";

/// Default number of players allowed on each team.
pub const DEFAULT_MAX_PLAYERS_PER_TEAM: usize = 5;

/// Default time a client has to complete the WebSocket handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT_SECONDS: u64 = 10;

/// Default time sessions get to drain on shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECONDS: u64 = 30;

/// Default server instance ID prefix.
pub const DEFAULT_SERVER_ID_PREFIX: &str = "gs";

/// Game server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// WebSocket listener address (default: "0.0.0.0:8080").
    pub bind_address: SocketAddr,

    /// Health and metrics listener address (default: "0.0.0.0:8081").
    pub health_bind_address: SocketAddr,

    /// Unique identifier for this server instance.
    pub server_id: String,

    /// Roster capacity of each team (default: 5).
    pub max_players_per_team: usize,

    /// WebSocket handshake deadline in seconds (default: 10).
    pub handshake_timeout_seconds: u64,

    /// Drain deadline on shutdown in seconds (default: 30).
    pub shutdown_timeout_seconds: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = parse_address(vars, "GS_BIND_ADDRESS", DEFAULT_BIND_ADDRESS)?;

        let health_bind_address = parse_address(
            vars,
            "GS_HEALTH_BIND_ADDRESS",
            DEFAULT_HEALTH_BIND_ADDRESS,
        )?;

        let max_players_per_team = parse_number(
            vars,
            "GS_MAX_PLAYERS_PER_TEAM",
            DEFAULT_MAX_PLAYERS_PER_TEAM,
        )?;
        if max_players_per_team == 0 {
            return Err(ConfigError::InvalidValue(
                "GS_MAX_PLAYERS_PER_TEAM must be at least 1".to_string(),
            ));
        }

        let handshake_timeout_seconds = parse_number(
            vars,
            "GS_HANDSHAKE_TIMEOUT_SECONDS",
            DEFAULT_HANDSHAKE_TIMEOUT_SECONDS,
        )?;
        if handshake_timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue(
                "GS_HANDSHAKE_TIMEOUT_SECONDS must be at least 1".to_string(),
            ));
        }

        let shutdown_timeout_seconds = parse_number(
            vars,
            "GS_SHUTDOWN_TIMEOUT_SECONDS",
            DEFAULT_SHUTDOWN_TIMEOUT_SECONDS,
        )?;

        // Generate server instance ID
        let server_id = vars.get("GS_SERVER_ID").cloned().unwrap_or_else(|| {
            let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
            let uuid_suffix = uuid::Uuid::new_v4().to_string();
            let short_suffix = uuid_suffix.get(..8).unwrap_or("00000000");
            format!("{DEFAULT_SERVER_ID_PREFIX}-{hostname}-{short_suffix}")
        });

        Ok(Config {
            bind_address,
            health_bind_address,
            server_id,
            max_players_per_team,
            handshake_timeout_seconds,
            shutdown_timeout_seconds,
        })
    }
}

/// Parse a socket address from `key`, falling back to `default`.
fn parse_address(
    vars: &HashMap<String, String>,
    key: &str,
    default: &str,
) -> Result<SocketAddr, ConfigError> {
    let raw = vars.get(key).map_or(default, String::as_str);
    raw.trim()
        .parse()
        .map_err(|e| ConfigError::InvalidValue(format!("{key}={raw}: {e}")))
}

/// Parse a number from `key` if present, otherwise use `default`.
fn parse_number<T>(vars: &HashMap<String, String>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match vars.get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ConfigError::InvalidValue(format!("{key}={raw}: {e}"))),
        None => Ok(default),
    }
}
