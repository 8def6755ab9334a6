//! Session configuration.
//!
//! Configuration is loaded from environment variables with sensible
//! defaults. The candidate gathering bound is deliberately explicit
//! and configurable: some ancestors of this protocol waited
//! unconditionally for gathering to complete, which turns a quiet
//! network interface into a hung join flow.

use std::collections::HashMap;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Default bound on candidate gathering during offer/answer creation.
pub const DEFAULT_CANDIDATE_WAIT_MS: u64 = 5_000;

/// Default maximum number of remote peers (host + guests - 1).
pub const DEFAULT_MAX_PEERS: u32 = 8;

/// Default display name sent in the hello exchange.
pub const DEFAULT_DISPLAY_NAME: &str = "Player";

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {0}: {1}")]
    InvalidValue(&'static str, String),
}

/// Session core configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bound on candidate gathering; exceeding it abandons the
    /// handshake attempt rather than hanging the join flow.
    pub candidate_wait: Duration,

    /// Maximum number of remote peers this session will link to.
    pub max_peers: u32,

    /// Display name announced to peers on channel open.
    pub display_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            candidate_wait: Duration::from_millis(DEFAULT_CANDIDATE_WAIT_MS),
            max_peers: DEFAULT_MAX_PEERS,
            display_name: DEFAULT_DISPLAY_NAME.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let candidate_wait_ms = match vars.get("MESH_CANDIDATE_WAIT_MS") {
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidValue("MESH_CANDIDATE_WAIT_MS", raw.clone()))?,
            None => DEFAULT_CANDIDATE_WAIT_MS,
        };
        if candidate_wait_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "MESH_CANDIDATE_WAIT_MS",
                "0".to_string(),
            ));
        }

        let max_peers = match vars.get("MESH_MAX_PEERS") {
            Some(raw) => raw
                .parse::<u32>()
                .map_err(|_| ConfigError::InvalidValue("MESH_MAX_PEERS", raw.clone()))?,
            None => DEFAULT_MAX_PEERS,
        };

        let display_name = vars
            .get("MESH_DISPLAY_NAME")
            .cloned()
            .unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string());

        Ok(Config {
            candidate_wait: Duration::from_millis(candidate_wait_ms),
            max_peers,
            display_name,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::from_vars(&HashMap::new()).unwrap();
        assert_eq!(
            config.candidate_wait,
            Duration::from_millis(DEFAULT_CANDIDATE_WAIT_MS)
        );
        assert_eq!(config.max_peers, DEFAULT_MAX_PEERS);
        assert_eq!(config.display_name, DEFAULT_DISPLAY_NAME);
    }

    #[test]
    fn test_custom_values() {
        let vars = HashMap::from([
            ("MESH_CANDIDATE_WAIT_MS".to_string(), "250".to_string()),
            ("MESH_MAX_PEERS".to_string(), "3".to_string()),
            ("MESH_DISPLAY_NAME".to_string(), "Alice".to_string()),
        ]);
        let config = Config::from_vars(&vars).unwrap();
        assert_eq!(config.candidate_wait, Duration::from_millis(250));
        assert_eq!(config.max_peers, 3);
        assert_eq!(config.display_name, "Alice");
    }

    #[test]
    fn test_zero_candidate_wait_rejected() {
        let vars = HashMap::from([("MESH_CANDIDATE_WAIT_MS".to_string(), "0".to_string())]);
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue("MESH_CANDIDATE_WAIT_MS", _))
        ));
    }

    #[test]
    fn test_unparseable_value_rejected() {
        let vars = HashMap::from([("MESH_MAX_PEERS".to_string(), "many".to_string())]);
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue("MESH_MAX_PEERS", _))
        ));
    }
}
