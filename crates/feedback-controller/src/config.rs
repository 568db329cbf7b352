//! Feedback Controller configuration.
//!
//! Configuration is loaded from environment variables; every field has a
//! sensible default so a bare process comes up in free-tier mode.

use std::collections::HashMap;
use std::env;
use thiserror::Error;

/// Default time-to-expire for non-premium sessions, in seconds.
pub const DEFAULT_FREE_SESSION_TTL_SECONDS: u64 = 1800;

/// Default maximum concurrent sessions per controller instance.
pub const DEFAULT_MAX_SESSIONS: u32 = 1024;

/// Default maximum rooms per session.
pub const DEFAULT_MAX_ROOMS_PER_SESSION: u32 = 64;

/// Default per-session event channel buffer.
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default controller instance ID prefix.
pub const DEFAULT_FC_ID_PREFIX: &str = "fc";

/// Feedback Controller configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Unique identifier for this controller instance.
    pub fc_id: String,

    /// Seconds until a non-premium session expires (default: 1800).
    pub free_session_ttl_seconds: u64,

    /// Maximum concurrent sessions this instance accepts.
    pub max_sessions: u32,

    /// Maximum rooms a single session accepts.
    pub max_rooms_per_session: u32,

    /// Buffer size of each session's broadcast event channel.
    pub event_channel_capacity: usize,
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
        let free_session_ttl_seconds = vars
            .get("FC_FREE_SESSION_TTL_SECONDS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_FREE_SESSION_TTL_SECONDS);

        let max_sessions = vars
            .get("FC_MAX_SESSIONS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MAX_SESSIONS);

        let max_rooms_per_session = vars
            .get("FC_MAX_ROOMS_PER_SESSION")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MAX_ROOMS_PER_SESSION);

        let event_channel_capacity = vars
            .get("FC_EVENT_CHANNEL_CAPACITY")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_EVENT_CHANNEL_CAPACITY);

        // A feedback round needs at least two rooms to be meaningful.
        if max_rooms_per_session < 2 {
            return Err(ConfigError::InvalidValue(format!(
                "FC_MAX_ROOMS_PER_SESSION must be at least 2, got {max_rooms_per_session}"
            )));
        }

        if free_session_ttl_seconds == 0 {
            return Err(ConfigError::InvalidValue(
                "FC_FREE_SESSION_TTL_SECONDS must be positive".to_string(),
            ));
        }

        // Generate controller instance ID
        let fc_id = vars.get("FC_ID").cloned().unwrap_or_else(|| {
            let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
            let uuid_suffix = uuid::Uuid::new_v4().to_string();
            let short_suffix = uuid_suffix.get(..8).unwrap_or("00000000");
            format!("{DEFAULT_FC_ID_PREFIX}-{hostname}-{short_suffix}")
        });

        Ok(Config {
            fc_id,
            free_session_ttl_seconds,
            max_sessions,
            max_rooms_per_session,
            event_channel_capacity,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vars_defaults() {
        let config = Config::from_vars(&HashMap::new()).expect("Config should load");

        assert_eq!(
            config.free_session_ttl_seconds,
            DEFAULT_FREE_SESSION_TTL_SECONDS
        );
        assert_eq!(config.max_sessions, DEFAULT_MAX_SESSIONS);
        assert_eq!(config.max_rooms_per_session, DEFAULT_MAX_ROOMS_PER_SESSION);
        assert_eq!(config.event_channel_capacity, DEFAULT_EVENT_CHANNEL_CAPACITY);
        assert!(config.fc_id.starts_with("fc-"));
    }

    #[test]
    fn test_from_vars_custom_values() {
        let vars = HashMap::from([
            ("FC_FREE_SESSION_TTL_SECONDS".to_string(), "3600".to_string()),
            ("FC_MAX_SESSIONS".to_string(), "10".to_string()),
            ("FC_MAX_ROOMS_PER_SESSION".to_string(), "8".to_string()),
            ("FC_EVENT_CHANNEL_CAPACITY".to_string(), "32".to_string()),
            ("FC_ID".to_string(), "fc-custom-001".to_string()),
        ]);

        let config = Config::from_vars(&vars).expect("Config should load");

        assert_eq!(config.free_session_ttl_seconds, 3600);
        assert_eq!(config.max_sessions, 10);
        assert_eq!(config.max_rooms_per_session, 8);
        assert_eq!(config.event_channel_capacity, 32);
        assert_eq!(config.fc_id, "fc-custom-001");
    }

    #[test]
    fn test_unparseable_values_fall_back_to_defaults() {
        let vars = HashMap::from([(
            "FC_FREE_SESSION_TTL_SECONDS".to_string(),
            "not-a-number".to_string(),
        )]);

        let config = Config::from_vars(&vars).expect("Config should load");
        assert_eq!(
            config.free_session_ttl_seconds,
            DEFAULT_FREE_SESSION_TTL_SECONDS
        );
    }

    #[test]
    fn test_too_small_room_limit_rejected() {
        let vars = HashMap::from([("FC_MAX_ROOMS_PER_SESSION".to_string(), "1".to_string())]);
        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let vars = HashMap::from([("FC_FREE_SESSION_TTL_SECONDS".to_string(), "0".to_string())]);
        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }
}
