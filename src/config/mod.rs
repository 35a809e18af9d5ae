//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use rand::RngCore;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Key used to sign player secrets
    pub session_secret: Vec<u8>,
    /// Whether `session_secret` was generated for this process only
    pub session_secret_generated: bool,

    /// Roster limit for every game
    pub max_players_per_game: usize,
    /// Games without connections are deleted after this long
    pub delete_inactive_game_after: Duration,
    /// Disconnected players are removed from their game after this long
    pub kick_inactive_player_after: Duration,

    /// Allowed client origins for CORS (comma-separated); any origin when unset
    pub client_origin: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from any key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Some(port) = lookup("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            lookup("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string())
        };

        let (session_secret, session_secret_generated) =
            match lookup("SESSION_SECRET").filter(|s| !s.is_empty()) {
                Some(secret) => (secret.into_bytes(), false),
                None => {
                    let mut secret = vec![0u8; 32];
                    rand::thread_rng().fill_bytes(&mut secret);
                    (secret, true)
                }
            };

        let max_players_per_game: usize = parse_or(&lookup, "MAX_PLAYERS_PER_GAME", 10)?;
        if max_players_per_game == 0 {
            return Err(ConfigError::Invalid("MAX_PLAYERS_PER_GAME"));
        }

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),

            session_secret,
            session_secret_generated,

            max_players_per_game,
            delete_inactive_game_after: Duration::from_secs(parse_or(
                &lookup,
                "DELETE_INACTIVE_GAME_AFTER_SECS",
                1800,
            )?),
            kick_inactive_player_after: Duration::from_secs(parse_or(
                &lookup,
                "KICK_INACTIVE_PLAYER_AFTER_SECS",
                1800,
            )?),

            client_origin: lookup("CLIENT_ORIGIN").filter(|s| !s.trim().is_empty()),
        })
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            server_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            log_level: "debug".to_string(),
            session_secret: b"test-secret".to_vec(),
            session_secret_generated: false,
            max_players_per_game: 10,
            delete_inactive_game_after: Duration::from_secs(1800),
            kick_inactive_player_after: Duration::from_secs(1800),
            client_origin: None,
        }
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        None => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.server_addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.log_level, "info");
        assert_eq!(config.max_players_per_game, 10);
        assert_eq!(config.delete_inactive_game_after, Duration::from_secs(1800));
        assert_eq!(config.kick_inactive_player_after, Duration::from_secs(1800));
        assert!(config.session_secret_generated);
        assert_eq!(config.session_secret.len(), 32);
        assert!(config.client_origin.is_none());
    }

    #[test]
    fn port_wins_over_server_addr() {
        let config = config_from(&[("PORT", "9000"), ("SERVER_ADDR", "127.0.0.1:1234")]).unwrap();
        assert_eq!(config.server_addr.port(), 9000);

        let config = config_from(&[("SERVER_ADDR", "127.0.0.1:1234")]).unwrap();
        assert_eq!(config.server_addr, "127.0.0.1:1234".parse().unwrap());
    }

    #[test]
    fn explicit_values_are_used() {
        let config = config_from(&[
            ("SESSION_SECRET", "hunter2"),
            ("MAX_PLAYERS_PER_GAME", "4"),
            ("KICK_INACTIVE_PLAYER_AFTER_SECS", "60"),
            ("CLIENT_ORIGIN", "http://localhost:3000"),
        ])
        .unwrap();
        assert_eq!(config.session_secret, b"hunter2");
        assert!(!config.session_secret_generated);
        assert_eq!(config.max_players_per_game, 4);
        assert_eq!(config.kick_inactive_player_after, Duration::from_secs(60));
        assert_eq!(config.client_origin.as_deref(), Some("http://localhost:3000"));
    }

    #[test]
    fn malformed_numbers_are_errors() {
        assert!(matches!(
            config_from(&[("MAX_PLAYERS_PER_GAME", "lots")]),
            Err(ConfigError::Invalid("MAX_PLAYERS_PER_GAME"))
        ));
        assert!(matches!(
            config_from(&[("MAX_PLAYERS_PER_GAME", "0")]),
            Err(ConfigError::Invalid("MAX_PLAYERS_PER_GAME"))
        ));
        assert!(matches!(
            config_from(&[("PORT", "not-a-port")]),
            Err(ConfigError::InvalidAddress)
        ));
    }
}
