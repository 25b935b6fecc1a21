//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::util::rate_limit::INPUT_RATE_LIMIT;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS, comma separated; `*` allows any
    pub client_origin: String,

    pub max_players_per_room: usize,
    pub max_rooms: usize,
    /// Client messages per second per connection
    pub input_rate_limit: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            log_level: "info".to_string(),
            client_origin: "*".to_string(),
            max_players_per_room: 8,
            max_rooms: 256,
            input_rate_limit: INPUT_RATE_LIMIT,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = match (var("PORT"), var("SERVER_ADDR")) {
            (Some(port), _) => format!("0.0.0.0:{}", port)
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,
            (None, Some(addr)) => addr.parse().map_err(|_| ConfigError::InvalidAddress)?,
            (None, None) => defaults.server_addr,
        };

        let max_players_per_room = parse_or(&var, "MAX_PLAYERS_PER_ROOM", defaults.max_players_per_room)?;
        if max_players_per_room < 2 {
            return Err(ConfigError::Invalid("MAX_PLAYERS_PER_ROOM"));
        }

        Ok(Self {
            server_addr,
            log_level: var("LOG_LEVEL").unwrap_or(defaults.log_level),
            client_origin: var("CLIENT_ORIGIN")
                .filter(|o| !o.trim().is_empty())
                .unwrap_or(defaults.client_origin),
            max_players_per_room,
            max_rooms: parse_or(&var, "MAX_ROOMS", defaults.max_rooms)?,
            input_rate_limit: parse_or(&var, "INPUT_RATE_LIMIT", defaults.input_rate_limit)?,
        })
    }
}

fn parse_or<T: FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match var(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        None => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid server address format")]
    InvalidAddress,

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = load(&[]).expect("config");
        assert_eq!(config.server_addr.port(), 8080);
        assert_eq!(config.client_origin, "*");
        assert_eq!(config.max_players_per_room, 8);
        assert_eq!(config.max_rooms, 256);
        assert_eq!(config.input_rate_limit, 120);
    }

    #[test]
    fn port_wins_over_server_addr() {
        let config = load(&[("PORT", "9000"), ("SERVER_ADDR", "127.0.0.1:7000")]).expect("config");
        assert_eq!(config.server_addr.port(), 9000);
    }

    #[test]
    fn bad_values_are_rejected() {
        assert_eq!(load(&[("PORT", "http")]).err(), Some(ConfigError::InvalidAddress));
        assert_eq!(
            load(&[("MAX_ROOMS", "lots")]).err(),
            Some(ConfigError::Invalid("MAX_ROOMS"))
        );
        assert_eq!(
            load(&[("MAX_PLAYERS_PER_ROOM", "1")]).err(),
            Some(ConfigError::Invalid("MAX_PLAYERS_PER_ROOM"))
        );
    }
}
