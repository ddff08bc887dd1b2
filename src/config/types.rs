//! Core configuration types and loading.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use super::defaults::*;
use super::identity::IdentityConfig;
use super::listen::ListenConfig;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Daemon configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server information.
    #[serde(default)]
    pub server: ServerConfig,
    /// WebSocket listen configuration.
    #[serde(default)]
    pub listen: ListenConfig,
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Identity oracle configuration.
    #[serde(default)]
    pub identity: IdentityConfig,
    /// Handshake and eviction timers.
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    /// Room behavior.
    #[serde(default)]
    pub rooms: RoomsConfig,
    /// Log output.
    #[serde(default)]
    pub log: LogConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.timeouts.auth_secs == 0 {
            return Err(ConfigError::Invalid(
                "timeouts.auth_secs must be greater than zero".to_string(),
            ));
        }
        if self.database.backend == DatabaseBackend::Sqlite && self.database.path.is_empty() {
            return Err(ConfigError::Invalid(
                "database.path is required for the sqlite backend".to_string(),
            ));
        }
        Ok(())
    }
}

/// Server identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Server name, reported in logs.
    #[serde(default = "default_server_name")]
    pub name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: default_server_name(),
        }
    }
}

/// Storage backend selection.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    /// SQLite file (or `:memory:`) through sqlx.
    #[default]
    Sqlite,
    /// Process-local store; nothing survives a restart.
    Memory,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub backend: DatabaseBackend,
    /// Path to SQLite database file.
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: DatabaseBackend::default(),
            path: default_database_path(),
        }
    }
}

/// Timer configuration.
///
/// - `auth_secs`: time a new connection has to answer the `authenticate` challenge
/// - `room_empty_secs`: grace period before a room without online participants is evicted
#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutsConfig {
    #[serde(default = "default_auth_timeout")]
    pub auth_secs: u64,
    #[serde(default = "default_room_empty_timeout")]
    pub room_empty_secs: u64,
}

impl TimeoutsConfig {
    pub fn auth(&self) -> Duration {
        Duration::from_secs(self.auth_secs)
    }

    pub fn room_empty(&self) -> Duration {
        Duration::from_secs(self.room_empty_secs)
    }
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            auth_secs: default_auth_timeout(),
            room_empty_secs: default_room_empty_timeout(),
        }
    }
}

/// Room configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RoomsConfig {
    /// Avatar shown for guests that did not bring one.
    #[serde(default)]
    pub guest_avatar: String,
    /// Number of chat messages kept in memory per room.
    #[serde(default = "default_log_tail")]
    pub log_tail: usize,
}

impl Default for RoomsConfig {
    fn default() -> Self {
        Self {
            guest_avatar: String::new(),
            log_tail: default_log_tail(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration. `RUST_LOG` still controls filtering.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub format: LogFormat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.timeouts.auth(), Duration::from_secs(20));
        assert_eq!(config.timeouts.room_empty(), Duration::from_secs(20));
        assert_eq!(config.database.backend, DatabaseBackend::Sqlite);
        assert_eq!(config.rooms.log_tail, 50);
        assert!(config.identity.url.is_none());
    }

    #[test]
    fn full_config_parses() {
        let config = Config::parse(
            r#"
            [server]
            name = "presence.test"

            [listen]
            address = "0.0.0.0:9000"
            allow_origins = ["https://app.example"]

            [database]
            backend = "memory"

            [timeouts]
            auth_secs = 5
            room_empty_secs = 1

            [log]
            format = "json"

            [[identity.user]]
            auth_id = "tok-ann"
            login = "ann"
            name = "Ann"
            admin = true

            [identity.user.workgroups]
            stream = ["ops"]
            "#,
        )
        .unwrap();
        assert_eq!(config.server.name, "presence.test");
        assert_eq!(config.listen.address.port(), 9000);
        assert_eq!(config.database.backend, DatabaseBackend::Memory);
        assert_eq!(config.timeouts.auth_secs, 5);
        assert_eq!(config.log.format, LogFormat::Json);
        assert_eq!(config.identity.users.len(), 1);
        assert!(config.identity.users[0].admin);
        assert_eq!(config.identity.users[0].workgroups.stream, vec!["ops"]);
    }

    #[test]
    fn zero_auth_timeout_is_rejected() {
        let err = Config::parse("[timeouts]\nauth_secs = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
