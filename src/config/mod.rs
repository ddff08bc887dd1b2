//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Core config struct definitions (Config, ServerConfig, TimeoutsConfig)
//! - [`listen`]: WebSocket listener configuration (ListenConfig)
//! - [`identity`]: Identity oracle configuration (IdentityConfig, StaticUser)

mod defaults;
mod identity;
mod listen;
mod types;

pub use identity::{IdentityConfig, StaticUser};
pub use listen::ListenConfig;
pub use types::{
    Config, ConfigError, DatabaseBackend, DatabaseConfig, LogConfig, LogFormat, RoomsConfig,
    ServerConfig, TimeoutsConfig,
};
