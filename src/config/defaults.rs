//! Default value functions for configuration.
//!
//! Separated into its own module for clarity and reuse.

use std::net::SocketAddr;

// =============================================================================
// Server Defaults
// =============================================================================

pub fn default_server_name() -> String {
    "presence.local".to_string()
}

pub fn default_listen_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 7070))
}

// =============================================================================
// Database Defaults
// =============================================================================

pub fn default_database_path() -> String {
    "presence.db".to_string()
}

// =============================================================================
// Timeout Defaults
// =============================================================================

/// Seconds a fresh connection has to answer the `authenticate` challenge.
pub fn default_auth_timeout() -> u64 {
    20
}

/// Seconds a room may stay without online participants before eviction.
pub fn default_room_empty_timeout() -> u64 {
    20
}

// =============================================================================
// Room Defaults
// =============================================================================

pub fn default_log_tail() -> usize {
    50
}

pub fn default_identity_timeout() -> u64 {
    10
}
