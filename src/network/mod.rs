//! Network module.
//!
//! Contains the Gateway (WebSocket listener), the transport-independent
//! Connection, and the authentication handshake.

mod connection;
mod gateway;
pub mod handshake;
mod websocket;

pub use connection::{ClientEnd, Connection, ConnectionSender, Outbound};
pub use gateway::Gateway;
pub use handshake::{Admitted, GatewayError};
