//! presenced - presence and room-messaging daemon.
//!
//! Clients connect over WebSocket, authenticate once, and share one session
//! per account across every device. Accounts join rooms, keep a contact list
//! derived from workgroups and 1:1 relations, and exchange events through
//! room actors.

pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod network;
pub mod rooms;
pub mod state;
pub mod store;
pub mod telemetry;
pub mod workgroups;
