//! Room actor command handlers.
//!
//! Each submodule handles one category of [`RoomCommand`](super::RoomCommand)
//! or client room event processed by [`RoomActor`](super::RoomActor).

pub mod authorization;
pub mod broadcast;
pub mod chat;
pub mod client;
pub mod invites;
pub mod membership;
pub mod settings;
pub mod snapshot;
pub mod workgroups;
