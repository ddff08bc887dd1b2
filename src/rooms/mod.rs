//! Rooms: group rooms, contact rooms and the registry that owns them.
//!
//! Every live room is a [`RoomActor`] task reached through a cloneable
//! [`RoomHandle`]. The actor owns all room state, so a mutation and the
//! broadcast describing it are never interleaved with another command.
//! [`RoomRegistry`] hands out handles and guarantees one instance per id.

pub mod actor;
pub mod chat;
pub mod invites;
pub mod live;
pub mod policy;
pub mod settings;

mod handle;
mod registry;

#[cfg(test)]
pub(crate) mod testing;

pub use actor::{
    ConnectRequest, MemberProfile, RoomActor, RoomBinding, RoomConfig, RoomContext, RoomDelivery,
    RoomNotice, RoomState,
};
pub use handle::RoomHandle;
pub use policy::{ContactPolicy, RoomKind};
pub use registry::{AccountNotice, RoomOptions, RoomRegistry};
