//! # presence-proto
//!
//! Wire-level types shared by the presence daemon and its clients.
//!
//! Every frame exchanged with a client is an [`Event`]: a tagged union
//! `{"type": <string>, "data": <type-specific>}`. This crate defines the
//! envelope, the typed payloads the server parses out of it, and the stable
//! error codes reported back to clients.
//!
//! ```rust
//! use presence_proto::{Event, ErrorCode, kinds};
//!
//! let ready = Event::bare(kinds::READY);
//! assert_eq!(ready.kind(), "ready");
//!
//! let err = Event::error(ErrorCode::NoRoom, None);
//! assert_eq!(err.data["error"], "ERR_NO_ROOM");
//! ```

mod error;
mod event;
pub mod payload;
pub mod websocket;

pub use error::{ErrorCode, ProtocolError};
pub use event::{Event, kinds};
pub use payload::{Identity, WorkgroupRef, WorkgroupSnapshot};
