//! Runtime state: sessions, accounts and the hub that owns them.
//!
//! ```text
//!   Hub ─┬─ SessionManager ── Session ── connections
//!        ├─ AccountManager ── AccountHandle ──► AccountActor
//!        ├─ RoomRegistry
//!        └─ WorkgroupIndex
//! ```

pub mod account;
pub mod dashmap_ext;
mod hub;
pub mod managers;
pub mod session;
pub mod uid;

pub use account::{AccountCommand, AccountHandle, AccountProfile, AccountState};
pub use hub::Hub;
pub use managers::{AccountManager, SessionManager, SessionSlot};
pub use session::{Session, SessionEvent};
