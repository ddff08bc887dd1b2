//! Registries of live sessions and accounts.
//!
//! Each manager owns one map and its invariants; the hub composes them.

pub mod account;
pub mod session;

pub use account::AccountManager;
pub use session::{SessionManager, SessionSlot};
