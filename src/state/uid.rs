//! Prefixed identifiers for accounts, rooms, relations, sessions and messages.

use uuid::Uuid;

/// Identifier of an account (also used for guests).
pub type AccountId = String;

/// Identifier of a session.
pub type SessionId = String;

/// Identifier of one physical connection.
pub type ConnId = String;

pub const ACCOUNT: &str = "acc";
pub const GUEST: &str = "guest";
pub const ROOM: &str = "room";
pub const CONTACT_ROOM: &str = "cont";
pub const RELATION: &str = "rel";
pub const SESSION: &str = "session";
pub const CONNECTION: &str = "conn";
pub const MESSAGE: &str = "msg";
pub const INVITE: &str = "inv";

/// Generate `<prefix>-<uuid v4>`.
pub fn new_id(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4().simple())
}

/// Whether `id` was minted with `prefix`.
pub fn has_prefix(id: &str, prefix: &str) -> bool {
    id.strip_prefix(prefix)
        .is_some_and(|rest| rest.starts_with('-'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixed_ids() {
        let id = new_id(GUEST);
        assert!(id.starts_with("guest-"));
        assert_eq!(id.len(), "guest-".len() + 32);
        assert!(has_prefix(&id, GUEST));
        assert!(!has_prefix(&id, ROOM));
    }

    #[test]
    fn test_ids_are_unique() {
        let a = new_id(ROOM);
        let b = new_id(ROOM);
        assert_ne!(a, b);
    }

    #[test]
    fn test_prefix_needs_separator() {
        assert!(!has_prefix("guesthouse", GUEST));
        assert!(has_prefix("cont-1", CONTACT_ROOM));
    }
}
