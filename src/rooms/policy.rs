//! Group vs. contact room behavior.
//!
//! A contact room is an ordinary room core with a fixed pair of participants
//! drawn from a relation. Everything that differs between the two flavours is
//! answered here so the actor never branches on ad hoc flags.

use crate::store::RelationRecord;

/// The two accounts behind a contact room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactPolicy {
    pub relation_id: String,
    pub account_a: String,
    pub account_b: String,
}

impl ContactPolicy {
    pub fn from_relation(relation: &RelationRecord) -> Self {
        Self {
            relation_id: relation.client_id.clone(),
            account_a: relation.account_a.clone(),
            account_b: relation.account_b.clone(),
        }
    }

    /// The counterpart of `account_id`, if it is one of the pair.
    pub fn other(&self, account_id: &str) -> Option<&str> {
        if account_id == self.account_a {
            Some(&self.account_b)
        } else if account_id == self.account_b {
            Some(&self.account_a)
        } else {
            None
        }
    }

    pub fn is_member(&self, account_id: &str) -> bool {
        self.other(account_id).is_some()
    }

    pub fn members(&self) -> [String; 2] {
        [self.account_a.clone(), self.account_b.clone()]
    }
}

/// Room flavour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomKind {
    Group,
    Contact(ContactPolicy),
}

impl RoomKind {
    pub fn is_contact(&self) -> bool {
        matches!(self, Self::Contact(_))
    }

    pub fn contact(&self) -> Option<&ContactPolicy> {
        match self {
            Self::Contact(policy) => Some(policy),
            Self::Group => None,
        }
    }

    /// The id a participant's client knows this room by. Contact rooms are
    /// addressed by the other account's id.
    pub fn client_room_id(&self, room_id: &str, account_id: &str) -> String {
        match self {
            Self::Contact(policy) => policy.other(account_id).unwrap_or(room_id).to_string(),
            Self::Group => room_id.to_string(),
        }
    }

    /// Key of the room's message history.
    pub fn log_key<'a>(&'a self, room_id: &'a str) -> &'a str {
        match self {
            Self::Contact(policy) => &policy.relation_id,
            Self::Group => room_id,
        }
    }

    /// Whether join, leave, online and offline changes are broadcast.
    pub fn announces_presence(&self) -> bool {
        !self.is_contact()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ContactPolicy {
        ContactPolicy::from_relation(&RelationRecord {
            client_id: "rel-1".into(),
            account_a: "acc-a".into(),
            account_b: "acc-b".into(),
            room_id: Some("cont-1".into()),
        })
    }

    #[test]
    fn other_side_is_total_for_members() {
        let p = policy();
        assert_eq!(p.other("acc-a"), Some("acc-b"));
        assert_eq!(p.other("acc-b"), Some("acc-a"));
        assert_eq!(p.other("acc-c"), None);
    }

    #[test]
    fn contact_rooms_are_addressed_by_counterpart() {
        let kind = RoomKind::Contact(policy());
        assert_eq!(kind.client_room_id("cont-1", "acc-a"), "acc-b");
        assert_eq!(kind.log_key("cont-1"), "rel-1");
        assert!(!kind.announces_presence());

        let group = RoomKind::Group;
        assert_eq!(group.client_room_id("room-1", "acc-a"), "room-1");
        assert_eq!(group.log_key("room-1"), "room-1");
    }
}
