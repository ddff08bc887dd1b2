//! An account's contact list.

use crate::state::uid::AccountId;
use crate::store::RelationState;
use presence_proto::Identity;
use serde::Serialize;
use std::collections::HashMap;

/// One entry of the contact list, as sent in `contact-add` and `initialize`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub client_id: AccountId,
    pub identity: Identity,
    /// Unread state of the 1:1 log; `None` before the pair ever talked.
    pub relation: Option<RelationState>,
}

/// Contacts by id plus their insertion order.
#[derive(Debug, Default)]
pub struct ContactBook {
    owner: AccountId,
    contacts: HashMap<AccountId, Contact>,
    order: Vec<AccountId>,
    // counterpart -> relation state, kept even for ids that are not contacts
    relations: HashMap<AccountId, Option<RelationState>>,
}

impl ContactBook {
    pub fn new(owner: AccountId) -> Self {
        Self {
            owner,
            ..Self::default()
        }
    }

    /// Record that the owner has a relation with `contact_id`.
    pub fn set_relation(&mut self, contact_id: &str, state: Option<RelationState>) {
        if let Some(contact) = self.contacts.get_mut(contact_id) {
            contact.relation = state.clone();
        }
        self.relations.insert(contact_id.to_string(), state);
    }

    pub fn has_relation(&self, contact_id: &str) -> bool {
        self.relations.contains_key(contact_id)
    }

    /// Add a contact. Returns the new entry, or `None` when the identity is
    /// the owner or already listed.
    pub fn add(&mut self, identity: Identity) -> Option<&Contact> {
        let id = identity.client_id.clone();
        if id == self.owner || self.contacts.contains_key(&id) {
            return None;
        }
        let contact = Contact {
            client_id: id.clone(),
            identity,
            relation: self.relations.get(&id).cloned().flatten(),
        };
        self.order.push(id.clone());
        Some(&*self.contacts.entry(id).or_insert(contact))
    }

    /// Remove a contact. Pairs with a relation stay listed. Returns whether
    /// anything was removed.
    pub fn remove(&mut self, contact_id: &str) -> bool {
        if self.has_relation(contact_id) {
            return false;
        }
        if self.contacts.remove(contact_id).is_none() {
            return false;
        }
        self.order.retain(|id| id != contact_id);
        true
    }

    pub fn contains(&self, contact_id: &str) -> bool {
        self.contacts.contains_key(contact_id)
    }

    pub fn ids(&self) -> &[AccountId] {
        &self.order
    }

    /// Ids from `candidates` that are not listed yet.
    pub fn missing(&self, candidates: &[AccountId]) -> Vec<AccountId> {
        candidates
            .iter()
            .filter(|id| **id != self.owner && !self.contacts.contains_key(*id))
            .cloned()
            .collect()
    }

    /// Contacts in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Contact> {
        self.order.iter().filter_map(|id| self.contacts.get(id))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(id: &str) -> Identity {
        Identity {
            client_id: id.to_string(),
            name: id.to_uppercase(),
            avatar: None,
            email: None,
        }
    }

    #[test]
    fn add_is_idempotent() {
        let mut book = ContactBook::new("acc-me".into());
        assert!(book.add(identity("acc-a")).is_some());
        assert!(book.add(identity("acc-a")).is_none());
        assert!(book.add(identity("acc-me")).is_none());
        assert_eq!(book.ids(), ["acc-a".to_string()]);
    }

    #[test]
    fn remove_missing_is_noop() {
        let mut book = ContactBook::new("acc-me".into());
        assert!(!book.remove("acc-a"));
        book.add(identity("acc-a"));
        book.add(identity("acc-b"));
        assert!(book.remove("acc-a"));
        assert!(!book.remove("acc-a"));
        assert_eq!(book.ids(), ["acc-b".to_string()]);
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn relations_pin_contacts() {
        let mut book = ContactBook::new("acc-me".into());
        let state = RelationState {
            unread: 2,
            ..RelationState::default()
        };
        book.set_relation("acc-a", Some(state.clone()));
        let added = book.add(identity("acc-a")).unwrap();
        assert_eq!(added.relation, Some(state));
        assert!(!book.remove("acc-a"));
        assert!(book.contains("acc-a"));
    }

    #[test]
    fn missing_skips_known_and_owner() {
        let mut book = ContactBook::new("acc-me".into());
        book.add(identity("acc-a"));
        let ids = vec!["acc-a".to_string(), "acc-me".to_string(), "acc-b".to_string()];
        assert_eq!(book.missing(&ids), vec!["acc-b".to_string()]);
    }

    #[test]
    fn serializes_camel_case() {
        let mut book = ContactBook::new("acc-me".into());
        book.add(identity("acc-a"));
        let value = serde_json::to_value(book.iter().next().unwrap()).unwrap();
        assert_eq!(value["clientId"], "acc-a");
        assert_eq!(value["identity"]["name"], "ACC-A");
        assert!(value["relation"].is_null());
    }
}
