//! Invite tokens held by ephemeral rooms.
//!
//! Persistent rooms keep their tokens in the invite store so they survive a
//! reload; a room that has not been promoted only has this book.

use crate::state::uid::{self, new_id};
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct PendingInvite {
    single_use: bool,
    created_by: String,
}

#[derive(Debug, Default)]
pub struct InviteBook {
    tokens: HashMap<String, PendingInvite>,
}

impl InviteBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a fresh token.
    pub fn mint(&mut self, single_use: bool, created_by: &str) -> String {
        let token = new_token();
        self.tokens.insert(
            token.clone(),
            PendingInvite {
                single_use,
                created_by: created_by.to_string(),
            },
        );
        token
    }

    /// Check a token, consuming it when single-use.
    pub fn redeem(&mut self, token: &str) -> bool {
        match self.tokens.get(token) {
            Some(invite) if invite.single_use => {
                self.tokens.remove(token);
                true
            }
            Some(_) => true,
            None => false,
        }
    }

    pub fn revoke(&mut self, token: &str) -> bool {
        self.tokens.remove(token).is_some()
    }

    /// Who minted `token`.
    pub fn creator(&self, token: &str) -> Option<&str> {
        self.tokens.get(token).map(|i| i.created_by.as_str())
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

pub fn new_token() -> String {
    new_id(uid::INVITE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_use_tokens_are_consumed() {
        let mut book = InviteBook::new();
        let once = book.mint(true, "acc-1");
        let many = book.mint(false, "acc-1");

        assert!(book.redeem(&once));
        assert!(!book.redeem(&once));
        assert!(book.redeem(&many));
        assert!(book.redeem(&many));
        assert_eq!(book.creator(&many), Some("acc-1"));
    }

    #[test]
    fn unknown_and_revoked_tokens_fail() {
        let mut book = InviteBook::new();
        assert!(!book.redeem("inv-nope"));
        let token = book.mint(false, "acc-1");
        assert!(book.revoke(&token));
        assert!(!book.redeem(&token));
        assert!(book.is_empty());
    }
}
