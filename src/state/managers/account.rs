//! Running accounts by id.

use crate::state::account::{AccountCommand, AccountHandle};
use crate::state::dashmap_ext::DashMapExt;
use crate::state::uid::AccountId;
use dashmap::DashMap;
use tracing::debug;

#[derive(Default)]
pub struct AccountManager {
    accounts: DashMap<AccountId, AccountHandle>,
}

impl AccountManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a running account. A previous handle for the same id is
    /// closed.
    pub fn insert(&self, handle: AccountHandle) {
        if let Some(old) = self
            .accounts
            .insert(handle.account_id().to_string(), handle)
        {
            debug!(account_id = %old.account_id(), "Replacing account handle");
            old.close();
        }
    }

    pub fn get(&self, account_id: &str) -> Option<AccountHandle> {
        self.accounts.get_cloned(account_id)
    }

    pub fn remove(&self, account_id: &str) -> Option<AccountHandle> {
        self.accounts.remove(account_id).map(|(_, handle)| handle)
    }

    /// Remove the account only if it runs on `session_id`.
    pub fn remove_for_session(&self, account_id: &str, session_id: &str) -> Option<AccountHandle> {
        self.accounts
            .remove_if(account_id, |_, handle| handle.session_id() == session_id)
            .map(|(_, handle)| handle)
    }

    /// Queue a command for an account. Returns `false` when the account is
    /// not running here or cannot take it.
    pub fn notify(&self, account_id: &str, command: AccountCommand) -> bool {
        match self.get(account_id) {
            Some(handle) => handle.notify(command),
            None => false,
        }
    }

    pub fn ids(&self) -> Vec<AccountId> {
        self.accounts.keys_cloned()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}
