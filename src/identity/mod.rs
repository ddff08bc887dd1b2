//! Who is who: public identities, credential validation and default avatars.
//!
//! [`IdentityCache`] answers "what is the name and avatar of account X" for
//! rooms and accounts. Registered accounts are read through the store and
//! cached; guests never reach the store and exist only in the cache.

mod avatar;
pub mod oracle;

pub use avatar::{AvatarGenerator, InitialsAvatar};
pub use oracle::{AuthOracle, AuthProfile, HttpAuthOracle, IdentityError, StaticAuthOracle};

use crate::state::dashmap_ext::DashMapExt;
use crate::store::Store;
use dashmap::DashMap;
use futures_util::future::join_all;
use presence_proto::Identity;
use std::sync::Arc;
use tracing::warn;

/// Cached identity lookups.
pub struct IdentityCache {
    store: Arc<dyn Store>,
    avatars: Arc<dyn AvatarGenerator>,
    cache: DashMap<String, Identity>,
}

impl IdentityCache {
    pub fn new(store: Arc<dyn Store>, avatars: Arc<dyn AvatarGenerator>) -> Self {
        Self {
            store,
            avatars,
            cache: DashMap::new(),
        }
    }

    /// Resolve one identity. Store failures are logged and read as unknown.
    pub async fn get(&self, client_id: &str) -> Option<Identity> {
        if let Some(identity) = self.cache.get_cloned(client_id) {
            return Some(identity);
        }

        let account = match self.store.get_account(client_id).await {
            Ok(Some(account)) => account,
            Ok(None) => return None,
            Err(e) => {
                warn!(client_id = %client_id, error = %e, "Identity lookup failed");
                return None;
            }
        };

        let avatar = match account.avatar {
            Some(avatar) => Some(avatar),
            None => self.avatars.generate(&account.name).await,
        };
        let identity = Identity {
            client_id: account.client_id,
            name: account.name,
            avatar,
            email: None,
        };
        self.cache.insert(identity.client_id.clone(), identity.clone());
        Some(identity)
    }

    /// Resolve several identities concurrently, skipping unknown ids.
    pub async fn get_list(&self, client_ids: &[String]) -> Vec<Identity> {
        join_all(client_ids.iter().map(|id| self.get(id)))
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    /// Cached identity only, no store access.
    pub fn cached(&self, client_id: &str) -> Option<Identity> {
        self.cache.get_cloned(client_id)
    }

    /// Register a guest identity. Guests are never persisted.
    pub fn set_guest(&self, identity: Identity) {
        self.cache.insert(identity.client_id.clone(), identity);
    }

    /// Apply a display name change to the cached entry.
    pub fn update_name(&self, client_id: &str, name: &str) {
        if let Some(mut entry) = self.cache.get_mut(client_id) {
            entry.name = name.to_string();
        }
    }

    pub fn remove(&self, client_id: &str) {
        self.cache.remove(client_id);
    }

    /// Generate a default avatar for `name`.
    pub async fn default_avatar(&self, name: &str) -> Option<String> {
        self.avatars.generate(name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{AccountStore, MemoryStore};

    fn cache_over(store: Arc<MemoryStore>) -> IdentityCache {
        IdentityCache::new(store, Arc::new(InitialsAvatar))
    }

    #[tokio::test]
    async fn resolves_and_caches_accounts() {
        let store = Arc::new(MemoryStore::new());
        let acc = store.create_account("ann", None, "Ann Lee").await.unwrap();
        let cache = cache_over(store.clone());

        assert!(cache.cached(&acc.client_id).is_none());
        let identity = cache.get(&acc.client_id).await.unwrap();
        assert_eq!(identity.name, "Ann Lee");
        assert!(identity.avatar.unwrap().starts_with("data:image/svg+xml;base64,"));
        assert!(cache.cached(&acc.client_id).is_some());

        cache.update_name(&acc.client_id, "Ann");
        assert_eq!(cache.get(&acc.client_id).await.unwrap().name, "Ann");
    }

    #[tokio::test]
    async fn unknown_ids_are_skipped() {
        let store = Arc::new(MemoryStore::new());
        let acc = store.create_account("bob", None, "Bob").await.unwrap();
        let cache = cache_over(store);
        let list = cache
            .get_list(&[acc.client_id.clone(), "acc-missing".to_string()])
            .await;
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].client_id, acc.client_id);
    }

    #[tokio::test]
    async fn guests_live_only_in_cache() {
        let cache = cache_over(Arc::new(MemoryStore::new()));
        cache.set_guest(Identity {
            client_id: "guest-1".into(),
            name: "Visitor".into(),
            avatar: None,
            email: None,
        });
        assert_eq!(cache.get("guest-1").await.unwrap().name, "Visitor");
        cache.remove("guest-1");
        assert!(cache.get("guest-1").await.is_none());
    }
}
