use dashmap::DashMap;
use std::borrow::Borrow;
use std::hash::Hash;

/// Helpers for `DashMap` that never leak a shard guard to the caller.
///
/// Registry and manager code awaits between map reads (room loads, store
/// calls, actor replies). A `Ref` held across one of those awaits blocks the
/// whole shard, so reads go through these cloning helpers instead.
pub trait DashMapExt<K, V> {
    /// Clone the value for `key`, releasing the shard immediately.
    fn get_cloned<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone;

    /// Clone every value.
    fn values_cloned(&self) -> Vec<V>
    where
        V: Clone;

    /// Clone every key.
    fn keys_cloned(&self) -> Vec<K>
    where
        K: Clone;
}

impl<K, V> DashMapExt<K, V> for DashMap<K, V>
where
    K: Eq + Hash,
{
    fn get_cloned<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        self.get(key).map(|r| r.value().clone())
    }

    fn values_cloned(&self) -> Vec<V>
    where
        V: Clone,
    {
        self.iter().map(|e| e.value().clone()).collect()
    }

    fn keys_cloned(&self) -> Vec<K>
    where
        K: Clone,
    {
        self.iter().map(|e| e.key().clone()).collect()
    }
}
