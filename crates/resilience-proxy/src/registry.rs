//! Construct-or-fetch memoization.

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use std::hash::Hash;
use std::sync::Arc;

/// A concurrent map whose values are built at most once per key.
///
/// Concurrent lookups of the same missing key block on a shared cell while
/// one of them runs the initializer; the others then observe its result. A
/// failed initializer leaves the key empty so a later lookup can try again.
pub(crate) struct Registry<K, V> {
    entries: DashMap<K, Arc<OnceCell<V>>>,
}

impl<K, V> Registry<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub(crate) fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Returns the value for `key`, running `init` if there is none yet.
    pub(crate) fn get_or_try_init<E, F>(&self, key: K, init: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        // The shard lock is released before `init` runs so initializers may
        // look up other keys.
        let cell = Arc::clone(&*self.entries.entry(key).or_default());
        cell.get_or_try_init(init).cloned()
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub(crate) fn insert(&self, key: K, value: V) {
        self.entries.insert(key, Arc::new(OnceCell::with_value(value)));
    }

    /// Returns the value for `key` if it has been built.
    pub(crate) fn get(&self, key: &K) -> Option<V> {
        self.entries.get(key).and_then(|cell| cell.get().cloned())
    }

    /// Number of built values.
    pub(crate) fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.value().get().is_some())
            .count()
    }
}
