use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// key: keyed-locks -> single-flight per user or per payment intent
///
/// Guards are only held for the duration of one provisioning or settlement call.
pub struct KeyedLocks<K> {
    slots: DashMap<K, Arc<Mutex<()>>>,
}

impl<K> KeyedLocks<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }

    pub async fn acquire(&self, key: &K) -> OwnedMutexGuard<()> {
        let slot = {
            use dashmap::mapref::entry::Entry;
            match self.slots.entry(key.clone()) {
                Entry::Occupied(entry) => entry.get().clone(),
                Entry::Vacant(entry) => entry.insert(Arc::new(Mutex::new(()))).clone(),
            }
        };
        slot.lock_owned().await
    }

    /// Drops the slot for `key` once no guard or waiter still refers to it.
    /// Call after the guard from `acquire` has been dropped.
    pub fn release(&self, key: &K) {
        self.slots
            .remove_if(key, |_, slot| Arc::strong_count(slot) == 1);
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl<K> Default for KeyedLocks<K>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
