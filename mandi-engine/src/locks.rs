use mandi_core::Map;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

// Unused entries are swept once the table grows past this size
const SWEEP_AT: usize = 1024;

/// One async mutex per key, created on demand.
///
/// Used to give every lot (and every wallet) a single writer while
/// unrelated keys proceed in parallel.
#[derive(Debug)]
pub struct KeyedLocks<K> {
    table: Mutex<Map<K, Arc<AsyncMutex<()>>>>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            table: Mutex::new(Map::default()),
        }
    }
}

impl<K: Hash + Eq + Ord + Copy> KeyedLocks<K> {
    /// Wait for exclusive access to `key`
    pub async fn lock(&self, key: K) -> OwnedMutexGuard<()> {
        self.entry(key).lock_owned().await
    }

    /// Wait for exclusive access to every key, acquired in sorted order so
    /// that overlapping callers cannot deadlock.
    pub async fn lock_all(&self, keys: impl IntoIterator<Item = K>) -> Vec<OwnedMutexGuard<()>> {
        let mut keys: Vec<K> = keys.into_iter().collect();
        keys.sort_unstable();
        keys.dedup();
        let mut guards = Vec::with_capacity(keys.len());
        for key in keys {
            guards.push(self.lock(key).await);
        }
        guards
    }

    fn entry(&self, key: K) -> Arc<AsyncMutex<()>> {
        let mut table = self
            .table
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if table.len() >= SWEEP_AT {
            table.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        table.entry(key).or_default().clone()
    }
}
