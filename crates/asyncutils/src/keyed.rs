use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockMap<K> = Arc<Mutex<HashMap<K, Arc<AsyncMutex<()>>>>>;

/// A set of async mutexes, one per key, created on demand.
///
/// Holding the guard for a key excludes every other holder of the same key
/// while leaving other keys untouched. Entries are removed again once nobody
/// holds or waits for them, so the map only ever contains contended keys.
///
/// ```
/// use gitshelf_asyncutils::KeyedLocks;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let locks = KeyedLocks::default();
/// let guard = locks.lock((1, "3b18e512")).await;
/// assert!(locks.try_lock((1, "3b18e512")).is_none());
/// assert!(locks.try_lock((2, "3b18e512")).is_some());
/// drop(guard);
/// assert!(locks.is_empty());
/// # }
/// ```
pub struct KeyedLocks<K> {
    locks: LockMap<K>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K> Clone for KeyedLocks<K> {
    fn clone(&self) -> Self {
        Self {
            locks: Arc::clone(&self.locks),
        }
    }
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    fn entry(&self, key: &K) -> Arc<AsyncMutex<()>> {
        // The map is only touched in short, non-async sections; a panic in one
        // of them cannot leave it half-updated.
        let mut map = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(map.entry(key.clone()).or_default())
    }

    /// Wait until `key` is free, then hold it until the guard is dropped.
    pub async fn lock(&self, key: K) -> KeyedGuard<K> {
        let mutex = self.entry(&key);
        let guard = mutex.lock_owned().await;
        KeyedGuard {
            key,
            locks: Arc::clone(&self.locks),
            guard: Some(guard),
        }
    }

    /// Take `key` only if nobody holds it right now.
    pub fn try_lock(&self, key: K) -> Option<KeyedGuard<K>> {
        let mutex = self.entry(&key);
        match mutex.try_lock_owned() {
            Ok(guard) => Some(KeyedGuard {
                key,
                locks: Arc::clone(&self.locks),
                guard: Some(guard),
            }),
            Err(_) => None,
        }
    }

    /// Number of keys currently held or waited on.
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Drop the map entry for `key` if the only remaining reference is the map's
/// own (plus `held`, about to be released by the caller).
fn release<K: Eq + Hash>(locks: &LockMap<K>, key: &K, held: Option<OwnedMutexGuard<()>>) {
    let mut map = locks.lock().unwrap_or_else(PoisonError::into_inner);
    drop(held);
    if let Some(mutex) = map.get(key)
        && Arc::strong_count(mutex) == 1
    {
        map.remove(key);
    }
}

/// Exclusive hold on one key of a [`KeyedLocks`].
pub struct KeyedGuard<K: Eq + Hash> {
    key: K,
    locks: LockMap<K>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K: Eq + Hash> KeyedGuard<K> {
    pub fn key(&self) -> &K {
        &self.key
    }
}

impl<K: Eq + Hash> Drop for KeyedGuard<K> {
    fn drop(&mut self) {
        release(&self.locks, &self.key, self.guard.take());
    }
}
