//! Per-user remote credentials with a short-lived cache in front.

use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use gitshelf_asyncutils::KeyedLocks;
use gitshelf_index::{ConfigStore, ConfigValue};
use gitshelf_storage::Credential;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::instrument;

const NAMESPACE: &str = "github";
const NAME: &str = "token";

/// Transient store of credentials keyed by owner.
///
/// Implementations must be safe under concurrent use: a read racing an
/// invalidate may see the old value, but never a partially written one.
#[async_trait]
pub trait TokenCache: Send + Sync {
    async fn get(&self, owner_id: i64) -> Result<Option<Credential>>;
    async fn set(&self, owner_id: i64, credential: Credential, ttl: Duration) -> Result<()>;
    async fn invalidate(&self, owner_id: i64) -> Result<()>;
}

/// In-process [`TokenCache`]. Expired entries are dropped lazily on read.
#[derive(Default)]
pub struct MemoryTokenCache {
    entries: RwLock<HashMap<i64, (Credential, Instant)>>,
}

#[async_trait]
impl TokenCache for MemoryTokenCache {
    async fn get(&self, owner_id: i64) -> Result<Option<Credential>> {
        {
            let entries = self.entries.read().await;
            match entries.get(&owner_id) {
                None => return Ok(None),
                Some((credential, expires)) if Instant::now() < *expires => return Ok(Some(credential.clone())),
                Some(_) => (),
            }
        }
        let mut entries = self.entries.write().await;
        // Re-check under the write lock: a fresh value may have landed meanwhile.
        if entries.get(&owner_id).is_some_and(|(_, expires)| Instant::now() >= *expires) {
            entries.remove(&owner_id);
        }
        Ok(entries.get(&owner_id).map(|(credential, _)| credential.clone()))
    }

    async fn set(&self, owner_id: i64, credential: Credential, ttl: Duration) -> Result<()> {
        self.entries.write().await.insert(owner_id, (credential, Instant::now() + ttl));
        Ok(())
    }

    async fn invalidate(&self, owner_id: i64) -> Result<()> {
        self.entries.write().await.remove(&owner_id);
        Ok(())
    }
}

/// Read-through access to the credentials persisted in the config table.
///
/// Reads never fail because of the cache: cache errors are logged and the
/// persisted value is used. Writes go to the persisted store first and then
/// invalidate the cache entry before returning, so a rotated credential is
/// never served stale by this process.
///
/// A cache miss loads and repopulates under the owner's lock, and writes
/// hold the same lock until the cache is invalidated. A reader that loaded
/// the old value can therefore not put it back after a rotation.
#[derive(Clone)]
pub struct Credentials {
    store: ConfigStore,
    cache: Arc<dyn TokenCache + Send + Sync>,
    ttl: Duration,
    locks: KeyedLocks<i64>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials").field("ttl", &self.ttl).finish_non_exhaustive()
    }
}

impl Credentials {
    pub fn new(store: ConfigStore, cache: Arc<dyn TokenCache + Send + Sync>, ttl: Duration) -> Self {
        Self { store, cache, ttl, locks: KeyedLocks::default() }
    }

    /// The owner's credential, or [`ErrorKind::CredentialMissing`].
    #[instrument(skip(self))]
    pub async fn get(&self, owner_id: i64) -> Result<Credential> {
        match self.cache.get(owner_id).await {
            Ok(Some(credential)) => return Ok(credential),
            Ok(None) => (),
            Err(e) => tracing::warn!(error = %e, "credential cache unavailable, reading from store"),
        }
        let _guard = self.locks.lock(owner_id).await;
        let credential = self
            .store
            .get(owner_id, NAMESPACE, NAME)
            .await
            .or_raise(|| ErrorKind::Index)?
            .as_ref()
            .and_then(ConfigValue::as_str)
            .map(Credential::new)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| exn::Exn::from(ErrorKind::CredentialMissing))?;
        if let Err(e) = self.cache.set(owner_id, credential.clone(), self.ttl).await {
            tracing::warn!(error = %e, "could not populate credential cache");
        }
        Ok(credential)
    }

    /// Store (or rotate) the owner's credential.
    #[instrument(skip(self, token))]
    pub async fn set(&self, owner_id: i64, token: &str) -> Result<()> {
        let token = token.trim();
        if token.is_empty() {
            exn::bail!(ErrorKind::Validation("credential must not be empty".to_string()));
        }
        let _guard = self.locks.lock(owner_id).await;
        self.store.set(owner_id, NAMESPACE, NAME, &ConfigValue::from(token)).await.or_raise(|| ErrorKind::Index)?;
        self.cache.invalidate(owner_id).await.or_raise(|| ErrorKind::Cache)?;
        tracing::info!("credential updated");
        Ok(())
    }

    /// Forget the owner's credential. Returns `false` if none was stored.
    #[instrument(skip(self))]
    pub async fn clear(&self, owner_id: i64) -> Result<bool> {
        let _guard = self.locks.lock(owner_id).await;
        let removed = self.store.remove(owner_id, NAMESPACE, NAME).await.or_raise(|| ErrorKind::Index)?;
        self.cache.invalidate(owner_id).await.or_raise(|| ErrorKind::Cache)?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitshelf_index::Database;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Notify;

    struct BrokenCache;

    #[async_trait]
    impl TokenCache for BrokenCache {
        async fn get(&self, _: i64) -> Result<Option<Credential>> {
            exn::bail!(ErrorKind::Cache)
        }
        async fn set(&self, _: i64, _: Credential, _: Duration) -> Result<()> {
            exn::bail!(ErrorKind::Cache)
        }
        async fn invalidate(&self, _: i64) -> Result<()> {
            exn::bail!(ErrorKind::Cache)
        }
    }

    /// Parks the first armed `set` until released.
    #[derive(Default)]
    struct GatedCache {
        inner: MemoryTokenCache,
        armed: AtomicBool,
        parked: Notify,
        release: Notify,
    }

    #[async_trait]
    impl TokenCache for GatedCache {
        async fn get(&self, owner_id: i64) -> Result<Option<Credential>> {
            self.inner.get(owner_id).await
        }
        async fn set(&self, owner_id: i64, credential: Credential, ttl: Duration) -> Result<()> {
            if self.armed.swap(false, Ordering::SeqCst) {
                self.parked.notify_one();
                self.release.notified().await;
            }
            self.inner.set(owner_id, credential, ttl).await
        }
        async fn invalidate(&self, owner_id: i64) -> Result<()> {
            self.inner.invalidate(owner_id).await
        }
    }

    async fn credentials(cache: Arc<dyn TokenCache + Send + Sync>) -> (Credentials, Database) {
        let db = Database::connect_in_memory().await.unwrap();
        (Credentials::new(db.config(), cache, Duration::from_secs(3600)), db)
    }

    #[tokio::test]
    async fn test_missing_credential() {
        let (credentials, _db) = credentials(Arc::new(MemoryTokenCache::default())).await;
        let err = credentials.get(1).await.unwrap_err();
        assert_eq!(*err, ErrorKind::CredentialMissing);
        assert_eq!((*err).to_string(), "credential not configured, please provide one");
    }

    #[tokio::test]
    async fn test_read_through_populates_cache() {
        let cache = Arc::new(MemoryTokenCache::default());
        let (credentials, db) = credentials(cache.clone()).await;
        db.config().set(1, "github", "token", &ConfigValue::from("abc")).await.unwrap();
        assert!(cache.get(1).await.unwrap().is_none());
        assert_eq!(credentials.get(1).await.unwrap().expose(), "abc");
        assert_eq!(cache.get(1).await.unwrap().unwrap().expose(), "abc");
    }

    #[tokio::test]
    async fn test_rotation_invalidates_before_returning() {
        let (credentials, _db) = credentials(Arc::new(MemoryTokenCache::default())).await;
        credentials.set(1, "old").await.unwrap();
        assert_eq!(credentials.get(1).await.unwrap().expose(), "old");
        credentials.set(1, "new").await.unwrap();
        assert_eq!(credentials.get(1).await.unwrap().expose(), "new");
        assert!(credentials.clear(1).await.unwrap());
        assert_eq!(*credentials.get(1).await.unwrap_err(), ErrorKind::CredentialMissing);
    }

    #[tokio::test]
    async fn test_rotation_during_slow_read_is_not_undone() {
        let cache = Arc::new(GatedCache::default());
        let (credentials, _db) = credentials(cache.clone()).await;
        credentials.set(1, "old").await.unwrap();

        cache.armed.store(true, Ordering::SeqCst);
        let reader = tokio::spawn({
            let credentials = credentials.clone();
            async move { credentials.get(1).await }
        });
        // The reader has loaded "old" and is about to cache it.
        cache.parked.notified().await;
        let writer = tokio::spawn({
            let credentials = credentials.clone();
            async move { credentials.set(1, "new").await }
        });
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(!writer.is_finished());

        cache.release.notify_one();
        assert_eq!(reader.await.unwrap().unwrap().expose(), "old");
        writer.await.unwrap().unwrap();
        assert!(cache.inner.get(1).await.unwrap().is_none());
        assert_eq!(credentials.get(1).await.unwrap().expose(), "new");
    }

    #[tokio::test]
    async fn test_empty_credential_rejected() {
        let (credentials, _db) = credentials(Arc::new(MemoryTokenCache::default())).await;
        let err = credentials.set(1, "  ").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Validation(_)));
    }

    #[tokio::test]
    async fn test_broken_cache_degrades_reads() {
        let (credentials, db) = credentials(Arc::new(BrokenCache)).await;
        db.config().set(1, "github", "token", &ConfigValue::from("abc")).await.unwrap();
        assert_eq!(credentials.get(1).await.unwrap().expose(), "abc");
        // Writes cannot confirm invalidation, so they do surface it.
        assert_eq!(*credentials.set(1, "def").await.unwrap_err(), ErrorKind::Cache);
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_cache_expires() {
        let cache = MemoryTokenCache::default();
        cache.set(1, Credential::new("abc"), Duration::from_secs(60)).await.unwrap();
        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(cache.get(1).await.unwrap().is_some());
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get(1).await.unwrap().is_none());
        assert!(cache.entries.read().await.is_empty());
    }
}
