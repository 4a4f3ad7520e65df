//! Process-wide mutexes keyed by Vault API path.
//!
//! Resources that read-modify-write a shared Vault object (for example several
//! `*_policies` resources pointing at the same group) take the lock for that
//! object's path first. Locks for different paths never block each other.
//! There is no timeout and nothing is shared across processes.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

#[derive(Default)]
pub struct MutexKV {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Held lock for one key. Dropping it unlocks.
#[must_use = "the path is unlocked as soon as the guard is dropped"]
pub struct PathGuard {
    key: String,
    _guard: OwnedMutexGuard<()>,
}

impl PathGuard {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn unlock(self) {}
}

impl Drop for PathGuard {
    fn drop(&mut self) {
        debug!("Unlocked {:?}", self.key);
    }
}

impl MutexKV {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
        )
    }

    /// Waits until no other holder has `key`, then returns the guard.
    pub async fn lock(&self, key: &str) -> PathGuard {
        debug!("Locking {:?}", key);
        let guard = self.entry(key).lock_owned().await;
        debug!("Locked {:?}", key);
        PathGuard {
            key: key.to_string(),
            _guard: guard,
        }
    }

    /// Number of keys ever locked. Entries live until the table is dropped.
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

static VAULT_MUTEX_KV: Lazy<MutexKV> = Lazy::new(MutexKV::new);

pub fn vault_mutex_kv() -> &'static MutexKV {
    &VAULT_MUTEX_KV
}

/// Locks `path` in the process-wide table.
pub async fn lock(path: &str) -> PathGuard {
    vault_mutex_kv().lock(path).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_serializes() {
        let kv = Arc::new(MutexKV::new());
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let kv = Arc::clone(&kv);
            let in_flight = Arc::clone(&in_flight);
            let max_seen = Arc::clone(&max_seen);
            handles.push(tokio::spawn(async move {
                let _guard = kv.lock("identity/group/id/abc").await;
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert_eq!(kv.len(), 1);
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_block() {
        let kv = MutexKV::new();
        let first = kv.lock("identity/group/id/a").await;
        let second = tokio::time::timeout(Duration::from_secs(1), kv.lock("identity/group/id/b"))
            .await
            .expect("a different path must not wait");
        assert_eq!(first.key(), "identity/group/id/a");
        assert_eq!(second.key(), "identity/group/id/b");
    }

    #[tokio::test]
    async fn test_unlock_releases() {
        let kv = MutexKV::new();
        let guard = kv.lock("sys/policies/acl/dev").await;
        guard.unlock();
        tokio::time::timeout(Duration::from_secs(1), kv.lock("sys/policies/acl/dev"))
            .await
            .expect("lock must be free after unlock");
    }

    #[tokio::test]
    #[serial]
    async fn test_global_table_is_shared() {
        let guard = lock("identity/entity/id/shared").await;
        let blocked =
            tokio::time::timeout(Duration::from_millis(50), lock("identity/entity/id/shared"))
                .await;
        assert!(blocked.is_err());
        drop(guard);
        assert!(!vault_mutex_kv().is_empty());
    }
}
