use std::{any::Any, collections::HashMap, fmt::Debug, sync::Arc, time::Duration};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Mutex as KeyMutex;
use tracing::warn;

use crate::error::CacheError;

/// A held cluster lock. Dropping it releases the lock.
pub struct KeyLock {
    key:    String,
    _guard: Box<dyn Any + Send + Sync>,
}

impl KeyLock {
    pub fn new<G: Any + Send + Sync>(key: impl Into<String>, guard: G) -> Self {
        Self {
            key:    key.into(),
            _guard: Box::new(guard),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Debug for KeyLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("KeyLock").field(&self.key).finish()
    }
}

/// The cluster-wide, per-identifier lock capability.
///
/// `lock` blocks until the lock is granted or the implementation gives up; giving up must be reported as an error,
/// never as a silently skipped key.
#[async_trait]
pub trait LockProvider: Debug + Send + Sync + 'static {
    async fn lock(&self, key: &str, timeout: Duration) -> Result<KeyLock, CacheError>;

    /// Best-effort check, mostly useful for diagnostics and tests.
    fn is_locked(&self, key: &str) -> bool;
}

/// Single-node lock table: one async mutex per key, created on demand.
#[derive(Debug, Default)]
pub struct LocalLocks {
    keys: Mutex<HashMap<String, Arc<KeyMutex<()>>>>,
}

impl LocalLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn key_mutex(&self, key: &str) -> Arc<KeyMutex<()>> {
        let mut keys = self.keys.lock();
        // Nobody but the table holds these, so nobody is holding or waiting for them.
        keys.retain(|_, m| Arc::strong_count(m) > 1);
        Arc::clone(keys.entry(key.to_string()).or_default())
    }
}

#[async_trait]
impl LockProvider for LocalLocks {
    async fn lock(&self, key: &str, timeout: Duration) -> Result<KeyLock, CacheError> {
        let key_mutex = self.key_mutex(key);
        match tokio::time::timeout(timeout, key_mutex.lock_owned()).await {
            Ok(guard) => Ok(KeyLock::new(key, guard)),
            Err(_) => {
                warn!(key, ?timeout, "cluster lock not granted in time");
                Err(CacheError::LockTimeout {
                    key: key.to_string(),
                    timeout,
                })
            }
        }
    }

    fn is_locked(&self, key: &str) -> bool {
        self.keys
            .lock()
            .get(key)
            .is_some_and(|m| m.try_lock().is_err())
    }
}
