use std::{collections::BTreeSet, sync::Arc, time::Duration};

use async_trait::async_trait;
use fieldx::fxstruct;

use crate::{
    error::CacheError,
    lock::{KeyLock, LocalLocks, LockProvider},
};

/// [`LocalLocks`] wrapper recording the order locks are requested in, with per-key failure injection.
#[fxstruct(sync, get(off))]
pub struct TestLocks {
    #[fieldx(get(clone), default(Arc::new(LocalLocks::new())))]
    inner: Arc<LocalLocks>,

    #[fieldx(lock, private, get, get_mut, default(Vec::new()))]
    journal: Vec<String>,

    #[fieldx(lock, private, get, get_mut, default(BTreeSet::new()))]
    failing: BTreeSet<String>,
}

impl TestLocks {
    /// Every following request for `key` fails with [`CacheError::LockFailed`].
    pub fn fail_on<S: Into<String>>(&self, key: S) {
        self.failing_mut().insert(key.into());
    }

    pub fn heal(&self, key: &str) {
        self.failing_mut().remove(key);
    }

    /// Keys in request order, failed requests included.
    pub fn requested(&self) -> Vec<String> {
        self.journal().clone()
    }

    pub fn forget(&self) {
        self.journal_mut().clear();
    }
}

impl std::fmt::Debug for TestLocks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestLocks")
            .field("requested", &*self.journal())
            .field("failing", &*self.failing())
            .finish()
    }
}

#[async_trait]
impl LockProvider for TestLocks {
    async fn lock(&self, key: &str, timeout: Duration) -> Result<KeyLock, CacheError> {
        self.journal_mut().push(key.to_string());
        if self.failing().contains(key) {
            return Err(CacheError::LockFailed {
                key:    key.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        self.inner().lock(key, timeout).await
    }

    fn is_locked(&self, key: &str) -> bool {
        self.inner().is_locked(key)
    }
}
