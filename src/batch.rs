use std::{collections::BTreeSet, fmt::Debug};

use fieldx_plus::fx_plus;
use tracing::{debug, warn};

use crate::{cache::RealmCache, error::CacheError, lock::KeyLock, revision::Revision};

/// Scoped acquisition of cluster locks and staged invalidations.
///
/// Whatever is staged becomes visible to readers at once when the batch ends. Locks are held until then and are
/// released by dropping the batch, so no exit path can leave one behind.
#[fx_plus(child(RealmCache, rc_strong), default(off), sync, get(off))]
pub struct RevisionBatch {
    // Owned lock guards. Dropping them releases the locks.
    #[fieldx(builder(off), default(Vec::new()))]
    locks: Vec<KeyLock>,

    #[fieldx(builder(off), default(BTreeSet::new()))]
    staged: BTreeSet<String>,

    #[fieldx(builder(off), default(false))]
    clear: bool,

    #[fieldx(builder(off), default(false))]
    ended: bool,
}

impl RevisionBatch {
    /// Acquires the cluster lock for `id`. Locking an id this batch already holds is a no-op.
    pub async fn lock(&mut self, id: &str) -> Result<(), CacheError> {
        if self.holds(id) {
            return Ok(());
        }

        let key_lock = self
            .parent()
            .lock_provider()
            .lock(id, self.parent().lock_timeout())
            .await?;
        self.locks.push(key_lock);
        Ok(())
    }

    pub fn invalidate<S: Into<String>>(&mut self, id: S) {
        self.staged.insert(id.into());
    }

    /// Turns the batch into a whole-cache clear. Staged identifiers are covered by it.
    pub fn clear(&mut self) {
        self.clear = true;
    }

    pub fn holds(&self, id: &str) -> bool {
        self.locks.iter().any(|l| l.key() == id)
    }

    /// Keys of the held locks in acquisition order.
    pub fn locked_keys(&self) -> Vec<&str> {
        self.locks.iter().map(KeyLock::key).collect()
    }

    pub fn staged(&self) -> impl Iterator<Item = &str> {
        self.staged.iter().map(String::as_str)
    }

    pub fn is_clear(&self) -> bool {
        self.clear
    }

    /// Publishes everything staged, evicts the affected entries and notifies the observer, then releases every lock.
    ///
    /// The locks are released even if the observer fails; its error is returned afterwards. Returns the revisions the
    /// staged identifiers were invalidated at, empty for a clear.
    pub async fn end(mut self) -> Result<Vec<(String, Revision)>, CacheError> {
        let outcome = self.apply().await;
        let released = self.locks.len();
        self.locks.clear();
        debug!(cache = self.parent().name(), released, "revision batch ended");
        outcome
    }

    async fn apply(&mut self) -> Result<Vec<(String, Revision)>, CacheError> {
        self.ended = true;
        let staged = std::mem::take(&mut self.staged);

        if std::mem::take(&mut self.clear) {
            let cache = self.parent();
            let floor = cache.publish_clear();
            cache.cache().invalidate_all();
            cache.observer().on_clear(floor).await?;
            return Ok(Vec::new());
        }

        let cache = self.parent();
        let stamped = cache.publish_invalidations(staged);
        for (id, _) in &stamped {
            cache.evict(id).await;
        }
        cache.maybe_compact().await;
        if !stamped.is_empty() {
            cache.observer().on_invalidate(&stamped).await?;
        }
        Ok(stamped)
    }
}

impl Debug for RevisionBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RevisionBatch")
            .field("locks", &self.locked_keys())
            .field("staged", &self.staged)
            .field("clear", &self.clear)
            .field("ended", &self.ended)
            .finish()
    }
}

impl Drop for RevisionBatch {
    fn drop(&mut self) {
        if self.ended || (self.staged.is_empty() && !self.clear) {
            return;
        }

        // Eviction is async and can't happen here; the revision table alone keeps stale entries from being served.
        let staged = std::mem::take(&mut self.staged);
        warn!(
            cache = self.parent().name(),
            staged = staged.len(),
            clear = self.clear,
            "revision batch dropped without end()"
        );
        if self.clear {
            let cache = self.parent();
            cache.publish_clear();
            cache.cache().invalidate_all();
        }
        else {
            self.parent().publish_invalidations(staged);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        entity::CachedGroup,
        entry::CacheEntry,
        lock::{LocalLocks, LockProvider},
        model::GroupModel,
    };
    use std::{sync::Arc, time::Duration};

    fn group(id: &str) -> CachedGroup {
        CachedGroup::new(&GroupModel {
            id: id.to_string(),
            realm_id: "r1".to_string(),
            name: id.to_string(),
            ..Default::default()
        })
    }

    fn cache_with(locks: Arc<LocalLocks>) -> Arc<RealmCache> {
        RealmCache::builder()
            .lock_provider(locks as Arc<dyn LockProvider>)
            .lock_timeout(Duration::from_millis(50))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn end_publishes_and_releases() {
        let locks = Arc::new(LocalLocks::new());
        let cache = cache_with(Arc::clone(&locks));
        let rev = cache.counter().current();
        cache.put(CacheEntry::new(rev, group("a"))).await;
        cache.put(CacheEntry::new(rev, group("b"))).await;

        let mut batch = cache.start_batch().unwrap();
        batch.lock("a").await.unwrap();
        batch.lock("b").await.unwrap();
        batch.lock("a").await.unwrap();
        assert_eq!(batch.locked_keys(), vec!["a", "b"]);
        batch.invalidate("a");
        batch.invalidate("b");

        // Nothing is visible before the batch ends.
        assert!(cache.get("a").await.is_some());
        assert!(locks.is_locked("a"));

        let stamped = batch.end().await.unwrap();
        assert_eq!(stamped.len(), 2);
        assert_ne!(stamped[0].1, stamped[1].1, "each id gets its own revision");
        assert!(cache.get("a").await.is_none());
        assert!(cache.get("b").await.is_none());
        assert!(!locks.is_locked("a"));
        assert!(!locks.is_locked("b"));
    }

    #[tokio::test]
    async fn dropped_batch_still_invalidates() {
        let locks = Arc::new(LocalLocks::new());
        let cache = cache_with(Arc::clone(&locks));
        cache.put(CacheEntry::new(cache.counter().current(), group("a"))).await;

        {
            let mut batch = cache.start_batch().unwrap();
            batch.lock("a").await.unwrap();
            batch.invalidate("a");
        }

        assert!(!locks.is_locked("a"));
        assert!(cache.get("a").await.is_none());
        assert!(cache.current_revision("a").is_some());
    }

    #[tokio::test]
    async fn clear_supersedes_staged_ids() {
        let cache = cache_with(Arc::new(LocalLocks::new()));
        let rev = cache.counter().current();
        cache.put(CacheEntry::new(rev, group("a"))).await;
        cache.put(CacheEntry::new(rev, group("z"))).await;

        let mut batch = cache.start_batch().unwrap();
        batch.invalidate("a");
        batch.clear();
        assert!(batch.is_clear());
        assert!(batch.end().await.unwrap().is_empty());

        assert!(cache.get("a").await.is_none());
        assert!(cache.get("z").await.is_none());
    }
}
