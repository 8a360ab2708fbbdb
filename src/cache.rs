use crate::{
    batch::RevisionBatch,
    entity::{CachedClient, CachedClientTemplate, CachedGroup, CachedRealm, CachedRole},
    entry::CacheEntry,
    error::CacheError,
    lock::{LocalLocks, LockProvider},
    revision::{Revision, RevisionCounter},
    traits::{CacheObserver, NoopObserver},
    types::CacheKey,
};
use arc_swap::ArcSwap;
use fieldx_plus::{child_build, fx_plus};
use moka::future::Cache;
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
    time::Duration,
};
use tracing::{debug, trace};

// The key of a secondary entry is always the primary identifier of the entity it resolves to.
#[derive(Clone, Debug)]
pub(crate) enum ValueState {
    Primary(CacheEntry),
    Secondary(String),
}

// Revision of the last applied invalidation per id. `floor` is raised by whole-cache clears and applies to every id.
#[derive(Clone, Debug, Default)]
pub(crate) struct RevisionTable {
    floor: Revision,
    ids:   HashMap<String, Revision>,
}

impl RevisionTable {
    pub(crate) fn invalidated_at(&self, id: &str) -> Revision {
        self.ids.get(id).map_or(self.floor, |rev| (*rev).max(self.floor))
    }

    pub(crate) fn known_revision(&self, id: &str) -> Option<Revision> {
        self.ids.get(id).map(|rev| (*rev).max(self.floor))
    }

    fn with_invalidations(&self, stamped: &[(String, Revision)]) -> Self {
        let mut table = self.clone();
        for (id, rev) in stamped {
            let slot = table.ids.entry(id.clone()).or_insert(*rev);
            *slot = (*slot).max(*rev);
        }
        table
    }

    pub(crate) fn len(&self) -> usize {
        self.ids.len()
    }

    // Ids whose last invalidation is at or below `horizon`.
    fn settled(&self, horizon: Revision) -> Vec<(String, Revision)> {
        self.ids
            .iter()
            .filter(|(_, rev)| **rev <= horizon)
            .map(|(id, rev)| (id.clone(), *rev))
            .collect()
    }

    // An id invalidated again since it was found settled stays.
    fn without(&self, settled: &[(String, Revision)]) -> Self {
        let mut table = self.clone();
        for (id, rev) in settled {
            if table.ids.get(id).is_some_and(|current| current <= rev) {
                table.ids.remove(id);
            }
        }
        table
    }

    fn with_floor(&self, floor: Revision) -> Self {
        let floor = floor.max(self.floor);
        Self {
            floor,
            // Anything at or below the floor is answered by the floor itself.
            ids: self
                .ids
                .iter()
                .filter(|(_, rev)| **rev > floor)
                .map(|(id, rev)| (id.clone(), *rev))
                .collect(),
        }
    }
}

/// The shared cache store: `(identifier → (revision, snapshot))` plus the alias indexes.
///
/// Reads never block: a lookup is a moka get followed by a check against the revision table, which is published
/// copy-on-write so that all invalidations of one batch become visible to readers at once.
///
/// The table only needs to remember an invalidation while some load could still be stale against it. Once it grows past
/// [`compact_threshold`](Self::compact_threshold) it is compacted: invalidations older than every load in flight (see
/// [`LoadStamp`](crate::stamp::LoadStamp)) are forgotten, and puts stamped below that point are refused from then on.
///
/// ```ignore
/// let cache = RealmCache::builder()
///     .name("realms")
///     .counter(Arc::new(RevisionCounter::new()))
///     .lock_timeout(Duration::from_secs(5))
///     .build()?;
///
/// let mut batch = cache.start_batch()?;
/// batch.lock("realm-id").await?;
/// batch.invalidate("realm-id");
/// batch.end().await?;
/// ```
#[fx_plus(
    parent,
    no_new,
    default(off),
    sync,
    builder(
        doc("Builder object of [`RealmCache`].", "", "See [`RealmCache::builder()`] method."),
        method_doc("Implement builder pattern for [`RealmCache`]."),
    )
)]
pub struct RealmCache {
    /// Cache name. Most useful for debugging and logging.
    #[fieldx(get, builder(into), default(String::from("realms")))]
    name: String,

    #[fieldx(get(clone), default(Arc::new(RevisionCounter::new())))]
    counter: Arc<RevisionCounter>,

    #[fieldx(get(clone), default(Arc::new(LocalLocks::new()) as Arc<dyn LockProvider>))]
    lock_provider: Arc<dyn LockProvider>,

    /// How long prepare waits for a single cluster lock before failing the unit of work.
    #[fieldx(get(copy), set, default(Duration::from_secs(10)))]
    lock_timeout: Duration,

    #[fieldx(get(clone), default(Arc::new(NoopObserver) as Arc<dyn CacheObserver>))]
    observer: Arc<dyn CacheObserver>,

    #[fieldx(vis(pub(crate)), lazy, get(clone), builder(off))]
    cache: Arc<Cache<CacheKey, ValueState>>,

    /// Size of the revision table that triggers a compaction.
    #[fieldx(get(copy), set, default(1024))]
    compact_threshold: usize,

    #[fieldx(get(off), builder(off), default(ArcSwap::from_pointee(RevisionTable::default())))]
    revisions: ArcSwap<RevisionTable>,

    // Stamps of the loads in flight, with how many loads hold each.
    #[fieldx(lock, vis(pub(crate)), get, get_mut, builder(off), default(BTreeMap::new()))]
    loads: BTreeMap<Revision, usize>,

    // Nothing stamped below this is stored: invalidations it could be stale against may have been forgotten.
    #[fieldx(lock, private, get(copy), set, builder(off), default(Revision::ZERO))]
    horizon: Revision,

    #[fieldx(lock, private, get(copy), set, builder(off), default(0))]
    next_compaction: usize,
}

impl RealmCache {
    fn build_cache(&self) -> Arc<Cache<CacheKey, ValueState>> {
        // No capacity bound: entries only ever leave through invalidation.
        Arc::new(Cache::builder().name(self.name()).build())
    }

    /// Primary lookup. Entries stamped before the last invalidation of their id are reported as a miss.
    pub async fn get(&self, id: &str) -> Option<CacheEntry> {
        let ValueState::Primary(entry) = self.cache().get(&CacheKey::id(id)).await?
        else {
            return None;
        };

        let invalidated_at = self.revisions.load().invalidated_at(id);
        if entry.is_fresh(invalidated_at) {
            trace!(cache = self.name(), id, revision = %entry.revision(), "cache hit");
            Some(entry)
        }
        else {
            trace!(cache = self.name(), id, revision = %entry.revision(), %invalidated_at, "stale entry");
            None
        }
    }

    /// Lookup through a secondary key. The resolved primary must be valid and still answer to the alias.
    pub async fn get_by_alias(&self, alias: &CacheKey) -> Option<CacheEntry> {
        let id = match self.cache().get(alias).await? {
            ValueState::Secondary(id) => id,
            ValueState::Primary(entry) => entry.id().to_string(),
        };
        let entry = self.get(&id).await?;
        if entry.entity().answers_to(alias) {
            Some(entry)
        }
        else {
            trace!(cache = self.name(), %alias, id, "alias no longer matches");
            None
        }
    }

    /// Stores an entry together with its secondary keys. An entry already stale against the revision table is dropped
    /// and `false` is returned.
    pub async fn put(&self, entry: CacheEntry) -> bool {
        let id = entry.id().to_string();
        let revision = entry.revision();
        let invalidated_at = self.revisions.load().invalidated_at(&id).max(self.horizon());
        if !entry.is_fresh(invalidated_at) {
            debug!(
                cache = self.name(),
                id,
                revision = %entry.revision(),
                %invalidated_at,
                "refusing to cache a stale snapshot"
            );
            return false;
        }

        let cache = self.cache();
        let primary_key = CacheKey::id(id.clone());
        let secondary_keys = entry.secondary_keys();

        // A renamed entity leaves its old aliases behind.
        if let Some(ValueState::Primary(old)) = cache.get(&primary_key).await {
            for key in old.secondary_keys() {
                if !secondary_keys.contains(&key) {
                    self.drop_alias(&key, &id).await;
                }
            }
        }

        for key in secondary_keys {
            cache.insert(key, ValueState::Secondary(id.clone())).await;
        }
        trace!(cache = self.name(), id, %revision, "cached");
        cache.insert(primary_key, ValueState::Primary(entry)).await;

        // A compaction may have forgotten this id between the check and the insert.
        if revision < self.horizon() {
            debug!(cache = self.name(), id, %revision, "snapshot fell behind the put horizon");
            self.evict(&id).await;
            return false;
        }
        true
    }

    /// Immediate, unbatched invalidation of a single id.
    pub async fn invalidate(&self, id: &str) -> Result<Revision, CacheError> {
        let stamped = self.publish_invalidations([id.to_string()]);
        self.evict(id).await;
        self.maybe_compact().await;
        self.observer().on_invalidate(&stamped).await?;
        Ok(stamped.first().map_or_else(|| self.counter().current(), |(_, rev)| *rev))
    }

    /// Drops every entry. Snapshots loaded before the clear can't be put back afterwards.
    pub async fn clear(&self) -> Result<Revision, CacheError> {
        let floor = self.publish_clear();
        self.cache().invalidate_all();
        self.observer().on_clear(floor).await?;
        Ok(floor)
    }

    /// Revision of the last invalidation applied to `id`, if the cache has recorded one.
    pub fn current_revision(&self, id: &str) -> Option<Revision> {
        self.revisions.load().known_revision(id)
    }

    /// Number of ids the revision table currently tracks.
    pub fn tracked_invalidations(&self) -> usize {
        self.revisions.load().len()
    }

    /// Forgets every invalidation no load in flight can be stale against and returns how many were dropped.
    ///
    /// Entries older than a forgotten invalidation are evicted first, and the put horizon is raised so that nothing
    /// stamped before it gets stored afterwards.
    pub async fn compact(&self) -> usize {
        let horizon = {
            // Held until the horizon is raised: no load gets stamped and no other compaction runs in between.
            let loads = self.loads_mut();
            let horizon = loads
                .keys()
                .next()
                .copied()
                .unwrap_or_else(|| self.counter().current())
                .max(self.horizon());
            self.set_horizon(horizon);
            horizon
        };

        let settled = self.revisions.load().settled(horizon);
        let cache = self.cache();
        for (id, rev) in &settled {
            if let Some(ValueState::Primary(entry)) = cache.get(&CacheKey::id(id.as_str())).await {
                if entry.revision() < *rev {
                    self.evict(id).await;
                }
            }
        }
        if !settled.is_empty() {
            self.revisions.rcu(|table| table.without(&settled));
        }

        let remaining = self.tracked_invalidations();
        self.set_next_compaction(remaining.saturating_mul(2));
        debug!(cache = self.name(), %horizon, dropped = settled.len(), remaining, "revision table compacted");
        settled.len()
    }

    pub(crate) async fn maybe_compact(&self) {
        // Loads pinning the horizon keep the table large. Backing off keeps compaction amortized in that case.
        if self.tracked_invalidations() >= self.compact_threshold().max(self.next_compaction()) {
            self.compact().await;
        }
    }

    pub fn start_batch(&self) -> Result<RevisionBatch, CacheError> {
        child_build!(self, RevisionBatch).map_err(|err| CacheError::builder("revision batch", err))
    }

    /// Whether a primary entry is physically present, fresh or not.
    pub fn contains(&self, id: &str) -> bool {
        self.cache().contains_key(&CacheKey::id(id))
    }

    /// Number of stored keys, secondaries included.
    pub async fn entry_count(&self) -> u64 {
        let cache = self.cache();
        cache.run_pending_tasks().await;
        cache.entry_count()
    }

    pub async fn get_realm(&self, id: &str) -> Option<(Revision, Arc<CachedRealm>)> {
        let entry = self.get(id).await?;
        entry.entity().as_realm().map(|r| (entry.revision(), Arc::clone(r)))
    }

    pub async fn get_realm_by_name(&self, name: &str) -> Option<(Revision, Arc<CachedRealm>)> {
        let entry = self.get_by_alias(&CacheKey::realm_name(name)).await?;
        entry.entity().as_realm().map(|r| (entry.revision(), Arc::clone(r)))
    }

    pub async fn get_client(&self, id: &str) -> Option<(Revision, Arc<CachedClient>)> {
        let entry = self.get(id).await?;
        entry.entity().as_client().map(|c| (entry.revision(), Arc::clone(c)))
    }

    pub async fn get_client_by_client_id(
        &self,
        realm_id: &str,
        client_id: &str,
    ) -> Option<(Revision, Arc<CachedClient>)> {
        let entry = self.get_by_alias(&CacheKey::client_alias(realm_id, client_id)).await?;
        entry.entity().as_client().map(|c| (entry.revision(), Arc::clone(c)))
    }

    pub async fn get_client_template(&self, id: &str) -> Option<(Revision, Arc<CachedClientTemplate>)> {
        let entry = self.get(id).await?;
        entry.entity().as_client_template().map(|t| (entry.revision(), Arc::clone(t)))
    }

    pub async fn get_role(&self, id: &str) -> Option<(Revision, Arc<CachedRole>)> {
        let entry = self.get(id).await?;
        entry.entity().as_role().map(|r| (entry.revision(), Arc::clone(r)))
    }

    pub async fn get_group(&self, id: &str) -> Option<(Revision, Arc<CachedGroup>)> {
        let entry = self.get(id).await?;
        entry.entity().as_group().map(|g| (entry.revision(), Arc::clone(g)))
    }

    // Stamps every id with its own fresh revision and publishes all of them in a single swap.
    pub(crate) fn publish_invalidations<I>(&self, ids: I) -> Vec<(String, Revision)>
    where
        I: IntoIterator<Item = String>,
    {
        let counter = self.counter();
        let stamped = ids
            .into_iter()
            .map(|id| {
                let rev = counter.advance();
                (id, rev)
            })
            .collect::<Vec<_>>();

        if !stamped.is_empty() {
            self.revisions.rcu(|table| table.with_invalidations(&stamped));
            debug!(cache = self.name(), count = stamped.len(), "invalidations published");
        }
        stamped
    }

    pub(crate) fn publish_clear(&self) -> Revision {
        let floor = self.counter().advance();
        self.revisions.rcu(|table| table.with_floor(floor));
        debug!(cache = self.name(), %floor, "cache cleared");
        floor
    }

    // Physical removal of a primary entry and the aliases pointing at it.
    pub(crate) async fn evict(&self, id: &str) {
        if let Some(ValueState::Primary(entry)) = self.cache().remove(&CacheKey::id(id)).await {
            for key in entry.secondary_keys() {
                self.drop_alias(&key, id).await;
            }
        }
    }

    async fn drop_alias(&self, alias: &CacheKey, id: &str) {
        let cache = self.cache();
        // The alias may have been taken over by another entity in the meantime.
        if matches!(cache.get(alias).await, Some(ValueState::Secondary(ref owner)) if owner == id) {
            cache.invalidate(alias).await;
        }
    }
}
