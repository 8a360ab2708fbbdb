use crate::{cache::RealmCache, error::CacheError, revision::Revision};
use fieldx_plus::{child_build, fx_plus};
use std::fmt::Debug;

/// The revision a load is stamped with, registered with the cache for as long as the load is in flight.
///
/// Take it before reading from the store and keep it until the snapshot has been put. While it is held, compaction
/// keeps every invalidation the load could turn out to be stale against.
#[fx_plus(child(RealmCache, rc_strong), default(off), sync, get(off))]
pub struct LoadStamp {
    revision: Revision,
}

impl LoadStamp {
    pub fn revision(&self) -> Revision {
        self.revision
    }
}

impl RealmCache {
    /// Stamps a load of `id`, or of an entity not yet known by id when `None`. Must be taken before the load starts.
    pub fn load_stamp(&self, id: Option<&str>) -> Result<LoadStamp, CacheError> {
        let mut loads = self.loads_mut();
        let revision = id
            .and_then(|id| self.current_revision(id))
            .unwrap_or_else(|| self.counter().current());
        let stamp = child_build!(self, LoadStamp { revision: revision })
            .map_err(|err| CacheError::builder("load stamp", err))?;
        *loads.entry(revision).or_default() += 1;
        Ok(stamp)
    }

    /// Number of loads currently in flight.
    pub fn loads_in_flight(&self) -> usize {
        self.loads().values().sum()
    }

    fn release_load(&self, revision: Revision) {
        let mut loads = self.loads_mut();
        if let Some(count) = loads.get_mut(&revision) {
            *count -= 1;
            if *count == 0 {
                loads.remove(&revision);
            }
        }
    }
}

impl Debug for LoadStamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadStamp").field("revision", &self.revision).finish()
    }
}

impl Drop for LoadStamp {
    fn drop(&mut self) {
        self.parent().release_load(self.revision);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn stamps_are_counted_until_dropped() {
        let cache = RealmCache::builder().build().unwrap();
        let first = cache.load_stamp(None).unwrap();
        let second = cache.load_stamp(Some("r1")).unwrap();
        assert_eq!(first.revision(), second.revision());
        assert_eq!(cache.loads_in_flight(), 2);

        drop(first);
        assert_eq!(cache.loads_in_flight(), 1);
        drop(second);
        assert_eq!(cache.loads_in_flight(), 0);
    }
}
