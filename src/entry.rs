use std::fmt::Debug;

use crate::{entity::CachedEntity, revision::Revision, types::CacheKey};

/// A snapshot stamped with the revision it was loaded under.
#[derive(Clone)]
pub struct CacheEntry {
    revision: Revision,
    entity:   CachedEntity,
}

impl CacheEntry {
    pub fn new<E: Into<CachedEntity>>(revision: Revision, entity: E) -> Self {
        Self {
            revision,
            entity: entity.into(),
        }
    }

    pub fn revision(&self) -> Revision {
        self.revision
    }

    pub fn id(&self) -> &str {
        self.entity.id()
    }

    pub fn entity(&self) -> &CachedEntity {
        &self.entity
    }

    pub fn secondary_keys(&self) -> Vec<CacheKey> {
        self.entity.secondary_keys()
    }

    /// An entry is only servable if nothing invalidated its id after the entry was stamped.
    #[inline]
    pub fn is_fresh(&self, invalidated_at: Revision) -> bool {
        self.revision >= invalidated_at
    }
}

impl Debug for CacheEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEntry")
            .field("id", &self.id())
            .field("category", &self.entity.category())
            .field("revision", &self.revision)
            .finish()
    }
}
