use std::collections::{BTreeMap, BTreeSet};

use crate::types::Category;

/// Pending invalidations of a single unit of work.
///
/// Never shared between units of work, hence no synchronization of its own.
#[derive(Debug, Default, Clone)]
pub struct InvalidationRegistry {
    pending:         BTreeMap<Category, BTreeSet<String>>,
    clear_requested: bool,
}

impl InvalidationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent: registering an id twice has the same effect as once.
    pub fn register<S: Into<String>>(&mut self, category: Category, id: S) -> bool {
        self.pending.entry(category).or_default().insert(id.into())
    }

    /// Every pending id across all categories, deduplicated and sorted ascending. The order is what prevents two units
    /// of work from deadlocking on each other's cluster locks.
    pub fn pending_ids(&self) -> Vec<String> {
        self.pending
            .values()
            .flatten()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn pending(&self, category: Category) -> impl Iterator<Item = &str> {
        self.pending.get(&category).into_iter().flatten().map(String::as_str)
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.values().any(|ids| ids.contains(id))
    }

    pub fn request_clear(&mut self) {
        self.clear_requested = true;
    }

    pub fn clear_requested(&self) -> bool {
        self.clear_requested
    }

    pub fn is_empty(&self) -> bool {
        !self.clear_requested && self.pending.values().all(BTreeSet::is_empty)
    }

    pub fn len(&self) -> usize {
        self.pending_ids().len()
    }

    pub fn reset(&mut self) {
        self.pending.clear();
        self.clear_requested = false;
    }
}
