use std::{collections::HashMap, sync::Arc};

/// Per unit-of-work identity map: at most one live adapter per identifier.
#[derive(Debug)]
pub struct ManagedObjects<A> {
    objects: HashMap<String, Arc<A>>,
}

impl<A> Default for ManagedObjects<A> {
    fn default() -> Self {
        Self {
            objects: HashMap::new(),
        }
    }
}

impl<A> ManagedObjects<A> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<Arc<A>> {
        self.objects.get(id).cloned()
    }

    /// Returns the adapter already managed for `id`, or stores and returns the one `factory` builds.
    pub fn get_or_create<F>(&mut self, id: &str, factory: F) -> Arc<A>
    where
        F: FnOnce() -> Arc<A>,
    {
        Arc::clone(self.objects.entry(id.to_string()).or_insert_with(factory))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.objects.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn clear(&mut self) {
        self.objects.clear();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn factory_runs_once_per_id() {
        let mut table = ManagedObjects::<String>::new();
        let mut calls = 0;
        let first = table.get_or_create("x", || {
            calls += 1;
            Arc::new("first".to_string())
        });
        let second = table.get_or_create("x", || {
            calls += 1;
            Arc::new("second".to_string())
        });

        assert_eq!(calls, 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(*second, "first");
        assert!(table.contains("x"));
        assert_eq!(table.len(), 1);

        table.clear();
        assert!(table.is_empty());
        assert!(table.get("x").is_none());
    }
}
