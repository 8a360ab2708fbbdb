use async_trait::async_trait;
use fieldx::fxstruct;

use crate::{error::CacheError, revision::Revision, traits::CacheObserver};

/// Records what the cache publishes. With `failing` set, every notification is recorded and then reported as failed.
#[fxstruct(sync, get(off))]
pub struct TestObserver {
    #[fieldx(lock, private, get, get_mut, default(Vec::new()))]
    invalidations: Vec<(String, Revision)>,

    #[fieldx(lock, private, get, get_mut, default(Vec::new()))]
    clears: Vec<Revision>,

    #[fieldx(lock, get(copy), set, default(false))]
    failing: bool,
}

impl TestObserver {
    pub fn invalidated(&self) -> Vec<(String, Revision)> {
        self.invalidations().clone()
    }

    pub fn invalidated_ids(&self) -> Vec<String> {
        self.invalidations().iter().map(|(id, _)| id.clone()).collect()
    }

    pub fn clear_count(&self) -> usize {
        self.clears().len()
    }

    pub fn forget(&self) {
        self.invalidations_mut().clear();
        self.clears_mut().clear();
    }

    fn outcome(&self) -> Result<(), CacheError> {
        if self.failing() {
            return Err(CacheError::Observer("injected failure".to_string()));
        }
        Ok(())
    }
}

impl std::fmt::Debug for TestObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestObserver")
            .field("invalidations", &self.invalidations().len())
            .field("clears", &self.clears().len())
            .field("failing", &self.failing())
            .finish()
    }
}

#[async_trait]
impl CacheObserver for TestObserver {
    async fn on_invalidate(&self, invalidated: &[(String, Revision)]) -> Result<(), CacheError> {
        self.invalidations_mut().extend_from_slice(invalidated);
        self.outcome()
    }

    async fn on_clear(&self, floor: Revision) -> Result<(), CacheError> {
        self.clears_mut().push(floor);
        self.outcome()
    }
}
