//! The two hooks a [`CacheRealmProvider`] enlists into its unit of work.
//!
//! Prepare takes every cluster lock the pending invalidations need, in ascending identifier order. After-completion
//! applies the invalidations and ends the batch, which is what releases those locks.

use std::{fmt::Debug, sync::Arc};

use async_trait::async_trait;
use tracing::{debug, instrument, trace, warn};

use crate::{
    error::{CacheError, TransactionError},
    provider::CacheRealmProvider,
    traits::RealmStore,
    transaction::TransactionHook,
};

pub struct PrepareHook<S: RealmStore> {
    provider: Arc<CacheRealmProvider<S>>,
}

impl<S: RealmStore> PrepareHook<S> {
    pub fn new(provider: Arc<CacheRealmProvider<S>>) -> Self {
        Self { provider }
    }

    #[instrument(level = "debug", skip_all, fields(cache = %self.provider.cache().name()))]
    async fn prepare(&self) -> Result<(), CacheError> {
        let provider = &self.provider;
        if !provider.store_used() {
            trace!("backing store untouched, nothing to lock");
            return Ok(());
        }

        let ids = provider.registry().pending_ids();
        let mut batch = provider.cache().start_batch()?;
        for id in &ids {
            if let Err(err) = batch.lock(id).await {
                // Dropping the batch releases whatever was acquired so far.
                warn!(%err, id, acquired = batch.locked_keys().len(), "prepare failed");
                return Err(err);
            }
        }

        debug!(locked = ids.len(), "invalidation locks acquired");
        provider.install_batch(batch);
        Ok(())
    }
}

impl<S: RealmStore> Debug for PrepareHook<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrepareHook").field("provider", &self.provider).finish()
    }
}

#[async_trait]
impl<S: RealmStore> TransactionHook for PrepareHook<S> {
    async fn begin(&self) -> Result<(), TransactionError> {
        self.provider.begin();
        Ok(())
    }

    async fn commit(&self) -> Result<(), TransactionError> {
        Ok(self.prepare().await?)
    }

    async fn rollback(&self) -> Result<(), TransactionError> {
        self.provider.set_rollback_only();
        self.provider.deactivate();
        Ok(())
    }

    fn set_rollback_only(&self) {
        self.provider.set_rollback_only();
    }

    fn rollback_only(&self) -> bool {
        self.provider.rollback_only()
    }

    fn is_active(&self) -> bool {
        self.provider.is_transaction_active()
    }
}

pub struct AfterCompletionHook<S: RealmStore> {
    provider: Arc<CacheRealmProvider<S>>,
}

impl<S: RealmStore> AfterCompletionHook<S> {
    pub fn new(provider: Arc<CacheRealmProvider<S>>) -> Self {
        Self { provider }
    }

    /// Runs on commit and on rollback. The unit of work is reset whatever happens while applying.
    #[instrument(level = "debug", skip(self), fields(cache = %self.provider.cache().name()))]
    async fn complete(&self, committed: bool) -> Result<(), CacheError> {
        let outcome = self.apply(committed).await;
        if let Err(ref err) = outcome {
            warn!(%err, "applying invalidations failed");
        }
        self.provider.reset();
        outcome
    }

    async fn apply(&self, committed: bool) -> Result<(), CacheError> {
        let provider = &self.provider;
        let batch = provider.take_batch();

        if committed && !provider.store_used() {
            if let Some(batch) = batch {
                batch.end().await?;
            }
            return Ok(());
        }

        // Prepare never ran or failed: a lock-less batch still gets the invalidations published.
        let mut batch = match batch {
            Some(batch) => batch,
            None => provider.cache().start_batch()?,
        };

        let (ids, clear) = {
            let registry = provider.registry();
            (registry.pending_ids(), registry.clear_requested())
        };

        if clear {
            batch.clear();
        }
        else {
            for id in ids {
                batch.invalidate(id);
            }
        }

        let stamped = batch.end().await?;
        debug!(invalidated = stamped.len(), clear, committed, "invalidations applied");
        Ok(())
    }
}

impl<S: RealmStore> Debug for AfterCompletionHook<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AfterCompletionHook")
            .field("provider", &self.provider)
            .finish()
    }
}

#[async_trait]
impl<S: RealmStore> TransactionHook for AfterCompletionHook<S> {
    async fn begin(&self) -> Result<(), TransactionError> {
        self.provider.begin();
        Ok(())
    }

    async fn commit(&self) -> Result<(), TransactionError> {
        Ok(self.complete(true).await?)
    }

    async fn rollback(&self) -> Result<(), TransactionError> {
        self.provider.set_rollback_only();
        Ok(self.complete(false).await?)
    }

    fn set_rollback_only(&self) {
        self.provider.set_rollback_only();
    }

    fn rollback_only(&self) -> bool {
        self.provider.rollback_only()
    }

    fn is_active(&self) -> bool {
        self.provider.is_transaction_active()
    }
}
