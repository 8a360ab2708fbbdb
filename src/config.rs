//! Cache settings as they come from the command line, the environment or a configuration file.

use std::{sync::Arc, time::Duration};

use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::{
    cache::{RealmCache, RealmCacheBuilder},
    error::CacheError,
    revision::{Revision, RevisionCounter},
};

/// Embed into an application's CLI with `#[command(flatten)]`.
#[derive(Debug, Clone, PartialEq, Eq, clap::Args, Validate, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache name, used in logs.
    #[arg(long = "cache-name", env = "REALM_CACHE_NAME", default_value = "realms")]
    #[garde(length(min = 1))]
    pub name: String,

    /// How long prepare waits for a single cluster lock, in milliseconds.
    #[arg(long, env = "REALM_CACHE_LOCK_TIMEOUT_MS", default_value_t = 10_000)]
    #[garde(range(min = 1))]
    pub lock_timeout_ms: u64,

    /// Revision the counter starts from. A node rejoining a cluster should start above anything it may have issued.
    #[arg(long, env = "REALM_CACHE_INITIAL_REVISION", default_value_t = 0)]
    #[garde(skip)]
    pub initial_revision: u64,

    /// Number of tracked invalidations that triggers a compaction of the revision table.
    #[arg(long, env = "REALM_CACHE_COMPACT_THRESHOLD", default_value_t = 1024)]
    #[garde(range(min = 1))]
    pub compact_threshold: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            name:              String::from("realms"),
            lock_timeout_ms:   10_000,
            initial_revision:  0,
            compact_threshold: 1024,
        }
    }
}

impl CacheConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// A [`RealmCache`] builder preloaded with these settings. Lock provider and observer are left to the caller.
    pub fn builder(&self) -> Result<RealmCacheBuilder, CacheError> {
        self.validate().map_err(|err| CacheError::Config(err.to_string()))?;
        Ok(RealmCache::builder()
            .name(self.name.as_str())
            .lock_timeout(self.lock_timeout())
            .compact_threshold(self.compact_threshold)
            .counter(Arc::new(RevisionCounter::starting_at(Revision::new(self.initial_revision)))))
    }
}
