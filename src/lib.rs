//! # realm-cache
//!
//! Revision-stamped, lock-ordered invalidation cache for realm configuration: realms, clients, client templates, roles
//! and groups.
//!
//! Configuration is read far more often than it is written, yet every read must reflect the latest committed write,
//! including writes made by other nodes sharing the cache. This crate is the protocol deciding, for every read, whether
//! a cached snapshot is safe to return, and coordinating, for every write, how stale snapshots are evicted without
//! deadlocks or lost invalidations.
//!
//! # The Basics
//!
//! - Snapshots are immutable and denormalized. References to other entities are kept as identifiers and resolved
//!   through the cache's own by-id lookups, so there are no cycles and every entry can be evicted on its own.
//! - Every snapshot is stamped with a [`Revision`](revision::Revision) taken *before* it was loaded. Every applied
//!   invalidation gets a fresh revision too. A snapshot stamped before the last invalidation of its id is never served.
//! - Writes go straight to the [`RealmStore`](traits::RealmStore) and register the identifiers they make stale. Nothing
//!   is evicted until the unit of work completes.
//! - At commit, the prepare hook locks every pending identifier in ascending order. Two units of work with overlapping
//!   sets always lock in the same relative order and can't deadlock on each other.
//! - After-completion runs on commit and on rollback alike. It publishes all invalidations of the unit of work in a
//!   single revision-table swap, evicts the entries and releases the locks. The locks are owned guards held by a
//!   [`RevisionBatch`](batch::RevisionBatch), so no failure path can leave one behind.
//!
//! ```ignore
//! let cache = RealmCache::builder().name("realms").build()?;
//! let tm = TransactionManager::new();
//! let provider = cache.session(Arc::clone(&store), &tm).await?;
//!
//! tm.begin().await?;
//! let realm = provider.get_realm(&realm_id).await?;
//! provider.update_realm(&realm_id, |r| r.display_name = Some("ACME".into())).await?;
//! tm.commit().await?;
//! ```
//!
//! # Cluster Integration
//!
//! The crate is an L1 in-process cache. Cluster-wide behaviour comes from two seams: a [`LockProvider`](lock::LockProvider)
//! granting per-identifier locks, and a [`CacheObserver`](traits::CacheObserver) receiving every applied invalidation set
//! so that a transport can replay it elsewhere. [`LocalLocks`](lock::LocalLocks) covers the single-node case.

pub mod adapter;
pub mod batch;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod entity;
pub mod entry;
pub mod error;
pub mod lock;
pub mod managed;
pub mod model;
pub mod provider;
pub mod registry;
pub mod revision;
pub mod stamp;
pub mod traits;
pub mod transaction;
pub mod types;

#[doc(inline)]
pub use cache::RealmCache;
#[doc(inline)]
pub use provider::CacheRealmProvider;
#[doc(inline)]
pub use traits::RealmStore;

pub mod prelude {
    pub use crate::{
        adapter::{ClientAdapter, ClientTemplateAdapter, GroupAdapter, RealmAdapter, RoleAdapter},
        batch::RevisionBatch,
        cache::RealmCache,
        config::CacheConfig,
        entity::{CachedClient, CachedClientTemplate, CachedEntity, CachedGroup, CachedRealm, CachedRole, RoleKind},
        entry::CacheEntry,
        error::{CacheError, TransactionError},
        lock::{KeyLock, LocalLocks, LockProvider},
        model::*,
        provider::CacheRealmProvider,
        revision::{Revision, RevisionCounter},
        stamp::LoadStamp,
        traits::{CacheObserver, RealmStore},
        transaction::{TransactionHook, TransactionManager},
        types::*,
    };
}
