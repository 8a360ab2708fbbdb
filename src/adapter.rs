//! Adapters handed out by [`CacheRealmProvider`](crate::provider::CacheRealmProvider).
//!
//! An adapter wraps one immutable snapshot and keeps a handle on the provider that produced it. Identifier references
//! in the snapshot are resolved back through the provider, so navigation goes through the same cache checks as any
//! other read. Mutations go through the provider's write path.

pub mod client;
pub mod client_template;
pub mod group;
pub mod realm;
pub mod role;

pub use client::ClientAdapter;
pub use client_template::ClientTemplateAdapter;
pub use group::GroupAdapter;
pub use realm::RealmAdapter;
pub use role::RoleAdapter;
