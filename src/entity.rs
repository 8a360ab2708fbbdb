//! Immutable, denormalized snapshots of configuration entities.
//!
//! A snapshot never holds another snapshot: every reference is an identifier resolved through the cache's by-id
//! lookups. That keeps the realm ↔ client ↔ role back-references acyclic and each entry independently evictable.

pub mod client;
pub mod client_template;
pub mod group;
pub mod realm;
pub mod role;

use std::sync::Arc;

pub use client::CachedClient;
pub use client_template::CachedClientTemplate;
pub use group::CachedGroup;
pub use realm::CachedRealm;
pub use role::{CachedRole, RoleKind};

use crate::types::{CacheKey, Category};

/// What the cache store keeps under a primary key.
#[derive(Debug, Clone)]
pub enum CachedEntity {
    Realm(Arc<CachedRealm>),
    Client(Arc<CachedClient>),
    ClientTemplate(Arc<CachedClientTemplate>),
    Role(Arc<CachedRole>),
    Group(Arc<CachedGroup>),
}

impl CachedEntity {
    pub fn id(&self) -> &str {
        match self {
            Self::Realm(r) => r.id(),
            Self::Client(c) => c.id(),
            Self::ClientTemplate(t) => t.id(),
            Self::Role(r) => &r.id,
            Self::Group(g) => g.id(),
        }
    }

    pub fn category(&self) -> Category {
        match self {
            Self::Realm(_) => Category::Realm,
            Self::Client(_) => Category::Client,
            Self::ClientTemplate(_) => Category::ClientTemplate,
            Self::Role(_) => Category::Role,
            Self::Group(_) => Category::Group,
        }
    }

    /// The realm an entity is scoped to. A realm is its own scope.
    pub fn realm_id(&self) -> &str {
        match self {
            Self::Realm(r) => r.id(),
            Self::Client(c) => c.realm_id(),
            Self::ClientTemplate(t) => t.realm_id(),
            Self::Role(r) => &r.realm_id,
            Self::Group(g) => g.realm_id(),
        }
    }

    /// Secondary index keys resolving to this entity's id.
    pub fn secondary_keys(&self) -> Vec<CacheKey> {
        match self {
            Self::Realm(r) => vec![CacheKey::realm_name(r.name())],
            Self::Client(c) => vec![CacheKey::client_alias(c.realm_id(), c.client_id())],
            _ => Vec::new(),
        }
    }

    /// Whether this entity is what `alias` currently names. A rename leaves the old alias pointing at an id whose fresh
    /// snapshot no longer carries it.
    pub fn answers_to(&self, alias: &CacheKey) -> bool {
        match (self, alias) {
            (Self::Realm(r), CacheKey::RealmName(name)) => r.name() == name,
            (Self::Client(c), CacheKey::ClientAlias { realm, client_id }) => {
                c.realm_id() == realm && c.client_id() == client_id
            }
            (_, CacheKey::Id(id)) => self.id() == id,
            _ => false,
        }
    }

    pub fn as_realm(&self) -> Option<&Arc<CachedRealm>> {
        match self {
            Self::Realm(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_client(&self) -> Option<&Arc<CachedClient>> {
        match self {
            Self::Client(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_client_template(&self) -> Option<&Arc<CachedClientTemplate>> {
        match self {
            Self::ClientTemplate(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_role(&self) -> Option<&Arc<CachedRole>> {
        match self {
            Self::Role(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_group(&self) -> Option<&Arc<CachedGroup>> {
        match self {
            Self::Group(g) => Some(g),
            _ => None,
        }
    }
}

impl From<CachedRealm> for CachedEntity {
    fn from(value: CachedRealm) -> Self {
        Self::Realm(Arc::new(value))
    }
}

impl From<CachedClient> for CachedEntity {
    fn from(value: CachedClient) -> Self {
        Self::Client(Arc::new(value))
    }
}

impl From<CachedClientTemplate> for CachedEntity {
    fn from(value: CachedClientTemplate) -> Self {
        Self::ClientTemplate(Arc::new(value))
    }
}

impl From<CachedRole> for CachedEntity {
    fn from(value: CachedRole) -> Self {
        Self::Role(Arc::new(value))
    }
}

impl From<CachedGroup> for CachedEntity {
    fn from(value: CachedGroup) -> Self {
        Self::Group(Arc::new(value))
    }
}

impl From<Arc<CachedRealm>> for CachedEntity {
    fn from(value: Arc<CachedRealm>) -> Self {
        Self::Realm(value)
    }
}

impl From<Arc<CachedClient>> for CachedEntity {
    fn from(value: Arc<CachedClient>) -> Self {
        Self::Client(value)
    }
}

impl From<Arc<CachedClientTemplate>> for CachedEntity {
    fn from(value: Arc<CachedClientTemplate>) -> Self {
        Self::ClientTemplate(value)
    }
}

impl From<Arc<CachedRole>> for CachedEntity {
    fn from(value: Arc<CachedRole>) -> Self {
        Self::Role(value)
    }
}

impl From<Arc<CachedGroup>> for CachedEntity {
    fn from(value: Arc<CachedGroup>) -> Self {
        Self::Group(value)
    }
}
