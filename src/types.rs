use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Entity categories the invalidation registry groups pending identifiers by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Realm,
    Client,
    ClientTemplate,
    Role,
    Group,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Realm => "realm",
            Self::Client => "client",
            Self::ClientTemplate => "client-template",
            Self::Role => "role",
            Self::Group => "group",
        }
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keys of the cache store.
///
/// `Id` addresses primary entries. The alias variants are secondary keys; their entries only point back to the
/// primary identifier and live exactly as long as the primary does.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Id(String),
    RealmName(String),
    ClientAlias { realm: String, client_id: String },
}

impl CacheKey {
    pub fn id<S: Into<String>>(id: S) -> Self {
        Self::Id(id.into())
    }

    pub fn realm_name<S: Into<String>>(name: S) -> Self {
        Self::RealmName(name.into())
    }

    pub fn client_alias<R: Into<String>, C: Into<String>>(realm: R, client_id: C) -> Self {
        Self::ClientAlias {
            realm:     realm.into(),
            client_id: client_id.into(),
        }
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::RealmName(name) => write!(f, "realm-name:{name}"),
            Self::ClientAlias { realm, client_id } => write!(f, "client-id:{realm}/{client_id}"),
        }
    }
}
