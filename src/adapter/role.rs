use std::{fmt::Debug, sync::Arc};

use fieldx_plus::fx_plus;

use crate::{
    adapter::{ClientAdapter, RealmAdapter},
    entity::{CachedRole, RoleKind},
    model::RoleModel,
    provider::CacheRealmProvider,
    traits::RealmStore,
};

#[fx_plus(child(CacheRealmProvider<S>, rc_strong), sync, default(off), get(off))]
pub struct RoleAdapter<S>
where
    S: RealmStore,
{
    #[fieldx(get)]
    cached: Arc<CachedRole>,

    managed: bool,
}

impl<S> RoleAdapter<S>
where
    S: RealmStore,
{
    pub fn id(&self) -> &str {
        &self.cached.id
    }

    pub fn name(&self) -> &str {
        &self.cached.name
    }

    pub fn realm_id(&self) -> &str {
        &self.cached.realm_id
    }

    pub fn description(&self) -> Option<&str> {
        self.cached.description.as_deref()
    }

    pub fn kind(&self) -> &RoleKind {
        &self.cached.kind
    }

    pub fn is_client_role(&self) -> bool {
        self.cached.is_client_role()
    }

    pub fn is_composite(&self) -> bool {
        self.cached.is_composite()
    }

    pub fn is_managed(&self) -> bool {
        self.managed
    }

    pub async fn composites(&self) -> Result<Vec<Arc<RoleAdapter<S>>>, S::Error> {
        let provider = self.parent();
        let mut roles = Vec::with_capacity(self.cached.composites.len());
        for id in &self.cached.composites {
            if let Some(role) = provider.get_role_by_id(id, self.realm_id()).await? {
                roles.push(role);
            }
        }
        Ok(roles)
    }

    /// Whether this role is `other` or contains it, directly or through nested composites.
    pub async fn has_role(&self, other: &str) -> Result<bool, S::Error> {
        if self.id() == other {
            return Ok(true);
        }

        let provider = self.parent();
        let mut seen = std::collections::BTreeSet::new();
        let mut queue = self.cached.composites.iter().cloned().collect::<Vec<_>>();
        while let Some(id) = queue.pop() {
            if id == other {
                return Ok(true);
            }
            if !seen.insert(id.clone()) {
                continue;
            }
            if let Some(role) = provider.get_role_by_id(&id, self.realm_id()).await? {
                queue.extend(role.cached().composites.iter().cloned());
            }
        }
        Ok(false)
    }

    pub async fn realm(&self) -> Result<Option<Arc<RealmAdapter<S>>>, S::Error> {
        self.parent().get_realm(self.realm_id()).await
    }

    /// The owning client of a client role; `None` for realm roles.
    pub async fn client(&self) -> Result<Option<Arc<ClientAdapter<S>>>, S::Error> {
        match &self.cached.kind {
            RoleKind::Client { client } => self.parent().get_client_by_id(client, self.realm_id()).await,
            RoleKind::Realm => Ok(None),
        }
    }

    pub async fn update<F>(&self, mutate: F) -> Result<Option<RoleModel>, S::Error>
    where
        F: FnOnce(&mut RoleModel) + Send,
    {
        self.parent().update_role(self.id(), self.realm_id(), mutate).await
    }
}

impl<S> Debug for RoleAdapter<S>
where
    S: RealmStore,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoleAdapter")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("kind", self.kind())
            .field("managed", &self.managed)
            .finish()
    }
}
