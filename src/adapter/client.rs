use std::{fmt::Debug, sync::Arc};

use fieldx_plus::fx_plus;

use crate::{
    adapter::{ClientTemplateAdapter, RealmAdapter, RoleAdapter},
    entity::CachedClient,
    model::{ClientModel, RoleModel},
    provider::CacheRealmProvider,
    traits::RealmStore,
};

#[fx_plus(child(CacheRealmProvider<S>, rc_strong), sync, default(off), get(off))]
pub struct ClientAdapter<S>
where
    S: RealmStore,
{
    #[fieldx(get)]
    cached: Arc<CachedClient>,

    managed: bool,
}

impl<S> ClientAdapter<S>
where
    S: RealmStore,
{
    pub fn id(&self) -> &str {
        self.cached.id()
    }

    pub fn client_id(&self) -> &str {
        self.cached.client_id()
    }

    pub fn realm_id(&self) -> &str {
        self.cached.realm_id()
    }

    pub fn model(&self) -> &ClientModel {
        self.cached.model()
    }

    pub fn is_managed(&self) -> bool {
        self.managed
    }

    pub async fn realm(&self) -> Result<Option<Arc<RealmAdapter<S>>>, S::Error> {
        self.parent().get_realm(self.realm_id()).await
    }

    pub async fn roles(&self) -> Result<Vec<Arc<RoleAdapter<S>>>, S::Error> {
        let provider = self.parent();
        let mut roles = Vec::with_capacity(self.cached.roles().len());
        for id in self.cached.roles().values() {
            if let Some(role) = provider.get_role_by_id(id, self.realm_id()).await? {
                roles.push(role);
            }
        }
        Ok(roles)
    }

    pub async fn role(&self, name: &str) -> Result<Option<Arc<RoleAdapter<S>>>, S::Error> {
        match self.cached.role_id(name) {
            Some(id) => self.parent().get_role_by_id(id, self.realm_id()).await,
            None => Ok(None),
        }
    }

    /// Roles this client may put into tokens beyond its own.
    pub async fn scope_mappings(&self) -> Result<Vec<Arc<RoleAdapter<S>>>, S::Error> {
        let provider = self.parent();
        let mut roles = Vec::new();
        for id in &self.model().scope_mappings {
            if let Some(role) = provider.get_role_by_id(id, self.realm_id()).await? {
                roles.push(role);
            }
        }
        Ok(roles)
    }

    pub async fn client_template(&self) -> Result<Option<Arc<ClientTemplateAdapter<S>>>, S::Error> {
        match self.cached.client_template() {
            Some(id) => self.parent().get_client_template_by_id(id, self.realm_id()).await,
            None => Ok(None),
        }
    }

    pub async fn add_role(&self, name: &str) -> Result<RoleModel, S::Error> {
        self.parent().add_client_role(self.realm_id(), self.id(), name).await
    }

    pub async fn update<F>(&self, mutate: F) -> Result<Option<ClientModel>, S::Error>
    where
        F: FnOnce(&mut ClientModel) + Send,
    {
        self.parent().update_client(self.id(), self.realm_id(), mutate).await
    }
}

impl<S> Debug for ClientAdapter<S>
where
    S: RealmStore,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientAdapter")
            .field("id", &self.id())
            .field("client_id", &self.client_id())
            .field("realm_id", &self.realm_id())
            .field("managed", &self.managed)
            .finish()
    }
}
