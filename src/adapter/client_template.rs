use std::{fmt::Debug, sync::Arc};

use fieldx_plus::fx_plus;

use crate::{
    adapter::RoleAdapter,
    entity::CachedClientTemplate,
    model::ClientTemplateModel,
    provider::CacheRealmProvider,
    traits::RealmStore,
};

#[fx_plus(child(CacheRealmProvider<S>, rc_strong), sync, default(off), get(off))]
pub struct ClientTemplateAdapter<S>
where
    S: RealmStore,
{
    #[fieldx(get)]
    cached: Arc<CachedClientTemplate>,

    managed: bool,
}

impl<S> ClientTemplateAdapter<S>
where
    S: RealmStore,
{
    pub fn id(&self) -> &str {
        self.cached.id()
    }

    pub fn name(&self) -> &str {
        self.cached.name()
    }

    pub fn realm_id(&self) -> &str {
        self.cached.realm_id()
    }

    pub fn model(&self) -> &ClientTemplateModel {
        self.cached.model()
    }

    pub fn is_managed(&self) -> bool {
        self.managed
    }

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

    pub async fn update<F>(&self, mutate: F) -> Result<Option<ClientTemplateModel>, S::Error>
    where
        F: FnOnce(&mut ClientTemplateModel) + Send,
    {
        self.parent().update_client_template(self.id(), self.realm_id(), mutate).await
    }
}

impl<S> Debug for ClientTemplateAdapter<S>
where
    S: RealmStore,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientTemplateAdapter")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("managed", &self.managed)
            .finish()
    }
}
