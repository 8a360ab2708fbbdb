use std::{fmt::Debug, sync::Arc};

use fieldx_plus::fx_plus;

use crate::{
    adapter::{ClientAdapter, ClientTemplateAdapter, GroupAdapter, RoleAdapter},
    entity::CachedRealm,
    model::{ClientModel, ClientTemplateModel, GroupModel, RealmModel, RoleModel},
    provider::CacheRealmProvider,
    traits::RealmStore,
};

#[fx_plus(child(CacheRealmProvider<S>, rc_strong), sync, default(off), get(off))]
pub struct RealmAdapter<S>
where
    S: RealmStore,
{
    #[fieldx(get)]
    cached: Arc<CachedRealm>,

    managed: bool,
}

impl<S> RealmAdapter<S>
where
    S: RealmStore,
{
    pub fn id(&self) -> &str {
        self.cached.id()
    }

    pub fn name(&self) -> &str {
        self.cached.name()
    }

    pub fn is_enabled(&self) -> bool {
        self.cached.is_enabled()
    }

    pub fn model(&self) -> &RealmModel {
        self.cached.model()
    }

    /// `false` for an adapter over a read-through snapshot that was never cached nor registered with the unit of work.
    pub fn is_managed(&self) -> bool {
        self.managed
    }

    pub fn master_admin_client_id(&self) -> Option<&str> {
        self.cached.master_admin_client()
    }

    pub async fn roles(&self) -> Result<Vec<Arc<RoleAdapter<S>>>, S::Error> {
        let provider = self.parent();
        let mut roles = Vec::with_capacity(self.cached.realm_roles().len());
        for id in self.cached.realm_roles().values() {
            if let Some(role) = provider.get_role_by_id(id, self.id()).await? {
                roles.push(role);
            }
        }
        Ok(roles)
    }

    pub async fn role(&self, name: &str) -> Result<Option<Arc<RoleAdapter<S>>>, S::Error> {
        match self.cached.role_id(name) {
            Some(id) => self.parent().get_role_by_id(id, self.id()).await,
            None => Ok(None),
        }
    }

    /// Realm roles granted to every new user.
    pub async fn default_roles(&self) -> Result<Vec<Arc<RoleAdapter<S>>>, S::Error> {
        let mut roles = Vec::new();
        for name in self.cached.default_roles() {
            if let Some(role) = self.role(name).await? {
                roles.push(role);
            }
        }
        Ok(roles)
    }

    pub async fn clients(&self) -> Result<Vec<Arc<ClientAdapter<S>>>, S::Error> {
        let provider = self.parent();
        let mut clients = Vec::with_capacity(self.cached.clients().len());
        for id in self.cached.clients().values() {
            if let Some(client) = provider.get_client_by_id(id, self.id()).await? {
                clients.push(client);
            }
        }
        Ok(clients)
    }

    pub async fn client_by_client_id(&self, client_id: &str) -> Result<Option<Arc<ClientAdapter<S>>>, S::Error> {
        self.parent().get_client_by_client_id(self.id(), client_id).await
    }

    pub async fn client_templates(&self) -> Result<Vec<Arc<ClientTemplateAdapter<S>>>, S::Error> {
        let provider = self.parent();
        let mut templates = Vec::with_capacity(self.cached.client_templates().len());
        for id in self.cached.client_templates() {
            if let Some(template) = provider.get_client_template_by_id(id, self.id()).await? {
                templates.push(template);
            }
        }
        Ok(templates)
    }

    pub async fn groups(&self) -> Result<Vec<Arc<GroupAdapter<S>>>, S::Error> {
        self.resolve_groups(self.cached.groups().iter()).await
    }

    pub async fn top_level_groups(&self) -> Result<Vec<Arc<GroupAdapter<S>>>, S::Error> {
        self.resolve_groups(self.cached.top_level_groups().iter()).await
    }

    pub async fn default_groups(&self) -> Result<Vec<Arc<GroupAdapter<S>>>, S::Error> {
        self.resolve_groups(self.cached.default_groups().iter()).await
    }

    async fn resolve_groups<'a, I>(&self, ids: I) -> Result<Vec<Arc<GroupAdapter<S>>>, S::Error>
    where
        I: Iterator<Item = &'a String> + Send,
    {
        let provider = self.parent();
        let mut groups = Vec::new();
        for id in ids {
            if let Some(group) = provider.get_group_by_id(id, self.id()).await? {
                groups.push(group);
            }
        }
        Ok(groups)
    }

    pub async fn add_client(&self, client_id: &str) -> Result<ClientModel, S::Error> {
        self.parent().add_client(self.id(), client_id).await
    }

    pub async fn add_role(&self, name: &str) -> Result<RoleModel, S::Error> {
        self.parent().add_realm_role(self.id(), name).await
    }

    pub async fn add_client_template(&self, name: &str) -> Result<ClientTemplateModel, S::Error> {
        self.parent().add_client_template(self.id(), name).await
    }

    pub async fn create_group(&self, name: &str, parent: Option<&str>) -> Result<GroupModel, S::Error> {
        self.parent().create_group(self.id(), name, parent).await
    }

    /// Applies `mutate` to the backing store's copy of this realm. The adapter keeps showing the snapshot it was built
    /// over; read the realm again for the new state.
    pub async fn update<F>(&self, mutate: F) -> Result<Option<RealmModel>, S::Error>
    where
        F: FnOnce(&mut RealmModel) + Send,
    {
        self.parent().update_realm(self.id(), mutate).await
    }
}

impl<S> Debug for RealmAdapter<S>
where
    S: RealmStore,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealmAdapter")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("managed", &self.managed)
            .finish()
    }
}
