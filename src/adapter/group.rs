use std::{fmt::Debug, sync::Arc};

use fieldx_plus::fx_plus;

use crate::{
    adapter::RoleAdapter,
    entity::CachedGroup,
    model::GroupModel,
    provider::CacheRealmProvider,
    traits::RealmStore,
};

#[fx_plus(child(CacheRealmProvider<S>, rc_strong), sync, default(off), get(off))]
pub struct GroupAdapter<S>
where
    S: RealmStore,
{
    #[fieldx(get)]
    cached: Arc<CachedGroup>,

    managed: bool,
}

impl<S> GroupAdapter<S>
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

    pub fn parent_id(&self) -> Option<&str> {
        self.cached.parent()
    }

    pub fn model(&self) -> &GroupModel {
        self.cached.model()
    }

    pub fn is_managed(&self) -> bool {
        self.managed
    }

    pub async fn parent_group(&self) -> Result<Option<Arc<GroupAdapter<S>>>, S::Error> {
        match self.cached.parent() {
            Some(id) => self.parent().get_group_by_id(id, self.realm_id()).await,
            None => Ok(None),
        }
    }

    pub async fn sub_groups(&self) -> Result<Vec<Arc<GroupAdapter<S>>>, S::Error> {
        let provider = self.parent();
        let mut groups = Vec::with_capacity(self.cached.sub_groups().len());
        for id in self.cached.sub_groups() {
            if let Some(group) = provider.get_group_by_id(id, self.realm_id()).await? {
                groups.push(group);
            }
        }
        Ok(groups)
    }

    pub async fn role_mappings(&self) -> Result<Vec<Arc<RoleAdapter<S>>>, S::Error> {
        let provider = self.parent();
        let mut roles = Vec::with_capacity(self.cached.role_mappings().len());
        for id in self.cached.role_mappings() {
            if let Some(role) = provider.get_role_by_id(id, self.realm_id()).await? {
                roles.push(role);
            }
        }
        Ok(roles)
    }

    pub async fn update<F>(&self, mutate: F) -> Result<Option<GroupModel>, S::Error>
    where
        F: FnOnce(&mut GroupModel) + Send,
    {
        self.parent().update_group(self.id(), self.realm_id(), mutate).await
    }
}

impl<S> Debug for GroupAdapter<S>
where
    S: RealmStore,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupAdapter")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("managed", &self.managed)
            .finish()
    }
}
