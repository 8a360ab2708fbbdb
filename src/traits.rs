use async_trait::async_trait;
use std::fmt::Debug;

use crate::{
    error::CacheError,
    model::{ClientModel, ClientTemplateModel, GroupModel, RealmModel, RoleContainer, RoleModel},
    revision::Revision,
};

/// The authoritative persistent store for realm configuration.
///
/// Every read the cache cannot serve and every write lands here. The `realm_id` arguments scope lookups: an entity
/// that exists but belongs to another realm must be reported as absent.
///
/// The enumeration methods (`get_realm_roles`, `get_client_roles`, ...) are what lets the cache register dependents
/// of an entity for invalidation before the entity is deleted.
#[async_trait]
pub trait RealmStore: Send + Sync + 'static {
    /// Cache failures (lock timeouts and the like) are reported through this type, so callers only ever deal with the
    /// store's own error semantics.
    type Error: std::error::Error + From<CacheError> + Send + Sync + 'static;

    async fn create_realm(&self, id: Option<&str>, name: &str) -> Result<RealmModel, Self::Error>;
    async fn get_realm(&self, id: &str) -> Result<Option<RealmModel>, Self::Error>;
    async fn get_realm_by_name(&self, name: &str) -> Result<Option<RealmModel>, Self::Error>;
    async fn get_realms(&self) -> Result<Vec<RealmModel>, Self::Error>;
    async fn update_realm(&self, realm: &RealmModel) -> Result<(), Self::Error>;
    async fn remove_realm(&self, id: &str) -> Result<bool, Self::Error>;

    async fn add_client(&self, realm_id: &str, client_id: &str) -> Result<ClientModel, Self::Error>;
    async fn get_client_by_id(&self, id: &str, realm_id: &str) -> Result<Option<ClientModel>, Self::Error>;
    async fn get_client_by_client_id(&self, client_id: &str, realm_id: &str)
        -> Result<Option<ClientModel>, Self::Error>;
    async fn get_clients(&self, realm_id: &str) -> Result<Vec<ClientModel>, Self::Error>;
    async fn update_client(&self, client: &ClientModel) -> Result<(), Self::Error>;
    async fn remove_client(&self, id: &str, realm_id: &str) -> Result<bool, Self::Error>;

    async fn add_client_template(&self, realm_id: &str, name: &str) -> Result<ClientTemplateModel, Self::Error>;
    async fn get_client_template_by_id(
        &self,
        id: &str,
        realm_id: &str,
    ) -> Result<Option<ClientTemplateModel>, Self::Error>;
    async fn get_client_templates(&self, realm_id: &str) -> Result<Vec<ClientTemplateModel>, Self::Error>;
    async fn update_client_template(&self, template: &ClientTemplateModel) -> Result<(), Self::Error>;
    async fn remove_client_template(&self, id: &str, realm_id: &str) -> Result<bool, Self::Error>;

    async fn add_role(&self, realm_id: &str, container: &RoleContainer, name: &str) -> Result<RoleModel, Self::Error>;
    async fn get_role_by_id(&self, id: &str, realm_id: &str) -> Result<Option<RoleModel>, Self::Error>;
    async fn get_realm_roles(&self, realm_id: &str) -> Result<Vec<RoleModel>, Self::Error>;
    async fn get_client_roles(&self, client: &str, realm_id: &str) -> Result<Vec<RoleModel>, Self::Error>;
    async fn update_role(&self, role: &RoleModel) -> Result<(), Self::Error>;
    async fn remove_role(&self, id: &str, realm_id: &str) -> Result<bool, Self::Error>;

    async fn create_group(&self, realm_id: &str, name: &str, parent: Option<&str>)
        -> Result<GroupModel, Self::Error>;
    async fn get_group_by_id(&self, id: &str, realm_id: &str) -> Result<Option<GroupModel>, Self::Error>;
    async fn get_groups(&self, realm_id: &str) -> Result<Vec<GroupModel>, Self::Error>;
    async fn update_group(&self, group: &GroupModel) -> Result<(), Self::Error>;
    async fn remove_group(&self, id: &str, realm_id: &str) -> Result<bool, Self::Error>;
}

/// Hook into the cache's invalidation traffic. This is where a cluster transport would pick up what to replay on the
/// other nodes.
///
/// Called while the batch still holds its locks, so a failing observer never leaves a lock behind: the batch is
/// released regardless and the error is reported afterwards.
#[async_trait]
pub trait CacheObserver: Debug + Send + Sync + 'static {
    async fn on_invalidate(&self, _invalidated: &[(String, Revision)]) -> Result<(), CacheError> {
        Ok(())
    }

    async fn on_clear(&self, _floor: Revision) -> Result<(), CacheError> {
        Ok(())
    }
}

/// Observer used when none is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl CacheObserver for NoopObserver {}
