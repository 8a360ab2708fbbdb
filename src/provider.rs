//! The per unit-of-work face of the cache: read path, write path and the state the coordinator hooks work with.

use std::{
    collections::{BTreeSet, VecDeque},
    fmt::Debug,
    sync::Arc,
};

use fieldx_plus::{child_build, fx_plus};
use tracing::{debug, trace};

use crate::{
    adapter::{ClientAdapter, ClientTemplateAdapter, GroupAdapter, RealmAdapter, RoleAdapter},
    batch::RevisionBatch,
    cache::RealmCache,
    coordinator::{AfterCompletionHook, PrepareHook},
    entity::{CachedClient, CachedClientTemplate, CachedGroup, CachedRealm, CachedRole},
    entry::CacheEntry,
    error::{CacheError, TransactionError},
    managed::ManagedObjects,
    model::{ClientModel, ClientTemplateModel, GroupModel, RealmModel, RoleContainer, RoleModel},
    registry::InvalidationRegistry,
    stamp::LoadStamp,
    traits::RealmStore,
    transaction::TransactionManager,
    types::Category,
};

type Found<A> = Option<Arc<A>>;

impl RealmCache {
    /// Opens a provider for one unit of work and enlists its prepare and after-completion hooks into `tm`.
    pub async fn session<S: RealmStore>(
        &self,
        store: Arc<S>,
        tm: &TransactionManager,
    ) -> Result<Arc<CacheRealmProvider<S>>, TransactionError> {
        let provider = child_build!(
            self,
            CacheRealmProvider<S> {
                backing_store: store,
            }
        )
        .map_err(|err| CacheError::builder("realm provider", err))?;

        tm.enlist_prepare(Arc::new(PrepareHook::new(Arc::clone(&provider))))
            .await?;
        tm.enlist_after_completion(Arc::new(AfterCompletionHook::new(Arc::clone(&provider))))
            .await?;
        Ok(provider)
    }
}

/// Cache-aware access to realm configuration for a single unit of work.
///
/// Reads are served from the shared [`RealmCache`] when the snapshot there is fresh and nothing in this unit of work
/// has invalidated it. Writes go straight to the backing store and register everything they make stale; the
/// invalidations are applied when the unit of work completes.
///
/// Results are adapters. Within one unit of work the same identifier always yields the same managed adapter. Entities
/// this unit of work has already invalidated come back as detached adapters over a fresh snapshot that is never cached.
#[fx_plus(child(RealmCache, rc_strong), parent, sync, rc, default(off), get(off))]
pub struct CacheRealmProvider<S>
where
    S: RealmStore,
{
    #[fieldx(vis(pub(crate)), builder(vis(pub), required), get(clone))]
    backing_store: Arc<S>,

    #[fieldx(lock, get, get_mut(vis(pub(crate))), builder(off), default(InvalidationRegistry::new()))]
    registry: InvalidationRegistry,

    #[fieldx(lock, vis(pub(crate)), get, get_mut, builder(off), default(ManagedObjects::new()))]
    realms: ManagedObjects<RealmAdapter<S>>,

    #[fieldx(lock, vis(pub(crate)), get, get_mut, builder(off), default(ManagedObjects::new()))]
    clients: ManagedObjects<ClientAdapter<S>>,

    #[fieldx(lock, vis(pub(crate)), get, get_mut, builder(off), default(ManagedObjects::new()))]
    client_templates: ManagedObjects<ClientTemplateAdapter<S>>,

    #[fieldx(lock, vis(pub(crate)), get, get_mut, builder(off), default(ManagedObjects::new()))]
    roles: ManagedObjects<RoleAdapter<S>>,

    #[fieldx(lock, vis(pub(crate)), get, get_mut, builder(off), default(ManagedObjects::new()))]
    groups: ManagedObjects<GroupAdapter<S>>,

    // Locks taken in prepare live here until after-completion ends the batch.
    #[fieldx(lock, private, get_mut, builder(off), default(None))]
    batch: Option<RevisionBatch>,

    #[fieldx(lock, private, get(copy), set, builder(off), default(false))]
    active: bool,

    #[fieldx(lock, private, get(copy), set, builder(off), default(false))]
    touched: bool,

    #[fieldx(lock, private, get(copy), set, builder(off), default(false))]
    doomed: bool,
}

impl<S> CacheRealmProvider<S>
where
    S: RealmStore,
{
    pub fn cache(&self) -> Arc<RealmCache> {
        self.parent().clone()
    }

    /// The backing store. Only available while the unit of work is active; using it arms the prepare hook.
    pub fn store(&self) -> Result<Arc<S>, S::Error> {
        if !self.active() {
            return Err(CacheError::NoActiveTransaction.into());
        }
        self.set_touched(true);
        Ok(self.backing_store())
    }

    pub fn is_transaction_active(&self) -> bool {
        self.active()
    }

    /// Whether this unit of work has touched the backing store.
    pub fn store_used(&self) -> bool {
        self.touched()
    }

    pub fn set_rollback_only(&self) {
        self.set_doomed(true);
    }

    pub fn rollback_only(&self) -> bool {
        self.doomed()
    }

    pub fn register_invalidation<I: Into<String>>(&self, category: Category, id: I) {
        let id = id.into();
        trace!(%category, id, "invalidation registered");
        self.registry_mut().register(category, id);
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.registry().is_pending(id)
    }

    /// Releases the adapters this unit of work manages.
    pub fn close(&self) {
        self.clear_managed();
        if self.batch_mut().take().is_some() {
            debug!("provider closed with an open revision batch");
        }
    }

    pub(crate) fn begin(&self) {
        self.set_active(true);
        self.set_doomed(false);
    }

    pub(crate) fn deactivate(&self) {
        self.set_active(false);
    }

    pub(crate) fn install_batch(&self, batch: RevisionBatch) {
        *self.batch_mut() = Some(batch);
    }

    pub(crate) fn take_batch(&self) -> Option<RevisionBatch> {
        self.batch_mut().take()
    }

    // End of the unit of work: nothing pending, nothing managed, no store access recorded.
    pub(crate) fn reset(&self) {
        self.registry_mut().reset();
        self.clear_managed();
        self.set_touched(false);
        self.set_active(false);
    }

    fn clear_managed(&self) {
        self.realms_mut().clear();
        self.clients_mut().clear();
        self.client_templates_mut().clear();
        self.roles_mut().clear();
        self.groups_mut().clear();
    }

    // Stamp for a snapshot about to be loaded. Taken before the load and held until the snapshot is put.
    fn stamp(&self, id: &str) -> Result<LoadStamp, S::Error> {
        Ok(self.cache().load_stamp(Some(id))?)
    }

    fn alias_stamp(&self) -> Result<LoadStamp, S::Error> {
        Ok(self.cache().load_stamp(None)?)
    }

    // ---- Realms

    pub async fn get_realm(&self, id: &str) -> Result<Found<RealmAdapter<S>>, S::Error> {
        if self.is_pending(id) {
            trace!(id, "realm invalidated in this unit of work, reading through");
            let store = self.store()?;
            return match store.get_realm(id).await? {
                Some(model) => self.detached_realm(&store, &model).await.map(Some),
                None => Ok(None),
            };
        }

        if let Some(adapter) = self.realms().get(id) {
            return Ok(Some(adapter));
        }

        if let Some((revision, cached)) = self.cache().get_realm(id).await {
            trace!(id, name = cached.name(), %revision, "realm cache hit");
            return self.manage_realm(cached).map(Some);
        }

        let stamp = self.stamp(id)?;
        let store = self.store()?;
        match store.get_realm(id).await? {
            Some(model) => self.cache_realm(&store, stamp, &model).await.map(Some),
            None => Ok(None),
        }
    }

    pub async fn get_realm_by_name(&self, name: &str) -> Result<Found<RealmAdapter<S>>, S::Error> {
        if let Some((revision, cached)) = self.cache().get_realm_by_name(name).await {
            trace!(name, id = cached.id(), %revision, "realm by name cache hit");
            if self.is_pending(cached.id()) {
                let store = self.store()?;
                return match store.get_realm_by_name(name).await? {
                    Some(model) => self.detached_realm(&store, &model).await.map(Some),
                    None => Ok(None),
                };
            }
            if let Some(adapter) = self.realms().get(cached.id()) {
                return Ok(Some(adapter));
            }
            return self.manage_realm(cached).map(Some);
        }

        let stamp = self.alias_stamp()?;
        let store = self.store()?;
        let Some(model) = store.get_realm_by_name(name).await?
        else {
            return Ok(None);
        };
        if let Some(adapter) = self.realms().get(&model.id) {
            if !self.is_pending(&model.id) {
                return Ok(Some(adapter));
            }
        }
        self.cache_realm(&store, stamp, &model).await.map(Some)
    }

    pub async fn get_realms(&self) -> Result<Vec<Arc<RealmAdapter<S>>>, S::Error> {
        let models = self.store()?.get_realms().await?;
        let mut realms = Vec::with_capacity(models.len());
        for model in models {
            if let Some(realm) = self.get_realm(&model.id).await? {
                realms.push(realm);
            }
        }
        Ok(realms)
    }

    async fn realm_snapshot(&self, store: &S, model: &RealmModel) -> Result<Arc<CachedRealm>, S::Error> {
        let roles = store.get_realm_roles(&model.id).await?;
        let clients = store.get_clients(&model.id).await?;
        let templates = store.get_client_templates(&model.id).await?;
        let groups = store.get_groups(&model.id).await?;
        Ok(Arc::new(CachedRealm::new(model, &roles, &clients, &templates, &groups)))
    }

    async fn cache_realm(&self, store: &S, stamp: LoadStamp, model: &RealmModel) -> Result<Arc<RealmAdapter<S>>, S::Error> {
        let cached = self.realm_snapshot(store, model).await?;
        // A write in this unit of work may have landed while we were loading.
        if self.is_pending(&model.id) {
            return self.realm_adapter(cached, false);
        }
        trace!(id = model.id, name = model.name, stamp = %stamp.revision(), "realm cache miss, caching");
        self.cache().put(CacheEntry::new(stamp.revision(), Arc::clone(&cached))).await;
        self.manage_realm(cached)
    }

    async fn detached_realm(&self, store: &S, model: &RealmModel) -> Result<Arc<RealmAdapter<S>>, S::Error> {
        let cached = self.realm_snapshot(store, model).await?;
        self.realm_adapter(cached, false)
    }

    fn manage_realm(&self, cached: Arc<CachedRealm>) -> Result<Arc<RealmAdapter<S>>, S::Error> {
        let id = cached.id().to_string();
        if let Some(adapter) = self.realms().get(&id) {
            return Ok(adapter);
        }
        let adapter = self.realm_adapter(cached, true)?;
        Ok(self.realms_mut().get_or_create(&id, || adapter))
    }

    fn realm_adapter(&self, cached: Arc<CachedRealm>, managed: bool) -> Result<Arc<RealmAdapter<S>>, S::Error> {
        let adapter = child_build!(
            self,
            RealmAdapter<S> {
                cached: cached,
                managed: managed,
            }
        )
        .map_err(|err| CacheError::builder("realm adapter", err))?;
        Ok(Arc::new(adapter))
    }

    // ---- Clients

    pub async fn get_client_by_id(&self, id: &str, realm_id: &str) -> Result<Found<ClientAdapter<S>>, S::Error> {
        if self.is_pending(id) {
            trace!(id, "client invalidated in this unit of work, reading through");
            let store = self.store()?;
            return match store.get_client_by_id(id, realm_id).await? {
                Some(model) => self.detached_client(&store, &model).await.map(Some),
                None => Ok(None),
            };
        }

        if let Some(adapter) = self.clients().get(id) {
            if adapter.realm_id() == realm_id {
                return Ok(Some(adapter));
            }
        }

        match self.cache().get_client(id).await {
            Some((revision, cached)) if cached.realm_id() == realm_id => {
                trace!(id, client_id = cached.client_id(), %revision, "client cache hit");
                return self.manage_client(cached).map(Some);
            }
            Some((_, cached)) => {
                trace!(id, realm_id, cached_realm = cached.realm_id(), "client scope mismatch");
            }
            None => (),
        }

        let stamp = self.stamp(id)?;
        let store = self.store()?;
        match store.get_client_by_id(id, realm_id).await? {
            Some(model) => self.cache_client(&store, stamp, &model).await.map(Some),
            None => Ok(None),
        }
    }

    pub async fn get_client_by_client_id(
        &self,
        realm_id: &str,
        client_id: &str,
    ) -> Result<Found<ClientAdapter<S>>, S::Error> {
        if let Some((revision, cached)) = self.cache().get_client_by_client_id(realm_id, client_id).await {
            trace!(client_id, id = cached.id(), %revision, "client by client id cache hit");
            if self.is_pending(cached.id()) {
                let store = self.store()?;
                return match store.get_client_by_client_id(client_id, realm_id).await? {
                    Some(model) => self.detached_client(&store, &model).await.map(Some),
                    None => Ok(None),
                };
            }
            if let Some(adapter) = self.clients().get(cached.id()) {
                return Ok(Some(adapter));
            }
            return self.manage_client(cached).map(Some);
        }

        let stamp = self.alias_stamp()?;
        let store = self.store()?;
        let Some(model) = store.get_client_by_client_id(client_id, realm_id).await?
        else {
            return Ok(None);
        };
        if let Some(adapter) = self.clients().get(&model.id) {
            if !self.is_pending(&model.id) && adapter.realm_id() == realm_id {
                return Ok(Some(adapter));
            }
        }
        self.cache_client(&store, stamp, &model).await.map(Some)
    }

    pub async fn get_clients(&self, realm_id: &str) -> Result<Vec<Arc<ClientAdapter<S>>>, S::Error> {
        let models = self.store()?.get_clients(realm_id).await?;
        let mut clients = Vec::with_capacity(models.len());
        for model in models {
            if let Some(client) = self.get_client_by_id(&model.id, realm_id).await? {
                clients.push(client);
            }
        }
        Ok(clients)
    }

    async fn client_snapshot(&self, store: &S, model: &ClientModel) -> Result<Arc<CachedClient>, S::Error> {
        let roles = store.get_client_roles(&model.id, &model.realm_id).await?;
        Ok(Arc::new(CachedClient::new(model, &roles)))
    }

    async fn cache_client(
        &self,
        store: &S,
        stamp: LoadStamp,
        model: &ClientModel,
    ) -> Result<Arc<ClientAdapter<S>>, S::Error> {
        let cached = self.client_snapshot(store, model).await?;
        if self.is_pending(&model.id) {
            return self.client_adapter(cached, false);
        }
        trace!(id = model.id, client_id = model.client_id, stamp = %stamp.revision(), "client cache miss, caching");
        self.cache().put(CacheEntry::new(stamp.revision(), Arc::clone(&cached))).await;
        self.manage_client(cached)
    }

    async fn detached_client(&self, store: &S, model: &ClientModel) -> Result<Arc<ClientAdapter<S>>, S::Error> {
        let cached = self.client_snapshot(store, model).await?;
        self.client_adapter(cached, false)
    }

    fn manage_client(&self, cached: Arc<CachedClient>) -> Result<Arc<ClientAdapter<S>>, S::Error> {
        let id = cached.id().to_string();
        if let Some(adapter) = self.clients().get(&id) {
            return Ok(adapter);
        }
        let adapter = self.client_adapter(cached, true)?;
        Ok(self.clients_mut().get_or_create(&id, || adapter))
    }

    fn client_adapter(&self, cached: Arc<CachedClient>, managed: bool) -> Result<Arc<ClientAdapter<S>>, S::Error> {
        let adapter = child_build!(
            self,
            ClientAdapter<S> {
                cached: cached,
                managed: managed,
            }
        )
        .map_err(|err| CacheError::builder("client adapter", err))?;
        Ok(Arc::new(adapter))
    }

    // ---- Client templates

    pub async fn get_client_template_by_id(
        &self,
        id: &str,
        realm_id: &str,
    ) -> Result<Found<ClientTemplateAdapter<S>>, S::Error> {
        if self.is_pending(id) {
            trace!(id, "client template invalidated in this unit of work, reading through");
            let store = self.store()?;
            return match store.get_client_template_by_id(id, realm_id).await? {
                Some(model) => self
                    .client_template_adapter(Arc::new(CachedClientTemplate::new(&model)), false)
                    .map(Some),
                None => Ok(None),
            };
        }

        if let Some(adapter) = self.client_templates().get(id) {
            if adapter.realm_id() == realm_id {
                return Ok(Some(adapter));
            }
        }

        match self.cache().get_client_template(id).await {
            Some((revision, cached)) if cached.realm_id() == realm_id => {
                trace!(id, %revision, "client template cache hit");
                return self.manage_client_template(cached).map(Some);
            }
            Some((_, cached)) => {
                trace!(id, realm_id, cached_realm = cached.realm_id(), "client template scope mismatch");
            }
            None => (),
        }

        let stamp = self.stamp(id)?;
        let Some(model) = self.store()?.get_client_template_by_id(id, realm_id).await?
        else {
            return Ok(None);
        };
        let cached = Arc::new(CachedClientTemplate::new(&model));
        if self.is_pending(id) {
            return self.client_template_adapter(cached, false).map(Some);
        }
        trace!(id, stamp = %stamp.revision(), "client template cache miss, caching");
        self.cache().put(CacheEntry::new(stamp.revision(), Arc::clone(&cached))).await;
        self.manage_client_template(cached).map(Some)
    }

    fn manage_client_template(
        &self,
        cached: Arc<CachedClientTemplate>,
    ) -> Result<Arc<ClientTemplateAdapter<S>>, S::Error> {
        let id = cached.id().to_string();
        if let Some(adapter) = self.client_templates().get(&id) {
            return Ok(adapter);
        }
        let adapter = self.client_template_adapter(cached, true)?;
        Ok(self.client_templates_mut().get_or_create(&id, || adapter))
    }

    fn client_template_adapter(
        &self,
        cached: Arc<CachedClientTemplate>,
        managed: bool,
    ) -> Result<Arc<ClientTemplateAdapter<S>>, S::Error> {
        let adapter = child_build!(
            self,
            ClientTemplateAdapter<S> {
                cached: cached,
                managed: managed,
            }
        )
        .map_err(|err| CacheError::builder("client template adapter", err))?;
        Ok(Arc::new(adapter))
    }

    // ---- Roles

    pub async fn get_role_by_id(&self, id: &str, realm_id: &str) -> Result<Found<RoleAdapter<S>>, S::Error> {
        if self.is_pending(id) {
            trace!(id, "role invalidated in this unit of work, reading through");
            return match self.store()?.get_role_by_id(id, realm_id).await? {
                Some(model) => self.role_adapter(Arc::new(CachedRole::new(&model)), false).map(Some),
                None => Ok(None),
            };
        }

        if let Some(adapter) = self.roles().get(id) {
            if adapter.realm_id() == realm_id {
                return Ok(Some(adapter));
            }
        }

        match self.cache().get_role(id).await {
            Some((revision, cached)) if cached.realm_id == realm_id => {
                trace!(id, name = cached.name, %revision, "role cache hit");
                return self.manage_role(cached).map(Some);
            }
            Some((_, cached)) => {
                trace!(id, realm_id, cached_realm = cached.realm_id, "role scope mismatch");
            }
            None => (),
        }

        let stamp = self.stamp(id)?;
        let Some(model) = self.store()?.get_role_by_id(id, realm_id).await?
        else {
            return Ok(None);
        };
        let cached = Arc::new(CachedRole::new(&model));
        if self.is_pending(id) {
            return self.role_adapter(cached, false).map(Some);
        }
        trace!(id, name = model.name, stamp = %stamp.revision(), "role cache miss, caching");
        self.cache().put(CacheEntry::new(stamp.revision(), Arc::clone(&cached))).await;
        self.manage_role(cached).map(Some)
    }

    fn manage_role(&self, cached: Arc<CachedRole>) -> Result<Arc<RoleAdapter<S>>, S::Error> {
        let id = cached.id.clone();
        if let Some(adapter) = self.roles().get(&id) {
            return Ok(adapter);
        }
        let adapter = self.role_adapter(cached, true)?;
        Ok(self.roles_mut().get_or_create(&id, || adapter))
    }

    fn role_adapter(&self, cached: Arc<CachedRole>, managed: bool) -> Result<Arc<RoleAdapter<S>>, S::Error> {
        let adapter = child_build!(
            self,
            RoleAdapter<S> {
                cached: cached,
                managed: managed,
            }
        )
        .map_err(|err| CacheError::builder("role adapter", err))?;
        Ok(Arc::new(adapter))
    }

    // ---- Groups

    pub async fn get_group_by_id(&self, id: &str, realm_id: &str) -> Result<Found<GroupAdapter<S>>, S::Error> {
        if self.is_pending(id) {
            trace!(id, "group invalidated in this unit of work, reading through");
            return match self.store()?.get_group_by_id(id, realm_id).await? {
                Some(model) => self.group_adapter(Arc::new(CachedGroup::new(&model)), false).map(Some),
                None => Ok(None),
            };
        }

        if let Some(adapter) = self.groups().get(id) {
            if adapter.realm_id() == realm_id {
                return Ok(Some(adapter));
            }
        }

        match self.cache().get_group(id).await {
            Some((revision, cached)) if cached.realm_id() == realm_id => {
                trace!(id, name = cached.name(), %revision, "group cache hit");
                return self.manage_group(cached).map(Some);
            }
            Some((_, cached)) => {
                trace!(id, realm_id, cached_realm = cached.realm_id(), "group scope mismatch");
            }
            None => (),
        }

        let stamp = self.stamp(id)?;
        let Some(model) = self.store()?.get_group_by_id(id, realm_id).await?
        else {
            return Ok(None);
        };
        let cached = Arc::new(CachedGroup::new(&model));
        if self.is_pending(id) {
            return self.group_adapter(cached, false).map(Some);
        }
        trace!(id, name = model.name, stamp = %stamp.revision(), "group cache miss, caching");
        self.cache().put(CacheEntry::new(stamp.revision(), Arc::clone(&cached))).await;
        self.manage_group(cached).map(Some)
    }

    fn manage_group(&self, cached: Arc<CachedGroup>) -> Result<Arc<GroupAdapter<S>>, S::Error> {
        let id = cached.id().to_string();
        if let Some(adapter) = self.groups().get(&id) {
            return Ok(adapter);
        }
        let adapter = self.group_adapter(cached, true)?;
        Ok(self.groups_mut().get_or_create(&id, || adapter))
    }

    fn group_adapter(&self, cached: Arc<CachedGroup>, managed: bool) -> Result<Arc<GroupAdapter<S>>, S::Error> {
        let adapter = child_build!(
            self,
            GroupAdapter<S> {
                cached: cached,
                managed: managed,
            }
        )
        .map_err(|err| CacheError::builder("group adapter", err))?;
        Ok(Arc::new(adapter))
    }

    // ---- Write path

    pub async fn create_realm(&self, name: &str) -> Result<RealmModel, S::Error> {
        let realm = self.store()?.create_realm(None, name).await?;
        self.register_invalidation(Category::Realm, realm.id.as_str());
        Ok(realm)
    }

    pub async fn create_realm_with_id(&self, id: &str, name: &str) -> Result<RealmModel, S::Error> {
        let realm = self.store()?.create_realm(Some(id), name).await?;
        self.register_invalidation(Category::Realm, realm.id.as_str());
        Ok(realm)
    }

    /// Removes a realm together with everything it owns. Every owned entity is registered for invalidation first since
    /// none of it can be enumerated once the realm is gone.
    pub async fn remove_realm(&self, id: &str) -> Result<bool, S::Error> {
        let store = self.store()?;
        self.register_invalidation(Category::Realm, id);

        if store.get_realm(id).await?.is_some() {
            for role in store.get_realm_roles(id).await? {
                self.register_invalidation(Category::Role, role.id);
            }
            for client in store.get_clients(id).await? {
                for role in store.get_client_roles(&client.id, id).await? {
                    self.register_invalidation(Category::Role, role.id);
                }
                self.register_invalidation(Category::Client, client.id);
            }
            for template in store.get_client_templates(id).await? {
                self.register_invalidation(Category::ClientTemplate, template.id);
            }
            for group in store.get_groups(id).await? {
                self.register_invalidation(Category::Group, group.id);
            }
        }

        let removed = store.remove_realm(id).await?;
        debug!(id, removed, pending = self.registry().len(), "realm removal");
        Ok(removed)
    }

    pub async fn update_realm<F>(&self, id: &str, mutate: F) -> Result<Option<RealmModel>, S::Error>
    where
        F: FnOnce(&mut RealmModel) + Send,
    {
        let store = self.store()?;
        self.register_invalidation(Category::Realm, id);
        let Some(mut realm) = store.get_realm(id).await?
        else {
            return Ok(None);
        };
        mutate(&mut realm);
        store.update_realm(&realm).await?;
        Ok(Some(realm))
    }

    pub async fn add_client(&self, realm_id: &str, client_id: &str) -> Result<ClientModel, S::Error> {
        let client = self.store()?.add_client(realm_id, client_id).await?;
        self.register_invalidation(Category::Client, client.id.as_str());
        self.register_invalidation(Category::Realm, realm_id);
        Ok(client)
    }

    /// Removes a client and registers its roles, which go with it, along with every snapshot referring to those roles.
    pub async fn remove_client(&self, id: &str, realm_id: &str) -> Result<bool, S::Error> {
        let store = self.store()?;
        if store.get_client_by_id(id, realm_id).await?.is_none() {
            return Ok(false);
        }

        self.register_invalidation(Category::Client, id);
        self.register_invalidation(Category::Realm, realm_id);
        let roles = store
            .get_client_roles(id, realm_id)
            .await?
            .into_iter()
            .map(|role| role.id)
            .collect::<BTreeSet<_>>();
        for role in &roles {
            self.register_invalidation(Category::Role, role.as_str());
        }
        self.register_role_dependents(&store, &roles, realm_id).await?;

        store.remove_client(id, realm_id).await
    }

    pub async fn update_client<F>(&self, id: &str, realm_id: &str, mutate: F) -> Result<Option<ClientModel>, S::Error>
    where
        F: FnOnce(&mut ClientModel) + Send,
    {
        let store = self.store()?;
        self.register_invalidation(Category::Client, id);
        // The realm snapshot indexes clients by their client id.
        self.register_invalidation(Category::Realm, realm_id);
        let Some(mut client) = store.get_client_by_id(id, realm_id).await?
        else {
            return Ok(None);
        };
        mutate(&mut client);
        store.update_client(&client).await?;
        Ok(Some(client))
    }

    pub async fn add_client_template(&self, realm_id: &str, name: &str) -> Result<ClientTemplateModel, S::Error> {
        let template = self.store()?.add_client_template(realm_id, name).await?;
        self.register_invalidation(Category::ClientTemplate, template.id.as_str());
        self.register_invalidation(Category::Realm, realm_id);
        Ok(template)
    }

    pub async fn remove_client_template(&self, id: &str, realm_id: &str) -> Result<bool, S::Error> {
        let store = self.store()?;
        self.register_invalidation(Category::ClientTemplate, id);
        self.register_invalidation(Category::Realm, realm_id);
        for client in store.get_clients(realm_id).await? {
            if client.client_template.as_deref() == Some(id) {
                self.register_invalidation(Category::Client, client.id);
            }
        }
        store.remove_client_template(id, realm_id).await
    }

    pub async fn update_client_template<F>(
        &self,
        id: &str,
        realm_id: &str,
        mutate: F,
    ) -> Result<Option<ClientTemplateModel>, S::Error>
    where
        F: FnOnce(&mut ClientTemplateModel) + Send,
    {
        let store = self.store()?;
        self.register_invalidation(Category::ClientTemplate, id);
        let Some(mut template) = store.get_client_template_by_id(id, realm_id).await?
        else {
            return Ok(None);
        };
        mutate(&mut template);
        store.update_client_template(&template).await?;
        Ok(Some(template))
    }

    pub async fn add_realm_role(&self, realm_id: &str, name: &str) -> Result<RoleModel, S::Error> {
        let container = RoleContainer::Realm(realm_id.to_string());
        let role = self.store()?.add_role(realm_id, &container, name).await?;
        self.register_invalidation(Category::Role, role.id.as_str());
        self.register_invalidation(Category::Realm, realm_id);
        Ok(role)
    }

    pub async fn add_client_role(&self, realm_id: &str, client: &str, name: &str) -> Result<RoleModel, S::Error> {
        let container = RoleContainer::Client(client.to_string());
        let role = self.store()?.add_role(realm_id, &container, name).await?;
        self.register_invalidation(Category::Role, role.id.as_str());
        self.register_invalidation(Category::Client, client);
        Ok(role)
    }

    /// Removes a role. Its container and every snapshot that refers to it by id are registered first: composite roles,
    /// groups mapping it and clients or templates carrying it as a scope mapping.
    pub async fn remove_role(&self, id: &str, realm_id: &str) -> Result<bool, S::Error> {
        let store = self.store()?;
        self.register_invalidation(Category::Role, id);
        self.register_invalidation(Category::Realm, realm_id);
        let Some(role) = store.get_role_by_id(id, realm_id).await?
        else {
            return Ok(false);
        };
        self.register_container(&role.container);
        self.register_role_dependents(&store, &BTreeSet::from([role.id]), realm_id)
            .await?;

        store.remove_role(id, realm_id).await
    }

    // Composite roles, groups mapping any of `removed` and clients or templates carrying them as scope mappings.
    async fn register_role_dependents(
        &self,
        store: &S,
        removed: &BTreeSet<String>,
        realm_id: &str,
    ) -> Result<(), S::Error> {
        if removed.is_empty() {
            return Ok(());
        }
        let refers = |ids: &BTreeSet<String>| !ids.is_disjoint(removed);

        let mut roles = store.get_realm_roles(realm_id).await?;
        for client in store.get_clients(realm_id).await? {
            if refers(&client.scope_mappings) {
                self.register_invalidation(Category::Client, client.id.as_str());
            }
            roles.extend(store.get_client_roles(&client.id, realm_id).await?);
        }
        for composite in roles.into_iter().filter(|r| refers(&r.composites)) {
            self.register_invalidation(Category::Role, composite.id);
        }
        for template in store.get_client_templates(realm_id).await? {
            if refers(&template.scope_mappings) {
                self.register_invalidation(Category::ClientTemplate, template.id);
            }
        }
        for group in store.get_groups(realm_id).await? {
            if refers(&group.role_mappings) {
                self.register_invalidation(Category::Group, group.id);
            }
        }
        Ok(())
    }

    pub async fn update_role<F>(&self, id: &str, realm_id: &str, mutate: F) -> Result<Option<RoleModel>, S::Error>
    where
        F: FnOnce(&mut RoleModel) + Send,
    {
        let store = self.store()?;
        self.register_invalidation(Category::Role, id);
        let Some(mut role) = store.get_role_by_id(id, realm_id).await?
        else {
            return Ok(None);
        };
        // Containers index their roles by name.
        self.register_container(&role.container);
        mutate(&mut role);
        store.update_role(&role).await?;
        Ok(Some(role))
    }

    fn register_container(&self, container: &RoleContainer) {
        match container {
            RoleContainer::Realm(realm) => self.register_invalidation(Category::Realm, realm.as_str()),
            RoleContainer::Client(client) => self.register_invalidation(Category::Client, client.as_str()),
        }
    }

    pub async fn create_group(&self, realm_id: &str, name: &str, parent: Option<&str>) -> Result<GroupModel, S::Error> {
        let group = self.store()?.create_group(realm_id, name, parent).await?;
        self.register_invalidation(Category::Group, group.id.as_str());
        self.register_invalidation(Category::Realm, realm_id);
        if let Some(parent) = parent {
            self.register_invalidation(Category::Group, parent);
        }
        Ok(group)
    }

    /// Removes a group with its whole subtree.
    pub async fn remove_group(&self, id: &str, realm_id: &str) -> Result<bool, S::Error> {
        let store = self.store()?;
        self.register_invalidation(Category::Group, id);
        self.register_invalidation(Category::Realm, realm_id);

        let groups = store.get_groups(realm_id).await?;
        if let Some(parent) = groups.iter().find(|g| g.id == id).and_then(|g| g.parent.as_deref()) {
            self.register_invalidation(Category::Group, parent);
        }

        let mut seen = BTreeSet::from([id.to_string()]);
        let mut queue = VecDeque::from([id.to_string()]);
        while let Some(current) = queue.pop_front() {
            for child in groups.iter().filter(|g| g.parent.as_deref() == Some(current.as_str())) {
                if seen.insert(child.id.clone()) {
                    self.register_invalidation(Category::Group, child.id.as_str());
                    queue.push_back(child.id.clone());
                }
            }
        }

        store.remove_group(id, realm_id).await
    }

    pub async fn update_group<F>(&self, id: &str, realm_id: &str, mutate: F) -> Result<Option<GroupModel>, S::Error>
    where
        F: FnOnce(&mut GroupModel) + Send,
    {
        let store = self.store()?;
        self.register_invalidation(Category::Group, id);
        let Some(mut group) = store.get_group_by_id(id, realm_id).await?
        else {
            return Ok(None);
        };
        let old_parent = group.parent.clone();
        mutate(&mut group);

        if group.parent != old_parent {
            // Moving a group changes both parents' children and possibly the realm's top-level set.
            self.register_invalidation(Category::Realm, realm_id);
            for parent in [&old_parent, &group.parent].into_iter().flatten() {
                self.register_invalidation(Category::Group, parent.as_str());
            }
        }
        store.update_group(&group).await?;
        Ok(Some(group))
    }

    /// Requests a whole-cache clear when this unit of work completes.
    pub fn clear_cache(&self) -> Result<(), S::Error> {
        self.store()?;
        self.registry_mut().request_clear();
        debug!("whole-cache clear requested");
        Ok(())
    }
}

impl<S> Debug for CacheRealmProvider<S>
where
    S: RealmStore,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheRealmProvider")
            .field("cache", self.cache().name())
            .field("active", &self.active())
            .field("store_used", &self.touched())
            .field("pending", &self.registry().len())
            .finish()
    }
}
