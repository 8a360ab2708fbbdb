use std::collections::{BTreeMap, BTreeSet};

use crate::model::{ClientModel, ClientTemplateModel, GroupModel, RealmModel, RoleModel};

/// Snapshot of a realm together with the identifier indexes of everything it owns.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedRealm {
    realm:            RealmModel,
    // name -> id
    realm_roles:      BTreeMap<String, String>,
    // client_id -> id
    clients:          BTreeMap<String, String>,
    client_templates: BTreeSet<String>,
    groups:           BTreeSet<String>,
    top_groups:       BTreeSet<String>,
}

impl CachedRealm {
    pub fn new(
        realm: &RealmModel,
        roles: &[RoleModel],
        clients: &[ClientModel],
        templates: &[ClientTemplateModel],
        groups: &[GroupModel],
    ) -> Self {
        Self {
            realm:            realm.clone(),
            realm_roles:      roles
                .iter()
                .filter(|r| r.container.id() == realm.id)
                .map(|r| (r.name.clone(), r.id.clone()))
                .collect(),
            clients:          clients.iter().map(|c| (c.client_id.clone(), c.id.clone())).collect(),
            client_templates: templates.iter().map(|t| t.id.clone()).collect(),
            groups:           groups.iter().map(|g| g.id.clone()).collect(),
            top_groups:       groups
                .iter()
                .filter(|g| g.parent.is_none())
                .map(|g| g.id.clone())
                .collect(),
        }
    }

    pub fn id(&self) -> &str {
        &self.realm.id
    }

    pub fn name(&self) -> &str {
        &self.realm.name
    }

    pub fn is_enabled(&self) -> bool {
        self.realm.enabled
    }

    /// Scalar settings as they were read from the backing store.
    pub fn model(&self) -> &RealmModel {
        &self.realm
    }

    pub fn realm_roles(&self) -> &BTreeMap<String, String> {
        &self.realm_roles
    }

    pub fn role_id(&self, name: &str) -> Option<&str> {
        self.realm_roles.get(name).map(String::as_str)
    }

    pub fn clients(&self) -> &BTreeMap<String, String> {
        &self.clients
    }

    pub fn client_id_of(&self, client_id: &str) -> Option<&str> {
        self.clients.get(client_id).map(String::as_str)
    }

    pub fn client_templates(&self) -> &BTreeSet<String> {
        &self.client_templates
    }

    pub fn groups(&self) -> &BTreeSet<String> {
        &self.groups
    }

    pub fn top_level_groups(&self) -> &BTreeSet<String> {
        &self.top_groups
    }

    pub fn default_groups(&self) -> &[String] {
        &self.realm.default_groups
    }

    pub fn default_roles(&self) -> &[String] {
        &self.realm.default_roles
    }

    pub fn master_admin_client(&self) -> Option<&str> {
        self.realm.master_admin_client.as_deref()
    }
}
