use std::collections::BTreeMap;

use crate::model::{ClientModel, RoleModel};

#[derive(Debug, Clone, PartialEq)]
pub struct CachedClient {
    client: ClientModel,
    // name -> id
    roles:  BTreeMap<String, String>,
}

impl CachedClient {
    pub fn new(client: &ClientModel, roles: &[RoleModel]) -> Self {
        Self {
            client: client.clone(),
            roles:  roles
                .iter()
                .filter(|r| r.container.id() == client.id)
                .map(|r| (r.name.clone(), r.id.clone()))
                .collect(),
        }
    }

    pub fn id(&self) -> &str {
        &self.client.id
    }

    pub fn realm_id(&self) -> &str {
        &self.client.realm_id
    }

    pub fn client_id(&self) -> &str {
        &self.client.client_id
    }

    pub fn model(&self) -> &ClientModel {
        &self.client
    }

    pub fn roles(&self) -> &BTreeMap<String, String> {
        &self.roles
    }

    pub fn role_id(&self, name: &str) -> Option<&str> {
        self.roles.get(name).map(String::as_str)
    }

    pub fn client_template(&self) -> Option<&str> {
        self.client.client_template.as_deref()
    }
}
