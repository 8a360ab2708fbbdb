use std::collections::BTreeSet;

use crate::model::{RoleContainer, RoleModel};

/// Realm-scoped and client-scoped roles share one snapshot shape; the owner is a tag, not a subtype.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleKind {
    Realm,
    Client { client: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CachedRole {
    pub id:                   String,
    pub realm_id:             String,
    pub name:                 String,
    pub description:          Option<String>,
    pub scope_param_required: bool,
    pub composites:           BTreeSet<String>,
    pub kind:                 RoleKind,
}

impl CachedRole {
    pub fn new(role: &RoleModel) -> Self {
        Self {
            id:                   role.id.clone(),
            realm_id:             role.realm_id.clone(),
            name:                 role.name.clone(),
            description:          role.description.clone(),
            scope_param_required: role.scope_param_required,
            composites:           role.composites.clone(),
            kind:                 match &role.container {
                RoleContainer::Realm(_) => RoleKind::Realm,
                RoleContainer::Client(client) => RoleKind::Client { client: client.clone() },
            },
        }
    }

    pub fn is_client_role(&self) -> bool {
        matches!(self.kind, RoleKind::Client { .. })
    }

    pub fn is_composite(&self) -> bool {
        !self.composites.is_empty()
    }

    /// Identifier of the owning realm or client.
    pub fn container_id(&self) -> &str {
        match &self.kind {
            RoleKind::Realm => &self.realm_id,
            RoleKind::Client { client } => client,
        }
    }

    pub fn container(&self) -> RoleContainer {
        match &self.kind {
            RoleKind::Realm => RoleContainer::Realm(self.realm_id.clone()),
            RoleKind::Client { client } => RoleContainer::Client(client.clone()),
        }
    }
}
