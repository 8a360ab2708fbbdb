use std::collections::BTreeSet;

use crate::model::GroupModel;

#[derive(Debug, Clone, PartialEq)]
pub struct CachedGroup {
    group: GroupModel,
}

impl CachedGroup {
    pub fn new(group: &GroupModel) -> Self {
        Self { group: group.clone() }
    }

    pub fn id(&self) -> &str {
        &self.group.id
    }

    pub fn realm_id(&self) -> &str {
        &self.group.realm_id
    }

    pub fn name(&self) -> &str {
        &self.group.name
    }

    pub fn parent(&self) -> Option<&str> {
        self.group.parent.as_deref()
    }

    pub fn sub_groups(&self) -> &BTreeSet<String> {
        &self.group.sub_groups
    }

    pub fn role_mappings(&self) -> &BTreeSet<String> {
        &self.group.role_mappings
    }

    pub fn model(&self) -> &GroupModel {
        &self.group
    }
}
