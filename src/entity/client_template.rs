use crate::model::ClientTemplateModel;

#[derive(Debug, Clone, PartialEq)]
pub struct CachedClientTemplate {
    template: ClientTemplateModel,
}

impl CachedClientTemplate {
    pub fn new(template: &ClientTemplateModel) -> Self {
        Self {
            template: template.clone(),
        }
    }

    pub fn id(&self) -> &str {
        &self.template.id
    }

    pub fn realm_id(&self) -> &str {
        &self.template.realm_id
    }

    pub fn name(&self) -> &str {
        &self.template.name
    }

    pub fn model(&self) -> &ClientTemplateModel {
        &self.template
    }
}
