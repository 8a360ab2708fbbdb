//! Entity shapes exchanged with the backing store.
//!
//! These are owned, mutable values: the store hands them out and accepts them back on update. References to other
//! entities are identifiers only.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SslRequired {
    All,
    #[default]
    External,
    None,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RealmModel {
    pub id:                             String,
    pub name:                           String,
    pub display_name:                   Option<String>,
    pub display_name_html:              Option<String>,
    pub enabled:                        bool,
    pub ssl_required:                   SslRequired,
    pub registration_allowed:           bool,
    pub registration_email_as_username: bool,
    pub remember_me:                    bool,
    pub verify_email:                   bool,
    pub reset_password_allowed:         bool,
    pub edit_username_allowed:          bool,
    pub brute_force_protected:          bool,
    pub max_failure_wait_seconds:       u32,
    pub failure_factor:                 u32,
    pub revoke_refresh_token:           bool,
    pub sso_session_idle_timeout:       u32,
    pub sso_session_max_lifespan:       u32,
    pub access_token_lifespan:          u32,
    pub access_code_lifespan:           u32,
    pub not_before:                     i64,
    pub login_theme:                    Option<String>,
    pub account_theme:                  Option<String>,
    pub admin_theme:                    Option<String>,
    pub email_theme:                    Option<String>,
    /// Internal id of the client administering this realm from the master realm.
    pub master_admin_client:            Option<String>,
    /// Names of realm roles granted to every new user.
    pub default_roles:                  Vec<String>,
    pub default_groups:                 Vec<String>,
    pub events_enabled:                 bool,
    pub events_expiration:              i64,
    pub events_listeners:               BTreeSet<String>,
    pub internationalization_enabled:   bool,
    pub supported_locales:              BTreeSet<String>,
    pub default_locale:                 Option<String>,
    pub smtp_config:                    BTreeMap<String, String>,
    pub browser_security_headers:       BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClientModel {
    pub id:                  String,
    pub realm_id:            String,
    /// Human-facing alias, unique within the realm.
    pub client_id:           String,
    pub name:                Option<String>,
    pub description:         Option<String>,
    pub enabled:             bool,
    pub public_client:       bool,
    pub bearer_only:         bool,
    pub consent_required:    bool,
    pub full_scope_allowed:  bool,
    pub protocol:            Option<String>,
    pub secret:              Option<String>,
    pub root_url:            Option<String>,
    pub base_url:            Option<String>,
    pub redirect_uris:       BTreeSet<String>,
    pub web_origins:         BTreeSet<String>,
    pub not_before:          i64,
    pub client_template:     Option<String>,
    /// Names of this client's roles granted to every new user.
    pub default_roles:       Vec<String>,
    pub scope_mappings:      BTreeSet<String>,
    pub attributes:          BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClientTemplateModel {
    pub id:                 String,
    pub realm_id:           String,
    pub name:               String,
    pub description:        Option<String>,
    pub protocol:           Option<String>,
    pub full_scope_allowed: bool,
    pub scope_mappings:     BTreeSet<String>,
    pub attributes:         BTreeMap<String, String>,
}

/// Who owns a role.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum RoleContainer {
    Realm(String),
    Client(String),
}

impl RoleContainer {
    pub fn id(&self) -> &str {
        match self {
            Self::Realm(id) | Self::Client(id) => id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleModel {
    pub id:                   String,
    pub realm_id:             String,
    pub name:                 String,
    pub description:          Option<String>,
    pub scope_param_required: bool,
    pub container:            RoleContainer,
    pub composites:           BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GroupModel {
    pub id:            String,
    pub realm_id:      String,
    pub name:          String,
    pub parent:        Option<String>,
    /// Maintained by the store from the `parent` links of other groups.
    pub sub_groups:    BTreeSet<String>,
    pub role_mappings: BTreeSet<String>,
    pub attributes:    BTreeMap<String, Vec<String>>,
}
