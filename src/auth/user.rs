use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::rights::{
    AdministrationRights, ChatRights, CompilerRights, ConfigurationRights, EngineVersionRights,
    InstanceManagerRights, InstanceUserRights, ProcessControlRights, RepositoryRights,
};

/// How a user proves who they are. Exactly one source exists per user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// Locally stored Argon2id password
    Password {
        /// PHC formatted hash (embeds algorithm, parameters and salt)
        hash: String,
        /// Salt used to derive `hash`
        salt: String,
    },
    /// Operating system account, identified by its stable identifier
    SystemIdentity { identifier: String },
}

/// A stored account
#[derive(Debug, Clone)]
pub struct User {
    /// Store assigned identifier, immutable
    pub id: i64,
    /// Display name
    pub name: String,
    /// Uppercased `name`, the uniqueness key
    pub canonical_name: String,
    pub credential: Credential,
    pub administration_rights: AdministrationRights,
    pub instance_manager_rights: InstanceManagerRights,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    /// Id of the creating user, `None` for the bootstrap administrator
    pub created_by: Option<i64>,
    /// Last time the password was replaced; tokens issued earlier are void
    pub last_password_update: Option<DateTime<Utc>>,
}

impl User {
    /// Creates an unsaved user. The store assigns the id on insert.
    pub fn new(name: String, credential: Credential, created_by: Option<i64>) -> Self {
        let canonical_name = canonicalize(&name);
        Self {
            id: 0,
            name,
            canonical_name,
            credential,
            administration_rights: AdministrationRights::NONE,
            instance_manager_rights: InstanceManagerRights::NONE,
            enabled: false,
            created_at: Utc::now(),
            created_by,
            last_password_update: None,
        }
    }

    pub fn system_identifier(&self) -> Option<&str> {
        match &self.credential {
            Credential::SystemIdentity { identifier } => Some(identifier),
            Credential::Password { .. } => None,
        }
    }

    pub fn password_hash(&self) -> Option<&str> {
        match &self.credential {
            Credential::Password { hash, .. } => Some(hash),
            Credential::SystemIdentity { .. } => None,
        }
    }

    pub fn is_system_user(&self) -> bool {
        self.system_identifier().is_some()
    }

    /// Replace the display name, keeping the canonical key in sync
    pub fn set_name(&mut self, name: String) {
        self.canonical_name = canonicalize(&name);
        self.name = name;
    }

    /// API view of this user
    pub fn to_profile(&self, creator: Option<UserSummary>, show_system_identifier: bool) -> UserProfile {
        UserProfile {
            id: self.id,
            name: Some(self.name.clone()),
            administration_rights: Some(self.administration_rights),
            instance_manager_rights: Some(self.instance_manager_rights),
            enabled: Some(self.enabled),
            system_identifier: if show_system_identifier {
                self.system_identifier().map(str::to_string)
            } else {
                None
            },
            created_at: Some(self.created_at),
            created_by: creator,
        }
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            name: self.name.clone(),
        }
    }
}

/// Case-normalized form of a user name
pub fn canonicalize(name: &str) -> String {
    name.to_uppercase()
}

/// A user's access grant to one instance
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceUser {
    pub id: i64,
    pub user_id: i64,
    pub instance_id: i64,
    pub instance_user_rights: InstanceUserRights,
    pub engine_version_rights: EngineVersionRights,
    pub repository_rights: RepositoryRights,
    pub process_control_rights: ProcessControlRights,
    pub compiler_rights: CompilerRights,
    pub chat_rights: ChatRights,
    pub configuration_rights: ConfigurationRights,
}

impl InstanceUser {
    /// Creates an unsaved grant with no rights
    pub fn new(user_id: i64, instance_id: i64) -> Self {
        Self {
            user_id,
            instance_id,
            ..Default::default()
        }
    }
}

/// Reference to another user as shown in API payloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: i64,
    pub name: String,
}

/// User payload returned by the API. Fields the caller may not see are omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub administration_rights: Option<AdministrationRights>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_manager_rights: Option<InstanceManagerRights>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_identifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<UserSummary>,
}

impl UserProfile {
    /// Reduced response exposing nothing but the id
    pub fn id_only(id: i64) -> Self {
        Self {
            id,
            name: None,
            administration_rights: None,
            instance_manager_rights: None,
            enabled: None,
            system_identifier: None,
            created_at: None,
            created_by: None,
        }
    }
}

/// Create/update request payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdate {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub password: Option<String>,
    pub system_identifier: Option<String>,
    pub administration_rights: Option<AdministrationRights>,
    pub instance_manager_rights: Option<InstanceManagerRights>,
    pub enabled: Option<bool>,
}
