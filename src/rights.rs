//! Rights categories, their bitmask types, and effective rights resolution
//!
//! Global categories live on the [`User`]; every other category is scoped to
//! one instance and lives on the [`InstanceUser`] bound to the request.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};
use std::str::FromStr;

use crate::auth::user::{InstanceUser, User};
use crate::error::HostError;

macro_rules! rights_flags {
    (
        $(#[$meta:meta])*
        $name:ident { $($flag:ident = $value:expr),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            pub const NONE: Self = Self(0);
            $(pub const $flag: Self = Self($value);)+

            /// Every defined bit
            pub const fn all() -> Self {
                Self(0 $(| $value)+)
            }

            pub const fn from_bits(bits: u64) -> Self {
                Self(bits)
            }

            pub const fn bits(self) -> u64 {
                self.0
            }

            /// True if every bit of `other` is set
            pub const fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            pub const fn is_empty(self) -> bool {
                self.0 == 0
            }
        }

        impl BitOr for $name {
            type Output = Self;

            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }

        impl BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: Self) {
                self.0 |= rhs.0;
            }
        }

        impl BitAnd for $name {
            type Output = Self;

            fn bitand(self, rhs: Self) -> Self {
                Self(self.0 & rhs.0)
            }
        }

        impl From<$name> for u64 {
            fn from(rights: $name) -> u64 {
                rights.0
            }
        }
    };
}

rights_flags! {
    /// Host-wide administration rights
    AdministrationRights {
        WRITE_USERS = 1 << 0,
        RESTART_HOST = 1 << 1,
        CHANGE_VERSION = 1 << 2,
        EDIT_OWN_PASSWORD = 1 << 3,
        READ_USERS = 1 << 4,
    }
}

rights_flags! {
    /// Rights over the set of managed instances
    InstanceManagerRights {
        READ = 1 << 0,
        CREATE = 1 << 1,
        RENAME = 1 << 2,
        RELOCATE = 1 << 3,
        SET_ONLINE = 1 << 4,
        DELETE = 1 << 5,
        LIST = 1 << 6,
        SET_CONFIGURATION = 1 << 7,
        SET_AUTO_UPDATE = 1 << 8,
        SET_CHAT_BOT_LIMIT = 1 << 9,
    }
}

rights_flags! {
    /// Rights over an instance's access grants
    InstanceUserRights {
        READ_USERS = 1 << 0,
        WRITE_USERS = 1 << 1,
        CREATE_USERS = 1 << 2,
    }
}

rights_flags! {
    /// Rights over an instance's engine version
    EngineVersionRights {
        READ_ACTIVE = 1 << 0,
        LIST_INSTALLED = 1 << 1,
        CHANGE_VERSION = 1 << 2,
        CANCEL_INSTALL = 1 << 3,
    }
}

rights_flags! {
    /// Rights over an instance's repository
    RepositoryRights {
        CANCEL_PENDING_CHANGES = 1 << 0,
        SET_ORIGIN = 1 << 1,
        SET_SHA = 1 << 2,
        MERGE_PULL_REQUEST = 1 << 3,
        UPDATE_BRANCH = 1 << 4,
        CHANGE_COMMITTER = 1 << 5,
        CHANGE_TEST_MERGE_COMMITS = 1 << 6,
        CHANGE_CREDENTIALS = 1 << 7,
        SET_REFERENCE = 1 << 8,
        READ = 1 << 9,
        CHANGE_AUTO_UPDATE_SETTINGS = 1 << 10,
        DELETE = 1 << 11,
        CANCEL_CLONE = 1 << 12,
    }
}

rights_flags! {
    /// Rights over an instance's engine process
    ProcessControlRights {
        READ_REVISION = 1 << 0,
        SET_PORT = 1 << 1,
        SET_AUTO_START = 1 << 2,
        SET_SECURITY = 1 << 3,
        READ_METADATA = 1 << 4,
        SET_WEB_CLIENT = 1 << 5,
        SOFT_RESTART = 1 << 6,
        SOFT_SHUTDOWN = 1 << 7,
        RESTART = 1 << 8,
        SHUTDOWN = 1 << 9,
        START = 1 << 10,
        SET_STARTUP_TIMEOUT = 1 << 11,
    }
}

rights_flags! {
    /// Rights over an instance's compile jobs
    CompilerRights {
        READ = 1 << 0,
        COMPILE = 1 << 1,
        CANCEL_COMPILE = 1 << 2,
        SET_DME = 1 << 3,
        SET_API_VALIDATION_PORT = 1 << 4,
    }
}

rights_flags! {
    /// Rights over an instance's chat bots
    ChatRights {
        WRITE_ENABLED = 1 << 0,
        WRITE_PROVIDER = 1 << 1,
        WRITE_CHANNELS = 1 << 2,
        WRITE_CONNECTION_STRING = 1 << 3,
        READ_CONNECTION_STRING = 1 << 4,
        READ = 1 << 5,
        CREATE = 1 << 6,
        DELETE = 1 << 7,
        WRITE_NAME = 1 << 8,
    }
}

rights_flags! {
    /// Rights over an instance's configuration files
    ConfigurationRights {
        READ = 1 << 0,
        WRITE = 1 << 1,
        LIST = 1 << 2,
    }
}

/// Closed set of rights categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum RightsType {
    Administration = 0,
    InstanceManager = 1,
    InstanceUser = 2,
    EngineVersion = 3,
    Repository = 4,
    ProcessControl = 5,
    Compiler = 6,
    Chat = 7,
    Configuration = 8,
}

impl RightsType {
    pub const ALL: [RightsType; 9] = [
        RightsType::Administration,
        RightsType::InstanceManager,
        RightsType::InstanceUser,
        RightsType::EngineVersion,
        RightsType::Repository,
        RightsType::ProcessControl,
        RightsType::Compiler,
        RightsType::Chat,
        RightsType::Configuration,
    ];

    /// Whether the category is read from the user rather than an instance grant
    pub const fn is_global(self) -> bool {
        matches!(self, RightsType::Administration | RightsType::InstanceManager)
    }

    pub const fn name(self) -> &'static str {
        match self {
            RightsType::Administration => "Administration",
            RightsType::InstanceManager => "InstanceManager",
            RightsType::InstanceUser => "InstanceUser",
            RightsType::EngineVersion => "EngineVersion",
            RightsType::Repository => "Repository",
            RightsType::ProcessControl => "ProcessControl",
            RightsType::Compiler => "Compiler",
            RightsType::Chat => "Chat",
            RightsType::Configuration => "Configuration",
        }
    }
}

impl fmt::Display for RightsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u8> for RightsType {
    type Error = HostError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        RightsType::ALL
            .get(value as usize)
            .copied()
            .ok_or_else(|| HostError::InvalidArgument(format!("Unknown rights type {}", value)))
    }
}

impl FromStr for RightsType {
    type Err = HostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RightsType::ALL
            .iter()
            .copied()
            .find(|rights_type| rights_type.name() == s)
            .ok_or_else(|| HostError::InvalidArgument(format!("Unknown rights type '{}'", s)))
    }
}

/// Effective rights of a request for one category.
///
/// Instance categories resolve to zero when no instance grant is bound. The
/// `enabled` flag is not consulted; callers reject disabled users beforehand.
pub fn get_right(user: &User, instance_user: Option<&InstanceUser>, rights_type: RightsType) -> u64 {
    match rights_type {
        RightsType::Administration => user.administration_rights.bits(),
        RightsType::InstanceManager => user.instance_manager_rights.bits(),
        _ => instance_user
            .map(|grant| instance_right(grant, rights_type))
            .unwrap_or(0),
    }
}

fn instance_right(grant: &InstanceUser, rights_type: RightsType) -> u64 {
    match rights_type {
        RightsType::InstanceUser => grant.instance_user_rights.bits(),
        RightsType::EngineVersion => grant.engine_version_rights.bits(),
        RightsType::Repository => grant.repository_rights.bits(),
        RightsType::ProcessControl => grant.process_control_rights.bits(),
        RightsType::Compiler => grant.compiler_rights.bits(),
        RightsType::Chat => grant.chat_rights.bits(),
        RightsType::Configuration => grant.configuration_rights.bits(),
        RightsType::Administration | RightsType::InstanceManager => {
            unreachable!("{} is a global rights type", rights_type)
        }
    }
}
