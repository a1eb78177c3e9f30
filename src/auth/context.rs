//! Per-request identity and rights snapshot

use crate::auth::system_identity::SystemIdentity;
use crate::auth::user::{InstanceUser, User};
use crate::error::{HostError, Result};
use crate::rights::{self, AdministrationRights, RightsType};

/// Resolved caller of one request.
///
/// Holds the user, the live OS identity handle for system users, and the
/// instance grant when the request is scoped to an instance. The identity
/// handle is released when the context is dropped.
#[derive(Debug)]
pub struct AuthenticationContext {
    user: User,
    system_identity: Option<Box<dyn SystemIdentity>>,
    instance_user: Option<InstanceUser>,
}

impl AuthenticationContext {
    /// Fails when the identity handle and the user's system identifier disagree,
    /// i.e. exactly one of them is present, or when the grant belongs to another user.
    pub fn new(
        system_identity: Option<Box<dyn SystemIdentity>>,
        user: User,
        instance_user: Option<InstanceUser>,
    ) -> Result<Self> {
        match (&system_identity, user.system_identifier()) {
            (Some(_), None) => {
                return Err(HostError::InvalidArgument(format!(
                    "System identity supplied for user {} who has no system identifier",
                    user.id
                )));
            }
            (None, Some(_)) => {
                return Err(HostError::InvalidArgument(format!(
                    "System identity missing for system user {}",
                    user.id
                )));
            }
            _ => {}
        }

        if let Some(grant) = &instance_user {
            if grant.user_id != user.id {
                return Err(HostError::InvalidArgument(format!(
                    "Instance grant {} belongs to user {}, not {}",
                    grant.id, grant.user_id, user.id
                )));
            }
        }

        Ok(Self {
            user,
            system_identity,
            instance_user,
        })
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn system_identity(&self) -> Option<&dyn SystemIdentity> {
        self.system_identity.as_deref()
    }

    pub fn instance_user(&self) -> Option<&InstanceUser> {
        self.instance_user.as_ref()
    }

    /// Effective rights bitmask for a category
    pub fn get_right(&self, rights_type: RightsType) -> u64 {
        rights::get_right(&self.user, self.instance_user.as_ref(), rights_type)
    }

    pub fn administration_rights(&self) -> AdministrationRights {
        AdministrationRights::from_bits(self.get_right(RightsType::Administration))
    }

    /// True if the caller holds every administration bit in `required`
    pub fn has_administration_right(&self, required: AdministrationRights) -> bool {
        self.administration_rights().contains(required)
    }
}
