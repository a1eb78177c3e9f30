use chrono::Utc;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::auth::context::AuthenticationContext;
use crate::auth::crypto::CryptographySuite;
use crate::auth::system_identity::SystemIdentityFactory;
use crate::auth::user::{canonicalize, Credential, User, UserProfile, UserSummary, UserUpdate};
use crate::config::GeneralConfiguration;
use crate::constants::{ADMIN_NAME, DEFAULT_ADMIN_PASSWORD};
use crate::error::{HostError, Result};
use crate::rights::{AdministrationRights, InstanceManagerRights};
use crate::security_logger::{log_security_event, SecurityEvent};
use crate::storage::{CredentialStore, CredentialWrite};

/// Create, update and read operations on user accounts
pub struct UserLifecycle {
    store: Arc<dyn CredentialStore>,
    crypto: Arc<CryptographySuite>,
    system_identities: Arc<dyn SystemIdentityFactory>,
    minimum_password_length: usize,
}

impl UserLifecycle {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        crypto: Arc<CryptographySuite>,
        system_identities: Arc<dyn SystemIdentityFactory>,
        config: &GeneralConfiguration,
    ) -> Self {
        Self {
            store,
            crypto,
            system_identities,
            minimum_password_length: config.minimum_password_length,
        }
    }

    /// Create a user from `model`.
    ///
    /// The caller needs `WRITE_USERS`. The full profile is returned only when
    /// the caller may also read users.
    pub async fn create(
        &self,
        ctx: &AuthenticationContext,
        model: UserUpdate,
        cancel: &CancellationToken,
    ) -> Result<UserProfile> {
        require(ctx, AdministrationRights::WRITE_USERS, "create user").await?;

        if model.password.is_some() == model.system_identifier.is_some() {
            return Err(HostError::ValidationError(
                "Exactly one of password or systemIdentifier must be set!".to_string(),
            ));
        }

        let name = model
            .name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string);

        if name.is_some() == model.system_identifier.is_some() {
            return Err(HostError::ValidationError(
                "Exactly one of name or systemIdentifier must be set!".to_string(),
            ));
        }

        if name.as_deref().is_some_and(|name| name.contains(':')) {
            return Err(colon_error());
        }

        let caller_id = ctx.user().id;
        let mut user = match (model.system_identifier.as_deref(), model.password.as_deref(), name) {
            (Some(system_identifier), _, _) => {
                let identity = self
                    .system_identities
                    .create_system_identity(system_identifier, cancel)
                    .await?
                    .ok_or(HostError::Gone)?;

                // The OS reported values replace whatever the caller sent
                User::new(
                    identity.username().to_string(),
                    Credential::SystemIdentity {
                        identifier: identity.uid().to_string(),
                    },
                    Some(caller_id),
                )
            }
            (None, Some(password), Some(name)) => {
                self.check_password_length(password)?;
                let mut user = User::new(name, empty_password(), Some(caller_id));
                self.crypto.set_user_password(&mut user, password, true)?;
                user
            }
            _ => {
                return Err(HostError::ValidationError(
                    "A password user requires a name!".to_string(),
                ))
            }
        };

        user.administration_rights = model.administration_rights.unwrap_or_default();
        user.instance_manager_rights = model.instance_manager_rights.unwrap_or_default();
        user.enabled = model.enabled.unwrap_or(false);

        let user = self.store.create_user(user, cancel).await?;
        log::info!("User {} ({}) created by user {}", user.id, user.name, caller_id);
        log_security_event(SecurityEvent::UserCreated {
            user_id: user.id,
            created_by: caller_id,
        })
        .await;

        if ctx.has_administration_right(AdministrationRights::READ_USERS) {
            Ok(user.to_profile(Some(ctx.user().summary()), true))
        } else {
            Ok(UserProfile::id_only(user.id))
        }
    }

    /// Update a user.
    ///
    /// Callers with `WRITE_USERS` may edit any user. Callers holding only
    /// `EDIT_OWN_PASSWORD` may change their own password and nothing else.
    pub async fn update(
        &self,
        ctx: &AuthenticationContext,
        model: UserUpdate,
        cancel: &CancellationToken,
    ) -> Result<UserProfile> {
        let can_write = ctx.has_administration_right(AdministrationRights::WRITE_USERS);
        if !can_write && !ctx.has_administration_right(AdministrationRights::EDIT_OWN_PASSWORD) {
            return Err(deny(ctx, "update user").await);
        }
        let password_edit_only = !can_write;
        let caller_id = ctx.user().id;

        let target_id = if password_edit_only {
            caller_id
        } else {
            model
                .id
                .ok_or_else(|| HostError::ValidationError("Missing user id!".to_string()))?
        };
        let mut user = self
            .store
            .get_user(target_id, cancel)
            .await?
            .ok_or(HostError::NotFound)?;

        if password_edit_only
            && (model.id.is_some_and(|id| id != caller_id)
                || model.administration_rights.is_some()
                || model.instance_manager_rights.is_some()
                || model.enabled.is_some()
                || model.name.is_some())
        {
            return Err(deny(ctx, "edit fields other than own password").await);
        }

        if let Some(system_identifier) = model.system_identifier.as_deref() {
            if user.system_identifier() != Some(system_identifier) {
                return Err(HostError::ValidationError(
                    "Cannot change a user's system identifier!".to_string(),
                ));
            }
        }

        let edits_account = model.name.is_some()
            || model.administration_rights.is_some()
            || model.instance_manager_rights.is_some()
            || model.enabled.is_some();

        if let Some(password) = model.password.as_deref() {
            self.check_password_length(password)?;
            self.crypto.set_user_password(&mut user, password, true)?;
        }

        let user = if edits_account {
            if let Some(name) = model.name {
                if canonicalize(&name) != user.canonical_name {
                    return Err(HostError::ValidationError(
                        "Can only change capitalization of a user's name!".to_string(),
                    ));
                }
                if name.contains(':') {
                    return Err(colon_error());
                }
                user.set_name(name);
            }

            if let Some(rights) = model.administration_rights {
                user.administration_rights = rights;
            }
            if let Some(rights) = model.instance_manager_rights {
                user.instance_manager_rights = rights;
            }
            if let Some(enabled) = model.enabled {
                user.enabled = enabled;
            }

            self.store.update_user(user.clone(), cancel).await?;
            user
        } else if model.password.is_some() {
            // A password change leaves the rest of the stored record untouched
            let write = CredentialWrite::PasswordChange {
                credential: user.credential,
                changed_at: user.last_password_update.unwrap_or_else(Utc::now),
            };
            self.store.write_credential(user.id, write, cancel).await?
        } else {
            user
        };

        log::info!("User {} updated by user {}", user.id, caller_id);
        log_security_event(SecurityEvent::UserUpdated {
            user_id: user.id,
            updated_by: caller_id,
        })
        .await;

        if user.id == caller_id || ctx.has_administration_right(AdministrationRights::READ_USERS) {
            let creator = self.creator_of(&user, cancel).await?;
            Ok(user.to_profile(creator, true))
        } else {
            Ok(UserProfile::id_only(user.id))
        }
    }

    /// The caller's own profile
    pub async fn read(&self, ctx: &AuthenticationContext, cancel: &CancellationToken) -> Result<UserProfile> {
        let creator = self.creator_of(ctx.user(), cancel).await?;
        Ok(ctx.user().to_profile(creator, true))
    }

    /// Profile of user `id`. Reading oneself needs no rights.
    pub async fn get_by_id(
        &self,
        ctx: &AuthenticationContext,
        id: i64,
        cancel: &CancellationToken,
    ) -> Result<UserProfile> {
        if id == ctx.user().id {
            return self.read(ctx, cancel).await;
        }
        require(ctx, AdministrationRights::READ_USERS, "read user").await?;

        let user = self.store.get_user(id, cancel).await?.ok_or(HostError::NotFound)?;
        let creator = self.creator_of(&user, cancel).await?;
        Ok(user.to_profile(creator, true))
    }

    /// Every user ordered by id
    pub async fn list(&self, ctx: &AuthenticationContext, cancel: &CancellationToken) -> Result<Vec<UserProfile>> {
        require(ctx, AdministrationRights::READ_USERS, "list users").await?;

        let users = self.store.list_users(cancel).await?;
        let profiles = users
            .iter()
            .map(|user| {
                let creator = user.created_by.and_then(|creator_id| {
                    users
                        .iter()
                        .find(|candidate| candidate.id == creator_id)
                        .map(User::summary)
                });
                user.to_profile(creator, true)
            })
            .collect();
        Ok(profiles)
    }

    /// Insert the default administrator into an empty store.
    ///
    /// Returns true when the account was created.
    pub async fn ensure_admin_user(&self, cancel: &CancellationToken) -> Result<bool> {
        if self.store.count_users(cancel).await? > 0 {
            return Ok(false);
        }

        let mut admin = User::new(ADMIN_NAME.to_string(), empty_password(), None);
        self.crypto.set_user_password(&mut admin, DEFAULT_ADMIN_PASSWORD, false)?;
        admin.administration_rights = AdministrationRights::all();
        admin.instance_manager_rights = InstanceManagerRights::all();
        admin.enabled = true;

        let admin = self.store.create_user(admin, cancel).await?;
        log::warn!(
            "Created default administrator '{}' (id {}); change its password",
            admin.name,
            admin.id
        );
        Ok(true)
    }

    fn check_password_length(&self, password: &str) -> Result<()> {
        if password.chars().count() < self.minimum_password_length {
            return Err(HostError::ValidationError(format!(
                "Password must be at least {} characters long!",
                self.minimum_password_length
            )));
        }
        Ok(())
    }

    async fn creator_of(&self, user: &User, cancel: &CancellationToken) -> Result<Option<UserSummary>> {
        match user.created_by {
            Some(creator_id) => Ok(self
                .store
                .get_user(creator_id, cancel)
                .await?
                .map(|creator| creator.summary())),
            None => Ok(None),
        }
    }
}

/// Placeholder replaced by `set_user_password` before the user is stored
fn empty_password() -> Credential {
    Credential::Password {
        hash: String::new(),
        salt: String::new(),
    }
}

fn colon_error() -> HostError {
    HostError::ValidationError("Names cannot contain colons!".to_string())
}

async fn require(ctx: &AuthenticationContext, right: AdministrationRights, action: &str) -> Result<()> {
    if ctx.has_administration_right(right) {
        Ok(())
    } else {
        Err(deny(ctx, action).await)
    }
}

async fn deny(ctx: &AuthenticationContext, action: &str) -> HostError {
    log_security_event(SecurityEvent::PermissionDenied {
        user_id: ctx.user().id,
        action: action.to_string(),
    })
    .await;
    HostError::Forbidden
}
