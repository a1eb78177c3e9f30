//! Abstract storage interface for user and instance grant records
//!
//! Every method observes the request's cancellation token and fails with
//! [`HostError::Cancelled`](crate::error::HostError::Cancelled) once it fires.
//! Each write method is a single commit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::auth::user::{Credential, InstanceUser, User};
use crate::error::Result;

/// A change to a user's credential that leaves every other field alone
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialWrite {
    /// New password chosen by or for the user; stamps `last_password_update`
    PasswordChange {
        credential: Credential,
        changed_at: DateTime<Utc>,
    },
    /// Stronger hash of the unchanged password. Skipped when the stored
    /// credential is no longer `previous`.
    Rehash {
        previous: Credential,
        credential: Credential,
    },
}

/// Credential store interface
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Get user by ID
    async fn get_user(&self, user_id: i64, cancel: &CancellationToken) -> Result<Option<User>>;

    /// Get user by canonical (uppercased) name
    async fn get_user_by_canonical_name(
        &self,
        canonical_name: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<User>>;

    /// All users ordered by id
    async fn list_users(&self, cancel: &CancellationToken) -> Result<Vec<User>>;

    /// Number of stored users
    async fn count_users(&self, cancel: &CancellationToken) -> Result<usize>;

    /// Insert a new user, assigning its id.
    ///
    /// Fails with a conflict when the canonical name or system identifier is taken.
    async fn create_user(&self, user: User, cancel: &CancellationToken) -> Result<User>;

    /// Replace a stored user. Fails with not found for unknown ids.
    async fn update_user(&self, user: User, cancel: &CancellationToken) -> Result<()>;

    /// Apply a credential change under the store lock, returning the stored user
    /// as it is after the write. Fails with not found for unknown ids.
    async fn write_credential(
        &self,
        user_id: i64,
        write: CredentialWrite,
        cancel: &CancellationToken,
    ) -> Result<User>;

    /// Delete a user and every instance grant referencing it
    async fn delete_user(&self, user_id: i64, cancel: &CancellationToken) -> Result<()>;

    /// Get the grant of a user on an instance
    async fn get_instance_user(
        &self,
        user_id: i64,
        instance_id: i64,
        cancel: &CancellationToken,
    ) -> Result<Option<InstanceUser>>;

    /// All grants on an instance
    async fn get_instance_users(
        &self,
        instance_id: i64,
        cancel: &CancellationToken,
    ) -> Result<Vec<InstanceUser>>;

    /// Create a grant, assigning its id. One grant per (user, instance).
    async fn grant_instance_user(
        &self,
        instance_user: InstanceUser,
        cancel: &CancellationToken,
    ) -> Result<InstanceUser>;

    /// Replace the rights of an existing grant
    async fn update_instance_user(
        &self,
        instance_user: InstanceUser,
        cancel: &CancellationToken,
    ) -> Result<()>;

    /// Remove a grant
    async fn revoke_instance_user(
        &self,
        user_id: i64,
        instance_id: i64,
        cancel: &CancellationToken,
    ) -> Result<()>;

    /// Remove every grant on an instance that is being deleted; returns the count
    async fn delete_instance(&self, instance_id: i64, cancel: &CancellationToken) -> Result<usize>;
}
