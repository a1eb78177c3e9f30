//! In-memory credential store for development and testing
//!
//! Keeps all records in memory behind a single lock so each write is atomic
//! with respect to its uniqueness checks.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use super::traits::{CredentialStore, CredentialWrite};
use crate::auth::user::{InstanceUser, User};
use crate::error::{HostError, Result};

#[derive(Default)]
struct Tables {
    users: BTreeMap<i64, User>,
    canonical_names: HashMap<String, i64>,
    system_identifiers: HashMap<String, i64>,
    instance_users: BTreeMap<(i64, i64), InstanceUser>,
    next_user_id: i64,
    next_instance_user_id: i64,
}

impl Tables {
    fn allocate_user_id(&mut self) -> i64 {
        self.next_user_id += 1;
        self.next_user_id
    }

    fn allocate_instance_user_id(&mut self) -> i64 {
        self.next_instance_user_id += 1;
        self.next_instance_user_id
    }

    fn check_unique(&self, user: &User) -> Result<()> {
        if let Some(&owner) = self.canonical_names.get(&user.canonical_name) {
            if owner != user.id {
                return Err(HostError::Conflict(format!(
                    "A user named '{}' already exists!",
                    user.name
                )));
            }
        }
        if let Some(identifier) = user.system_identifier() {
            if let Some(&owner) = self.system_identifiers.get(identifier) {
                if owner != user.id {
                    return Err(HostError::Conflict(
                        "A user with that system identifier already exists!".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    fn index(&mut self, user: &User) {
        self.canonical_names.insert(user.canonical_name.clone(), user.id);
        if let Some(identifier) = user.system_identifier() {
            self.system_identifiers.insert(identifier.to_string(), user.id);
        }
    }

    fn unindex(&mut self, user: &User) {
        self.canonical_names.remove(&user.canonical_name);
        if let Some(identifier) = user.system_identifier() {
            self.system_identifiers.remove(identifier);
        }
    }
}

/// In-memory credential store
#[derive(Default)]
pub struct MemoryCredentialStore {
    tables: RwLock<Tables>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Run a store operation unless the request is cancelled first
async fn cancellable<T>(cancel: &CancellationToken, operation: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(HostError::Cancelled),
        result = operation => result,
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get_user(&self, user_id: i64, cancel: &CancellationToken) -> Result<Option<User>> {
        cancellable(cancel, async {
            Ok(self.tables.read().await.users.get(&user_id).cloned())
        })
        .await
    }

    async fn get_user_by_canonical_name(
        &self,
        canonical_name: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<User>> {
        cancellable(cancel, async {
            let tables = self.tables.read().await;
            Ok(tables
                .canonical_names
                .get(canonical_name)
                .and_then(|id| tables.users.get(id))
                .cloned())
        })
        .await
    }

    async fn list_users(&self, cancel: &CancellationToken) -> Result<Vec<User>> {
        cancellable(cancel, async {
            Ok(self.tables.read().await.users.values().cloned().collect())
        })
        .await
    }

    async fn count_users(&self, cancel: &CancellationToken) -> Result<usize> {
        cancellable(cancel, async { Ok(self.tables.read().await.users.len()) }).await
    }

    async fn create_user(&self, mut user: User, cancel: &CancellationToken) -> Result<User> {
        cancellable(cancel, async {
            let mut tables = self.tables.write().await;
            user.id = 0;
            tables.check_unique(&user)?;

            user.id = tables.allocate_user_id();
            tables.index(&user);
            tables.users.insert(user.id, user.clone());
            log::debug!("Stored user {} ({})", user.id, user.canonical_name);
            Ok(user)
        })
        .await
    }

    async fn update_user(&self, user: User, cancel: &CancellationToken) -> Result<()> {
        cancellable(cancel, async {
            let mut tables = self.tables.write().await;
            let previous = tables.users.get(&user.id).cloned().ok_or(HostError::NotFound)?;
            tables.check_unique(&user)?;

            tables.unindex(&previous);
            tables.index(&user);
            tables.users.insert(user.id, user);
            Ok(())
        })
        .await
    }

    async fn write_credential(
        &self,
        user_id: i64,
        write: CredentialWrite,
        cancel: &CancellationToken,
    ) -> Result<User> {
        cancellable(cancel, async {
            let mut tables = self.tables.write().await;
            let user = tables.users.get_mut(&user_id).ok_or(HostError::NotFound)?;
            match write {
                CredentialWrite::PasswordChange { credential, changed_at } => {
                    user.credential = credential;
                    user.last_password_update = Some(changed_at);
                }
                CredentialWrite::Rehash { previous, credential } => {
                    if user.credential == previous {
                        user.credential = credential;
                    } else {
                        log::debug!("Skipped rehash of user {}: credential changed meanwhile", user_id);
                    }
                }
            }
            Ok(user.clone())
        })
        .await
    }

    async fn delete_user(&self, user_id: i64, cancel: &CancellationToken) -> Result<()> {
        cancellable(cancel, async {
            let mut tables = self.tables.write().await;
            let user = tables.users.remove(&user_id).ok_or(HostError::NotFound)?;
            tables.unindex(&user);
            tables.instance_users.retain(|(owner, _), _| *owner != user_id);
            // Creator references are weak
            for other in tables.users.values_mut() {
                if other.created_by == Some(user_id) {
                    other.created_by = None;
                }
            }
            Ok(())
        })
        .await
    }

    async fn get_instance_user(
        &self,
        user_id: i64,
        instance_id: i64,
        cancel: &CancellationToken,
    ) -> Result<Option<InstanceUser>> {
        cancellable(cancel, async {
            Ok(self
                .tables
                .read()
                .await
                .instance_users
                .get(&(user_id, instance_id))
                .cloned())
        })
        .await
    }

    async fn get_instance_users(
        &self,
        instance_id: i64,
        cancel: &CancellationToken,
    ) -> Result<Vec<InstanceUser>> {
        cancellable(cancel, async {
            Ok(self
                .tables
                .read()
                .await
                .instance_users
                .values()
                .filter(|grant| grant.instance_id == instance_id)
                .cloned()
                .collect())
        })
        .await
    }

    async fn grant_instance_user(
        &self,
        mut instance_user: InstanceUser,
        cancel: &CancellationToken,
    ) -> Result<InstanceUser> {
        cancellable(cancel, async {
            let mut tables = self.tables.write().await;
            if !tables.users.contains_key(&instance_user.user_id) {
                return Err(HostError::NotFound);
            }
            let key = (instance_user.user_id, instance_user.instance_id);
            if tables.instance_users.contains_key(&key) {
                return Err(HostError::Conflict(
                    "The user already has access to this instance!".to_string(),
                ));
            }

            instance_user.id = tables.allocate_instance_user_id();
            tables.instance_users.insert(key, instance_user.clone());
            Ok(instance_user)
        })
        .await
    }

    async fn update_instance_user(
        &self,
        instance_user: InstanceUser,
        cancel: &CancellationToken,
    ) -> Result<()> {
        cancellable(cancel, async {
            let mut tables = self.tables.write().await;
            let key = (instance_user.user_id, instance_user.instance_id);
            let stored = tables.instance_users.get_mut(&key).ok_or(HostError::NotFound)?;
            let id = stored.id;
            *stored = InstanceUser { id, ..instance_user };
            Ok(())
        })
        .await
    }

    async fn revoke_instance_user(
        &self,
        user_id: i64,
        instance_id: i64,
        cancel: &CancellationToken,
    ) -> Result<()> {
        cancellable(cancel, async {
            self.tables
                .write()
                .await
                .instance_users
                .remove(&(user_id, instance_id))
                .map(|_| ())
                .ok_or(HostError::NotFound)
        })
        .await
    }

    async fn delete_instance(&self, instance_id: i64, cancel: &CancellationToken) -> Result<usize> {
        cancellable(cancel, async {
            let mut tables = self.tables.write().await;
            let before = tables.instance_users.len();
            tables.instance_users.retain(|(_, instance), _| *instance != instance_id);
            Ok(before - tables.instance_users.len())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::user::Credential;
    use crate::rights::RepositoryRights;

    fn password_user(name: &str) -> User {
        User::new(
            name.to_string(),
            Credential::Password {
                hash: "h".to_string(),
                salt: "s".to_string(),
            },
            None,
        )
    }

    #[tokio::test]
    async fn test_ids_are_assigned_sequentially() {
        let store = MemoryCredentialStore::new();
        let cancel = CancellationToken::new();
        let first = store.create_user(password_user("Alice"), &cancel).await.unwrap();
        let second = store.create_user(password_user("Bob"), &cancel).await.unwrap();
        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(store.count_users(&cancel).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_canonical_name_is_unique() {
        let store = MemoryCredentialStore::new();
        let cancel = CancellationToken::new();
        store.create_user(password_user("Alice"), &cancel).await.unwrap();
        let duplicate = store.create_user(password_user("alice"), &cancel).await;
        assert!(matches!(duplicate, Err(HostError::Conflict(_))));

        let found = store
            .get_user_by_canonical_name("ALICE", &cancel)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.name, "Alice");
    }

    #[tokio::test]
    async fn test_system_identifier_is_unique() {
        let store = MemoryCredentialStore::new();
        let cancel = CancellationToken::new();
        let system = |name: &str| {
            User::new(
                name.to_string(),
                Credential::SystemIdentity {
                    identifier: "1001".to_string(),
                },
                None,
            )
        };
        store.create_user(system("gamehost"), &cancel).await.unwrap();
        let duplicate = store.create_user(system("gamehost2"), &cancel).await;
        assert!(matches!(duplicate, Err(HostError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_update_reindexes_name() {
        let store = MemoryCredentialStore::new();
        let cancel = CancellationToken::new();
        let mut user = store.create_user(password_user("Alice"), &cancel).await.unwrap();
        user.set_name("ALICE".to_string());
        store.update_user(user.clone(), &cancel).await.unwrap();

        let stored = store.get_user(user.id, &cancel).await.unwrap().unwrap();
        assert_eq!(stored.name, "ALICE");

        let mut missing = user;
        missing.id = 99;
        assert!(matches!(
            store.update_user(missing, &cancel).await,
            Err(HostError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_grants_cascade_from_both_parents() {
        let store = MemoryCredentialStore::new();
        let cancel = CancellationToken::new();
        let alice = store.create_user(password_user("Alice"), &cancel).await.unwrap();
        let bob = store.create_user(password_user("Bob"), &cancel).await.unwrap();

        store.grant_instance_user(InstanceUser::new(alice.id, 1), &cancel).await.unwrap();
        store.grant_instance_user(InstanceUser::new(alice.id, 2), &cancel).await.unwrap();
        store.grant_instance_user(InstanceUser::new(bob.id, 1), &cancel).await.unwrap();

        let duplicate = store.grant_instance_user(InstanceUser::new(bob.id, 1), &cancel).await;
        assert!(matches!(duplicate, Err(HostError::Conflict(_))));

        assert_eq!(store.delete_instance(1, &cancel).await.unwrap(), 2);
        assert!(store.get_instance_users(1, &cancel).await.unwrap().is_empty());

        store.delete_user(alice.id, &cancel).await.unwrap();
        assert!(store.get_instance_user(alice.id, 2, &cancel).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_and_revoke_grant() {
        let store = MemoryCredentialStore::new();
        let cancel = CancellationToken::new();
        let alice = store.create_user(password_user("Alice"), &cancel).await.unwrap();
        let mut grant = store
            .grant_instance_user(InstanceUser::new(alice.id, 5), &cancel)
            .await
            .unwrap();

        grant.repository_rights = RepositoryRights::READ;
        store.update_instance_user(grant.clone(), &cancel).await.unwrap();
        let stored = store.get_instance_user(alice.id, 5, &cancel).await.unwrap().unwrap();
        assert_eq!(stored, grant);

        store.revoke_instance_user(alice.id, 5, &cancel).await.unwrap();
        assert!(matches!(
            store.revoke_instance_user(alice.id, 5, &cancel).await,
            Err(HostError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_credential_write_keeps_other_fields() {
        let store = MemoryCredentialStore::new();
        let cancel = CancellationToken::new();
        let alice = store.create_user(password_user("Alice"), &cancel).await.unwrap();

        // A concurrent admin edit lands between read and credential write
        let mut disabled = alice.clone();
        disabled.enabled = false;
        disabled.administration_rights = crate::rights::AdministrationRights::NONE;
        store.update_user(disabled, &cancel).await.unwrap();

        let changed_at = chrono::Utc::now();
        let credential = Credential::Password {
            hash: "new".to_string(),
            salt: "salt".to_string(),
        };
        let stored = store
            .write_credential(
                alice.id,
                CredentialWrite::PasswordChange {
                    credential: credential.clone(),
                    changed_at,
                },
                &cancel,
            )
            .await
            .unwrap();

        assert_eq!(stored.credential, credential);
        assert_eq!(stored.last_password_update, Some(changed_at));
        assert!(!stored.enabled);
        assert!(stored.administration_rights.is_empty());
    }

    #[tokio::test]
    async fn test_rehash_skipped_when_credential_moved_on() {
        let store = MemoryCredentialStore::new();
        let cancel = CancellationToken::new();
        let alice = store.create_user(password_user("Alice"), &cancel).await.unwrap();

        let replaced = Credential::Password {
            hash: "changed".to_string(),
            salt: "salt".to_string(),
        };
        store
            .write_credential(
                alice.id,
                CredentialWrite::PasswordChange {
                    credential: replaced.clone(),
                    changed_at: chrono::Utc::now(),
                },
                &cancel,
            )
            .await
            .unwrap();

        let stale = store
            .write_credential(
                alice.id,
                CredentialWrite::Rehash {
                    previous: alice.credential.clone(),
                    credential: Credential::Password {
                        hash: "rehashed".to_string(),
                        salt: "salt".to_string(),
                    },
                },
                &cancel,
            )
            .await
            .unwrap();
        assert_eq!(stale.credential, replaced);

        assert!(matches!(
            store
                .write_credential(
                    99,
                    CredentialWrite::Rehash {
                        previous: replaced.clone(),
                        credential: replaced,
                    },
                    &cancel,
                )
                .await,
            Err(HostError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_cancelled_operations_abort() {
        let store = MemoryCredentialStore::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = store.create_user(password_user("Alice"), &cancel).await;
        assert!(matches!(result, Err(HostError::Cancelled)));
        assert_eq!(store.count_users(&CancellationToken::new()).await.unwrap(), 0);
    }
}
