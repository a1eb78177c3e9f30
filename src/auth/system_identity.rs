//! Operating system identity resolution
//!
//! Resolves the account reference stored on a user to a live handle. Handles are
//! owned by exactly one authentication context and released when it drops.

use async_trait::async_trait;
use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::SecurityConfiguration;
use crate::error::{HostError, Result};

/// A verified operating system account
pub trait SystemIdentity: Debug + Send + Sync {
    /// Canonical account name as reported by the OS
    fn username(&self) -> &str;

    /// Stable account identifier
    fn uid(&self) -> &str;
}

/// Platform capability producing [`SystemIdentity`] handles
#[async_trait]
pub trait SystemIdentityFactory: Send + Sync {
    /// Resolve a stored account reference.
    ///
    /// `Ok(None)` means the account no longer exists. Platforms without OS
    /// account support return [`HostError::NotImplemented`].
    async fn create_system_identity(
        &self,
        system_identifier: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Box<dyn SystemIdentity>>>;

    /// Log in to an OS account with its password.
    async fn create_system_identity_from_credentials(
        &self,
        _username: &str,
        _password: &str,
        _cancel: &CancellationToken,
    ) -> Result<Option<Box<dyn SystemIdentity>>> {
        Err(HostError::NotImplemented(
            "System account login is not supported on this host".to_string(),
        ))
    }
}

/// Account resolved from the passwd database
#[derive(Debug)]
pub struct PosixIdentity {
    username: String,
    uid: String,
}

impl SystemIdentity for PosixIdentity {
    fn username(&self) -> &str {
        &self.username
    }

    fn uid(&self) -> &str {
        &self.uid
    }
}

impl Drop for PosixIdentity {
    fn drop(&mut self) {
        log::trace!("Released system identity {} ({})", self.username, self.uid);
    }
}

/// Resolves identities from a passwd formatted account database
pub struct PasswdIdentityFactory {
    passwd_path: PathBuf,
}

impl PasswdIdentityFactory {
    pub fn new(passwd_path: impl Into<PathBuf>) -> Self {
        Self {
            passwd_path: passwd_path.into(),
        }
    }

    /// Find an account by uid or login name
    fn lookup(contents: &str, system_identifier: &str) -> Option<PosixIdentity> {
        contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| {
                let mut fields = line.split(':');
                let username = fields.next()?;
                let _password = fields.next()?;
                let uid = fields.next()?;
                Some((username, uid))
            })
            .find(|(username, uid)| *uid == system_identifier || *username == system_identifier)
            .map(|(username, uid)| PosixIdentity {
                username: username.to_string(),
                uid: uid.to_string(),
            })
    }
}

#[async_trait]
impl SystemIdentityFactory for PasswdIdentityFactory {
    async fn create_system_identity(
        &self,
        system_identifier: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Box<dyn SystemIdentity>>> {
        let path = self.passwd_path.clone();
        let identifier = system_identifier.to_string();

        // Reading the account database is a blocking call
        let lookup = tokio::task::spawn_blocking(move || -> Result<Option<PosixIdentity>> {
            let contents = std::fs::read_to_string(&path)?;
            Ok(Self::lookup(&contents, &identifier))
        });

        let identity = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(HostError::Cancelled),
            joined = lookup => joined
                .map_err(|e| HostError::SystemError(format!("Account lookup task failed: {}", e)))??,
        };

        match identity {
            Some(identity) => {
                log::debug!("Resolved system identity {} to uid {}", system_identifier, identity.uid);
                Ok(Some(Box::new(identity)))
            }
            None => {
                log::debug!("System account {} does not exist", system_identifier);
                Ok(None)
            }
        }
    }
}

/// Factory for hosts without OS account support
pub struct UnsupportedIdentityFactory;

#[async_trait]
impl SystemIdentityFactory for UnsupportedIdentityFactory {
    async fn create_system_identity(
        &self,
        _system_identifier: &str,
        _cancel: &CancellationToken,
    ) -> Result<Option<Box<dyn SystemIdentity>>> {
        Err(HostError::NotImplemented(
            "System identities are not supported on this host".to_string(),
        ))
    }
}

/// The identity factory matching the current platform
pub fn default_system_identity_factory(config: &SecurityConfiguration) -> Arc<dyn SystemIdentityFactory> {
    if cfg!(unix) {
        Arc::new(PasswdIdentityFactory::new(config.passwd_path.clone()))
    } else {
        Arc::new(UnsupportedIdentityFactory)
    }
}
