//! Process-wide service graph
//!
//! Services are assembled in two steps. The builder starts [`Unwired`] and only
//! becomes [`Wired`], the state offering [`HostServicesBuilder::build`], once the
//! platform's system identity factory has been supplied. Supplying it twice is
//! not expressible.

use std::sync::Arc;

use crate::auth::crypto::{CryptographySuite, SigningKey};
use crate::auth::provider::AuthenticationContextFactory;
use crate::auth::system_identity::SystemIdentityFactory;
use crate::auth::token::TokenService;
use crate::config::HostConfig;
use crate::error::Result;
use crate::storage::CredentialStore;
use crate::users::UserLifecycle;

/// Builder state before the system identity factory is set
pub struct Unwired;

/// Builder state with every dependency present
pub struct Wired(Arc<dyn SystemIdentityFactory>);

pub struct HostServicesBuilder<State> {
    config: HostConfig,
    store: Arc<dyn CredentialStore>,
    signing_key: SigningKey,
    state: State,
}

impl HostServicesBuilder<Unwired> {
    pub fn new(config: HostConfig, store: Arc<dyn CredentialStore>, signing_key: SigningKey) -> Self {
        Self {
            config,
            store,
            signing_key,
            state: Unwired,
        }
    }

    pub fn with_system_identity_factory(
        self,
        factory: Arc<dyn SystemIdentityFactory>,
    ) -> HostServicesBuilder<Wired> {
        HostServicesBuilder {
            config: self.config,
            store: self.store,
            signing_key: self.signing_key,
            state: Wired(factory),
        }
    }
}

impl HostServicesBuilder<Wired> {
    pub fn build(self) -> Result<HostServices> {
        let Wired(system_identities) = self.state;

        let crypto = Arc::new(CryptographySuite::new(&self.config.security)?);
        let tokens = Arc::new(TokenService::new(&self.signing_key, &self.config.general));

        let users = Arc::new(UserLifecycle::new(
            self.store.clone(),
            crypto.clone(),
            system_identities.clone(),
            &self.config.general,
        ));
        let authentication = Arc::new(AuthenticationContextFactory::new(
            self.store.clone(),
            crypto,
            tokens,
            system_identities,
            self.config.security.min_auth_duration,
        ));

        Ok(HostServices {
            config: Arc::new(self.config),
            store: self.store,
            users,
            authentication,
        })
    }
}

/// Shared, read-only after startup
#[derive(Clone)]
pub struct HostServices {
    pub config: Arc<HostConfig>,
    pub store: Arc<dyn CredentialStore>,
    pub users: Arc<UserLifecycle>,
    pub authentication: Arc<AuthenticationContextFactory>,
}
