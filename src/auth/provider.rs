//! Request authentication
//!
//! Turns an inbound bearer token into an [`AuthenticationContext`], and
//! exchanges Basic credentials for a new token.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::auth::context::AuthenticationContext;
use crate::auth::crypto::{CryptographySuite, PasswordVerification};
use crate::auth::system_identity::SystemIdentityFactory;
use crate::auth::token::{Token, TokenService};
use crate::auth::user::{canonicalize, User};
use crate::error::{HostError, Result};
use crate::security::AuthTimer;
use crate::security_logger::{log_security_event, SecurityEvent};
use crate::storage::{CredentialStore, CredentialWrite};

/// Username and password sent with HTTP Basic authentication
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

impl BasicCredentials {
    /// Parse an `Authorization: Basic ...` header value. The name ends at the first colon.
    pub fn from_header(auth_header: &str) -> Option<Self> {
        let encoded = auth_header.strip_prefix("Basic ")?.trim();
        let decoded = STANDARD.decode(encoded).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (username, password) = decoded.split_once(':')?;
        Some(Self {
            username: username.to_string(),
            password: password.to_string(),
        })
    }
}

/// Builds authentication contexts for requests
pub struct AuthenticationContextFactory {
    store: Arc<dyn CredentialStore>,
    crypto: Arc<CryptographySuite>,
    tokens: Arc<TokenService>,
    system_identities: Arc<dyn SystemIdentityFactory>,
    min_auth_duration: Duration,
}

impl AuthenticationContextFactory {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        crypto: Arc<CryptographySuite>,
        tokens: Arc<TokenService>,
        system_identities: Arc<dyn SystemIdentityFactory>,
        min_auth_duration: Duration,
    ) -> Self {
        Self {
            store,
            crypto,
            tokens,
            system_identities,
            min_auth_duration,
        }
    }

    /// Authenticate a bearer token, optionally scoped to an instance
    pub async fn create(
        &self,
        bearer: &str,
        instance_id: Option<i64>,
        cancel: &CancellationToken,
    ) -> Result<AuthenticationContext> {
        let claims = match self.tokens.validate(bearer) {
            Ok(claims) => claims,
            Err(e) => {
                log_security_event(SecurityEvent::TokenValidationFailed {
                    user_id: None,
                    reason: "invalid signature or lifetime".to_string(),
                })
                .await;
                return Err(e);
            }
        };
        let user_id = claims.user_id()?;

        let user = match self.store.get_user(user_id, cancel).await? {
            Some(user) => user,
            None => return Err(self.reject_token(user_id, "user no longer exists").await),
        };

        if !user.enabled {
            return Err(self.reject_token(user_id, "user is disabled").await);
        }

        if let Some(changed) = user.last_password_update {
            if claims.iat_ms < changed.timestamp_millis() {
                return Err(self.reject_token(user_id, "issued before the last password change").await);
            }
        }

        let system_identity = match user.system_identifier() {
            Some(identifier) => {
                match self
                    .system_identities
                    .create_system_identity(identifier, cancel)
                    .await?
                {
                    Some(identity) => Some(identity),
                    None => {
                        log_security_event(SecurityEvent::SystemIdentityMissing {
                            user_id,
                            system_identifier: identifier.to_string(),
                        })
                        .await;
                        return Err(HostError::Unauthorized);
                    }
                }
            }
            None => None,
        };

        let instance_user = match instance_id {
            Some(instance_id) => self.store.get_instance_user(user_id, instance_id, cancel).await?,
            None => None,
        };

        AuthenticationContext::new(system_identity, user, instance_user)
    }

    async fn reject_token(&self, user_id: i64, reason: &str) -> HostError {
        log_security_event(SecurityEvent::TokenValidationFailed {
            user_id: Some(user_id),
            reason: reason.to_string(),
        })
        .await;
        HostError::Unauthorized
    }

    /// Exchange credentials for a token
    pub async fn login(&self, credentials: &BasicCredentials, cancel: &CancellationToken) -> Result<Token> {
        let timer = AuthTimer::new(self.min_auth_duration);

        let result = self.authenticate_credentials(credentials, cancel).await;
        let user = match result {
            Ok(user) => user,
            Err(HostError::Unauthorized) => {
                log_security_event(SecurityEvent::AuthenticationFailed {
                    username: Some(canonicalize(&credentials.username)),
                    reason: "invalid credentials".to_string(),
                })
                .await;
                timer.wait().await;
                return Err(HostError::Unauthorized);
            }
            Err(e) => return Err(e),
        };

        log_security_event(SecurityEvent::AuthenticationSuccess { user_id: user.id }).await;
        self.tokens.issue(&user)
    }

    async fn authenticate_credentials(
        &self,
        credentials: &BasicCredentials,
        cancel: &CancellationToken,
    ) -> Result<User> {
        let canonical_name = canonicalize(&credentials.username);
        let stored = self.store.get_user_by_canonical_name(&canonical_name, cancel).await?;

        let user = match stored {
            Some(mut user) if !user.is_system_user() => {
                let previous = user.credential.clone();
                match self.crypto.verify_password(&mut user, &credentials.password)? {
                    PasswordVerification::Invalid => return Err(HostError::Unauthorized),
                    PasswordVerification::Valid => user,
                    PasswordVerification::Rehashed => {
                        // Other fields keep their stored values, including a concurrent disable
                        let write = CredentialWrite::Rehash {
                            previous,
                            credential: user.credential,
                        };
                        let user = self.store.write_credential(user.id, write, cancel).await?;
                        log_security_event(SecurityEvent::PasswordRehashed { user_id: user.id }).await;
                        user
                    }
                }
            }
            _ => self.authenticate_system_user(credentials, cancel).await?,
        };

        if !user.enabled {
            return Err(HostError::Unauthorized);
        }
        Ok(user)
    }

    async fn authenticate_system_user(
        &self,
        credentials: &BasicCredentials,
        cancel: &CancellationToken,
    ) -> Result<User> {
        let identity = match self
            .system_identities
            .create_system_identity_from_credentials(&credentials.username, &credentials.password, cancel)
            .await
        {
            Ok(Some(identity)) => identity,
            Ok(None) | Err(HostError::NotImplemented(_)) => return Err(HostError::Unauthorized),
            Err(e) => return Err(e),
        };

        let user = self
            .store
            .get_user_by_canonical_name(&canonicalize(identity.username()), cancel)
            .await?
            .filter(|user| user.system_identifier() == Some(identity.uid()));

        user.ok_or(HostError::Unauthorized)
    }
}
