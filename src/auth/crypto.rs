//! Password hashing and token signing key management
//!
//! Passwords are hashed with Argon2id using the configured cost parameters.
//! Verification uses the parameters stored alongside each hash, so raising
//! the configured cost only affects hashes produced afterwards; weaker hashes
//! are upgraded the next time their password is verified.

use argon2::password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::Path;

use crate::auth::user::{Credential, User};
use crate::config::SecurityConfiguration;
use crate::constants::{MIN_SIGNING_KEY_BYTES, SIGNING_KEY_BYTES};
use crate::error::{HostError, Result};

/// Outcome of checking a password
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordVerification {
    /// Wrong password, or the user has no password
    Invalid,
    /// Correct password
    Valid,
    /// Correct password; the stored hash was upgraded and must be persisted
    Rehashed,
}

impl PasswordVerification {
    pub fn is_valid(self) -> bool {
        self != PasswordVerification::Invalid
    }
}

/// Password hashing for locally stored credentials
pub struct CryptographySuite {
    params: Params,
}

impl CryptographySuite {
    pub fn new(config: &SecurityConfiguration) -> Result<Self> {
        let params = Params::new(
            config.argon2_memory_kib,
            config.argon2_iterations,
            config.argon2_parallelism,
            None,
        )
        .map_err(|e| HostError::ConfigError(format!("Invalid Argon2 parameters: {}", e)))?;

        Ok(Self { params })
    }

    fn hasher(params: Params) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
    }

    /// Hash `password` with a fresh salt and store it on `user`.
    ///
    /// `new_password` marks a real password change, which voids tokens issued
    /// before it. Upgrading the hash of an unchanged password must not.
    pub fn set_user_password(&self, user: &mut User, password: &str, new_password: bool) -> Result<()> {
        if user.is_system_user() {
            return Err(HostError::ValidationError(
                "Cannot set a password for a system identity user!".to_string(),
            ));
        }

        let salt = SaltString::generate(&mut OsRng);
        let hash = Self::hasher(self.params.clone())
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| HostError::CryptoError(format!("Password hashing failed: {}", e)))?
            .to_string();

        user.credential = Credential::Password {
            hash,
            salt: salt.as_str().to_string(),
        };
        if new_password {
            user.last_password_update = Some(Utc::now());
        }
        Ok(())
    }

    /// Check `password` against the hash stored on `user`.
    ///
    /// When the stored hash used weaker parameters than configured, the user is
    /// rehashed in place and [`PasswordVerification::Rehashed`] is returned.
    pub fn verify_password(&self, user: &mut User, password: &str) -> Result<PasswordVerification> {
        let stored = match user.password_hash() {
            Some(hash) => hash.to_string(),
            None => return Ok(PasswordVerification::Invalid),
        };

        let parsed = PasswordHash::new(&stored)
            .map_err(|e| HostError::CryptoError(format!("Corrupt password hash for user {}: {}", user.id, e)))?;

        // The verifier reads algorithm, version and cost from the hash itself
        match Argon2::default().verify_password(password.as_bytes(), &parsed) {
            Ok(()) => {}
            Err(password_hash::Error::Password) => return Ok(PasswordVerification::Invalid),
            Err(e) => {
                return Err(HostError::CryptoError(format!(
                    "Password verification failed for user {}: {}",
                    user.id, e
                )))
            }
        }

        let algorithm = Algorithm::try_from(parsed.algorithm)
            .map_err(|e| HostError::CryptoError(format!("Unsupported hash algorithm: {}", e)))?;
        let stored_params = Params::try_from(&parsed)
            .map_err(|e| HostError::CryptoError(format!("Invalid stored hash parameters: {}", e)))?;

        let outdated = algorithm != Algorithm::Argon2id
            || stored_params.m_cost() < self.params.m_cost()
            || stored_params.t_cost() < self.params.t_cost()
            || stored_params.p_cost() < self.params.p_cost();
        if outdated {
            log::info!("Upgrading password hash parameters for user {}", user.id);
            self.set_user_password(user, password, false)?;
            return Ok(PasswordVerification::Rehashed);
        }

        Ok(PasswordVerification::Valid)
    }
}

/// Process-wide key used to sign bearer tokens
pub struct SigningKey(Vec<u8>);

impl SigningKey {
    /// Generate a fresh random key
    pub fn generate() -> Self {
        let mut bytes = vec![0u8; SIGNING_KEY_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() < MIN_SIGNING_KEY_BYTES {
            return Err(HostError::ConfigError(format!(
                "Token signing key must be at least {} bytes long",
                MIN_SIGNING_KEY_BYTES
            )));
        }
        Ok(Self(bytes))
    }

    /// Load the key at `path`, generating and writing it on first boot
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            let encoded = fs::read_to_string(path)?;
            let bytes = STANDARD.decode(encoded.trim()).map_err(|e| {
                HostError::ConfigError(format!("Signing key {} is not valid base64: {}", path.display(), e))
            })?;
            log::info!("Loaded token signing key from {}", path.display());
            return Self::from_bytes(bytes);
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let key = Self::generate();
        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(path)?;
        file.write_all(STANDARD.encode(&key.0).as_bytes())?;
        file.sync_all()?;

        log::info!("Generated new token signing key at {}", path.display());
        Ok(key)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey").field("len", &self.0.len()).finish_non_exhaustive()
    }
}
