//! Host configuration module
//! Binds environment variables to typed configuration sections

use crate::constants::{
    DEFAULT_ARGON2_ITERATIONS, DEFAULT_ARGON2_MEMORY_KIB, DEFAULT_ARGON2_PARALLELISM,
    DEFAULT_DATA_DIRECTORY, DEFAULT_HOST, DEFAULT_MINIMUM_PASSWORD_LENGTH,
    DEFAULT_MIN_AUTH_DURATION_MS, DEFAULT_PASSWD_PATH, DEFAULT_PORT,
    DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_TOKEN_EXPIRY_MINUTES, ENV_PREFIX,
    MAX_TOKEN_EXPIRY_MINUTES, SIGNING_KEY_FILE_NAME,
};
use crate::error::{HostError, Result};
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Names of every known configuration section
pub const SECTIONS: &[&str] = &[
    GeneralConfiguration::SECTION,
    SecurityConfiguration::SECTION,
    ServerConfiguration::SECTION,
];

/// A typed configuration record bound to one named section
pub trait ConfigSection: Sized {
    /// Section name, used as `RUSTY_FLEET_<SECTION>_<KEY>`
    const SECTION: &'static str;

    fn load(values: &SectionValues<'_>) -> Result<Self>;
}

/// Raw values of a single section, keyed without the section prefix
pub struct SectionValues<'a> {
    section: &'static str,
    values: HashMap<&'a str, &'a str>,
}

impl<'a> SectionValues<'a> {
    fn collect(section: &'static str, vars: &'a HashMap<String, String>) -> Self {
        let prefix = format!("{}{}_", ENV_PREFIX, section);
        let values = vars
            .iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(prefix.as_str())
                    .map(|stripped| (stripped, value.as_str()))
            })
            .collect();

        Self { section, values }
    }

    fn variable_name(&self, key: &str) -> String {
        format!("{}{}_{}", ENV_PREFIX, self.section, key)
    }

    /// Raw string value
    pub fn get(&self, key: &str) -> Option<&'a str> {
        self.values.get(key).copied()
    }

    /// Parse a value, falling back to `default` when unset
    pub fn parse_or<T: FromStr>(&self, key: &str, default: T) -> Result<T> {
        match self.get(key) {
            Some(raw) => raw.trim().parse().map_err(|_| {
                HostError::ConfigError(format!(
                    "{} has an invalid value '{}'",
                    self.variable_name(key),
                    raw
                ))
            }),
            None => Ok(default),
        }
    }

    /// Parse a boolean flag ("true"/"1")
    pub fn flag(&self, key: &str) -> bool {
        self.get(key)
            .map(|v| v.to_lowercase() == "true" || v == "1")
            .unwrap_or(false)
    }
}

/// General behaviour of the host
#[derive(Debug, Clone)]
pub struct GeneralConfiguration {
    /// Minimum length of a user password
    pub minimum_password_length: usize,
    /// Lifetime of issued bearer tokens
    pub token_expiry: chrono::Duration,
    /// Leeway applied to token time checks
    pub token_clock_skew: Duration,
}

impl Default for GeneralConfiguration {
    fn default() -> Self {
        Self {
            minimum_password_length: DEFAULT_MINIMUM_PASSWORD_LENGTH,
            token_expiry: chrono::Duration::minutes(DEFAULT_TOKEN_EXPIRY_MINUTES),
            token_clock_skew: Duration::ZERO,
        }
    }
}

impl ConfigSection for GeneralConfiguration {
    const SECTION: &'static str = "GENERAL";

    fn load(values: &SectionValues<'_>) -> Result<Self> {
        let minimum_password_length =
            values.parse_or("MINIMUM_PASSWORD_LENGTH", DEFAULT_MINIMUM_PASSWORD_LENGTH)?;
        if minimum_password_length == 0 {
            return Err(HostError::ConfigError(
                "Minimum password length must be at least 1".to_string(),
            ));
        }

        let expiry_minutes: i64 =
            values.parse_or("TOKEN_EXPIRY_MINUTES", DEFAULT_TOKEN_EXPIRY_MINUTES)?;
        if !(1..=MAX_TOKEN_EXPIRY_MINUTES).contains(&expiry_minutes) {
            return Err(HostError::ConfigError(format!(
                "Token expiry must be between 1 and {} minutes",
                MAX_TOKEN_EXPIRY_MINUTES
            )));
        }
        let token_expiry = chrono::Duration::try_minutes(expiry_minutes).ok_or_else(|| {
            HostError::ConfigError(format!("Token expiry of {} minutes is out of range", expiry_minutes))
        })?;

        let skew_secs: u64 = values.parse_or("TOKEN_CLOCK_SKEW_SECONDS", 0)?;

        Ok(Self {
            minimum_password_length,
            token_expiry,
            token_clock_skew: Duration::from_secs(skew_secs),
        })
    }
}

/// Credential hashing, signing key and account database settings
#[derive(Debug, Clone)]
pub struct SecurityConfiguration {
    pub argon2_memory_kib: u32,
    pub argon2_iterations: u32,
    pub argon2_parallelism: u32,
    /// Location of the token signing key; defaults into the data directory
    pub signing_key_path: Option<PathBuf>,
    /// System account database used to resolve OS identities
    pub passwd_path: PathBuf,
    /// Minimum duration of a login attempt
    pub min_auth_duration: Duration,
}

impl Default for SecurityConfiguration {
    fn default() -> Self {
        Self {
            argon2_memory_kib: DEFAULT_ARGON2_MEMORY_KIB,
            argon2_iterations: DEFAULT_ARGON2_ITERATIONS,
            argon2_parallelism: DEFAULT_ARGON2_PARALLELISM,
            signing_key_path: None,
            passwd_path: PathBuf::from(DEFAULT_PASSWD_PATH),
            min_auth_duration: Duration::from_millis(DEFAULT_MIN_AUTH_DURATION_MS),
        }
    }
}

impl ConfigSection for SecurityConfiguration {
    const SECTION: &'static str = "SECURITY";

    fn load(values: &SectionValues<'_>) -> Result<Self> {
        let argon2_memory_kib = values.parse_or("ARGON2_MEMORY_KIB", DEFAULT_ARGON2_MEMORY_KIB)?;
        let argon2_iterations = values.parse_or("ARGON2_ITERATIONS", DEFAULT_ARGON2_ITERATIONS)?;
        let argon2_parallelism =
            values.parse_or("ARGON2_PARALLELISM", DEFAULT_ARGON2_PARALLELISM)?;

        // Reject parameters argon2 itself would refuse at hashing time
        argon2::Params::new(argon2_memory_kib, argon2_iterations, argon2_parallelism, None)
            .map_err(|e| HostError::ConfigError(format!("Invalid Argon2 parameters: {}", e)))?;

        let min_auth_ms = values.parse_or("MIN_AUTH_DURATION_MS", DEFAULT_MIN_AUTH_DURATION_MS)?;

        Ok(Self {
            argon2_memory_kib,
            argon2_iterations,
            argon2_parallelism,
            signing_key_path: values.get("SIGNING_KEY_PATH").map(PathBuf::from),
            passwd_path: values
                .get("PASSWD_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PASSWD_PATH)),
            min_auth_duration: Duration::from_millis(min_auth_ms),
        })
    }
}

/// Network listener settings
#[derive(Debug, Clone)]
pub struct ServerConfiguration {
    pub host: String,
    pub port: u16,
    pub data_directory: PathBuf,
    pub request_timeout: Duration,
    /// TLS configuration
    pub enable_tls: bool,
    pub tls_cert_path: Option<String>,
    pub tls_key_path: Option<String>,
}

impl Default for ServerConfiguration {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            data_directory: PathBuf::from(DEFAULT_DATA_DIRECTORY),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            enable_tls: false,
            tls_cert_path: None,
            tls_key_path: None,
        }
    }
}

impl ConfigSection for ServerConfiguration {
    const SECTION: &'static str = "SERVER";

    fn load(values: &SectionValues<'_>) -> Result<Self> {
        let host = values.get("HOST").unwrap_or(DEFAULT_HOST).to_string();
        let port = values.parse_or("PORT", DEFAULT_PORT)?;
        let data_directory = values
            .get("DATA_DIRECTORY")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIRECTORY));
        let timeout_secs = values.parse_or("REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?;

        // TLS configuration
        let enable_tls = values.flag("ENABLE_TLS");
        let tls_cert_path = values.get("TLS_CERT_PATH").map(str::to_string);
        let tls_key_path = values.get("TLS_KEY_PATH").map(str::to_string);

        // Validate TLS configuration if enabled
        if enable_tls {
            match (&tls_cert_path, &tls_key_path) {
                (Some(cert_path), Some(key_path)) => {
                    if !std::path::Path::new(cert_path).exists() {
                        return Err(HostError::ConfigError(format!(
                            "TLS certificate file does not exist: {}",
                            cert_path
                        )));
                    }
                    if !std::path::Path::new(key_path).exists() {
                        return Err(HostError::ConfigError(format!(
                            "TLS private key file does not exist: {}",
                            key_path
                        )));
                    }
                }
                _ => {
                    return Err(HostError::ConfigError(format!(
                        "TLS is enabled but {}SERVER_TLS_CERT_PATH or {}SERVER_TLS_KEY_PATH is not set",
                        ENV_PREFIX, ENV_PREFIX
                    )));
                }
            }
        }

        Ok(Self {
            host,
            port,
            data_directory,
            request_timeout: Duration::from_secs(timeout_secs),
            enable_tls,
            tls_cert_path,
            tls_key_path,
        })
    }
}

/// Complete host configuration
#[derive(Debug, Clone, Default)]
pub struct HostConfig {
    pub general: GeneralConfiguration,
    pub security: SecurityConfiguration,
    pub server: ServerConfiguration,
}

impl HostConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_vars(env::vars())
    }

    /// Load configuration from an explicit set of variables
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .filter(|(k, _)| k.starts_with(ENV_PREFIX))
            .collect();

        for key in vars.keys() {
            if !Self::is_known_variable(key) {
                log::warn!("Ignoring {}: it does not belong to any configuration section", key);
            }
        }

        Ok(Self {
            general: load_section(&vars)?,
            security: load_section(&vars)?,
            server: load_section(&vars)?,
        })
    }

    fn is_known_variable(key: &str) -> bool {
        key.strip_prefix(ENV_PREFIX).is_some_and(|rest| {
            SECTIONS.iter().any(|section| {
                rest.strip_prefix(section)
                    .is_some_and(|tail| tail.starts_with('_'))
            })
        })
    }

    /// Path of the token signing key file
    pub fn signing_key_path(&self) -> PathBuf {
        self.security
            .signing_key_path
            .clone()
            .unwrap_or_else(|| self.server.data_directory.join(SIGNING_KEY_FILE_NAME))
    }
}

fn load_section<T: ConfigSection>(vars: &HashMap<String, String>) -> Result<T> {
    T::load(&SectionValues::collect(T::SECTION, vars))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_variables() {
        let config = HostConfig::from_vars(Vec::<(String, String)>::new()).unwrap();
        assert_eq!(config.general.minimum_password_length, DEFAULT_MINIMUM_PASSWORD_LENGTH);
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert!(!config.server.enable_tls);
        assert_eq!(
            config.signing_key_path(),
            PathBuf::from(DEFAULT_DATA_DIRECTORY).join(SIGNING_KEY_FILE_NAME)
        );
    }

    #[test]
    fn test_sections_are_bound_by_name() {
        let config = HostConfig::from_vars(vec![
            ("RUSTY_FLEET_GENERAL_MINIMUM_PASSWORD_LENGTH", "8"),
            ("RUSTY_FLEET_SERVER_PORT", "8080"),
            ("RUSTY_FLEET_SECURITY_ARGON2_ITERATIONS", "3"),
            ("UNRELATED_VARIABLE", "ignored"),
        ])
        .unwrap();

        assert_eq!(config.general.minimum_password_length, 8);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.security.argon2_iterations, 3);
    }

    #[test]
    fn test_invalid_value_names_the_variable() {
        let result = HostConfig::from_vars(vec![("RUSTY_FLEET_SERVER_PORT", "not-a-port")]);
        let err = result.unwrap_err().to_string();
        assert!(err.contains("RUSTY_FLEET_SERVER_PORT"));
    }

    #[test]
    fn test_zero_password_length_rejected() {
        let result =
            HostConfig::from_vars(vec![("RUSTY_FLEET_GENERAL_MINIMUM_PASSWORD_LENGTH", "0")]);
        assert!(result.is_err());
    }

    #[test]
    fn test_token_expiry_is_bounded() {
        for minutes in ["0", "525601", "9223372036854775807"] {
            let result =
                HostConfig::from_vars(vec![("RUSTY_FLEET_GENERAL_TOKEN_EXPIRY_MINUTES", minutes)]);
            assert!(matches!(result, Err(HostError::ConfigError(_))), "{} minutes", minutes);
        }

        let config =
            HostConfig::from_vars(vec![("RUSTY_FLEET_GENERAL_TOKEN_EXPIRY_MINUTES", "525600")]).unwrap();
        assert_eq!(config.general.token_expiry, chrono::Duration::days(365));
    }

    #[test]
    fn test_tls_requires_paths() {
        let result = HostConfig::from_vars(vec![("RUSTY_FLEET_SERVER_ENABLE_TLS", "true")]);
        assert!(result.unwrap_err().to_string().contains("TLS is enabled"));
    }

    #[test]
    fn test_unknown_sections_are_detected() {
        assert!(HostConfig::is_known_variable("RUSTY_FLEET_GENERAL_MINIMUM_PASSWORD_LENGTH"));
        assert!(!HostConfig::is_known_variable("RUSTY_FLEET_GENERALX_FOO"));
        assert!(!HostConfig::is_known_variable("RUSTY_FLEET_CHAT_TOKEN"));
    }
}
