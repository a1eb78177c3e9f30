use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::auth::crypto::SigningKey;
use crate::auth::user::User;
use crate::config::GeneralConfiguration;
use crate::error::{HostError, Result};

/// JWT Claims structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Expiration time (as UTC timestamp)
    pub exp: i64,
    /// Issued at (as UTC timestamp)
    pub iat: i64,
    /// Not before (as UTC timestamp)
    pub nbf: i64,
    /// Issued at in milliseconds, compared against password changes
    #[serde(default)]
    pub iat_ms: i64,
}

impl Claims {
    /// Creates claims for a user valid for `lifetime` from `now`
    pub fn new(user_id: i64, now: DateTime<Utc>, lifetime: chrono::Duration) -> Self {
        let issued = now.timestamp();
        let expires = now.checked_add_signed(lifetime).unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            sub: user_id.to_string(),
            exp: expires.timestamp(),
            iat: issued,
            nbf: issued,
            iat_ms: now.timestamp_millis(),
        }
    }

    /// The user the token was issued to
    pub fn user_id(&self) -> Result<i64> {
        self.sub
            .parse()
            .map_err(|_| HostError::Unauthorized)
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.iat_ms).single()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.exp, 0).single()
    }
}

/// Bearer token handed to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub bearer: String,
    pub expires_at: DateTime<Utc>,
}

/// Issues and validates signed bearer tokens
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    lifetime: chrono::Duration,
}

impl TokenService {
    pub fn new(signing_key: &SigningKey, config: &GeneralConfiguration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = config.token_clock_skew.as_secs();
        validation.validate_nbf = true;
        validation.set_required_spec_claims(&["exp", "nbf", "sub"]);

        Self {
            encoding_key: EncodingKey::from_secret(signing_key.as_bytes()),
            decoding_key: DecodingKey::from_secret(signing_key.as_bytes()),
            validation,
            lifetime: config.token_expiry,
        }
    }

    /// Issue a token for `user`
    pub fn issue(&self, user: &User) -> Result<Token> {
        self.issue_at(user, Utc::now())
    }

    fn issue_at(&self, user: &User, now: DateTime<Utc>) -> Result<Token> {
        let claims = Claims::new(user.id, now, self.lifetime);
        let expires_at = claims
            .expires_at()
            .ok_or_else(|| HostError::CryptoError("Token expiry out of range".to_string()))?;
        let bearer = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| HostError::CryptoError(format!("Failed to generate token: {}", e)))?;

        Ok(Token { bearer, expires_at })
    }

    /// Validates signature and lifetime, returning the claims
    pub fn validate(&self, bearer: &str) -> Result<Claims> {
        decode::<Claims>(bearer, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                log::debug!("Token rejected: {}", e);
                HostError::Unauthorized
            })
    }
}

/// Extracts bearer token from Authorization header
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::user::Credential;

    fn service() -> TokenService {
        TokenService::new(
            &SigningKey::from_bytes(vec![7u8; 64]).unwrap(),
            &GeneralConfiguration::default(),
        )
    }

    fn user() -> User {
        let mut user = User::new(
            "Alice".to_string(),
            Credential::Password {
                hash: "h".to_string(),
                salt: "s".to_string(),
            },
            None,
        );
        user.id = 42;
        user
    }

    #[test]
    fn test_issue_and_validate() {
        let service = service();
        let token = service.issue(&user()).unwrap();
        let claims = service.validate(&token.bearer).unwrap();
        assert_eq!(claims.user_id().unwrap(), 42);
        assert_eq!(claims.expires_at(), Some(token.expires_at));
    }

    #[test]
    fn test_expired_token_rejected() {
        let service = service();
        let token = service
            .issue_at(&user(), Utc::now() - chrono::Duration::hours(3))
            .unwrap();
        assert!(matches!(service.validate(&token.bearer), Err(HostError::Unauthorized)));
    }

    #[test]
    fn test_foreign_key_rejected() {
        let token = service().issue(&user()).unwrap();
        let other = TokenService::new(
            &SigningKey::from_bytes(vec![9u8; 64]).unwrap(),
            &GeneralConfiguration::default(),
        );
        assert!(other.validate(&token.bearer).is_err());
    }

    #[test]
    fn test_extract_bearer_token() {
        assert_eq!(extract_bearer_token("Bearer abc.def"), Some("abc.def"));
        assert_eq!(extract_bearer_token("Basic YWRtaW46cHc="), None);
        assert_eq!(extract_bearer_token("Bearer "), None);
    }

    #[test]
    fn test_non_numeric_subject_is_unauthorized() {
        let claims = Claims {
            sub: "admin".to_string(),
            exp: 0,
            iat: 0,
            nbf: 0,
            iat_ms: 0,
        };
        assert!(matches!(claims.user_id(), Err(HostError::Unauthorized)));
    }

    #[test]
    fn test_issue_time_keeps_milliseconds() {
        let service = service();
        let now = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let token = service.issue_at(&user(), now).unwrap();
        // Decode without lifetime checks since `now` is in the past
        let mut validation = service.validation.clone();
        validation.validate_exp = false;
        validation.validate_nbf = false;
        let claims = decode::<Claims>(&token.bearer, &service.decoding_key, &validation)
            .unwrap()
            .claims;
        assert_eq!(claims.iat, 1_700_000_000);
        assert_eq!(claims.iat_ms, 1_700_000_000_123);
        assert_eq!(claims.issued_at(), Some(now));
    }

    #[test]
    fn test_oversized_lifetime_saturates() {
        let claims = Claims::new(42, Utc::now(), chrono::Duration::MAX);
        assert_eq!(claims.exp, DateTime::<Utc>::MAX_UTC.timestamp());
        assert!(claims.expires_at().is_some());
    }
}
