//! Authentication and authorization module

pub mod context;
pub mod crypto;
pub mod provider;
pub mod system_identity;
pub mod token;
pub mod user;

// Re-export main components
pub use context::AuthenticationContext;
pub use crypto::{CryptographySuite, PasswordVerification, SigningKey};
pub use provider::{AuthenticationContextFactory, BasicCredentials};
pub use system_identity::{SystemIdentity, SystemIdentityFactory};
pub use token::{Claims, Token, TokenService};
pub use user::{Credential, InstanceUser, User, UserProfile, UserSummary, UserUpdate};
