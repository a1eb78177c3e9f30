//! Persistence contract for users and instance grants

pub mod memory;
pub mod traits;

pub use memory::MemoryCredentialStore;
pub use traits::{CredentialStore, CredentialWrite};
