//! Rusty Fleet - identity and authorization for an instance host
//!
//! This library provides user accounts, rights resolution, credential
//! handling and the HTTP API exposing them.

pub mod auth;
pub mod config;
pub mod constants;
pub mod error;
pub mod handlers;
pub mod rights;
pub mod security;
pub mod security_logger;
pub mod services;
pub mod storage;
pub mod users;

// Re-export main components
pub use config::HostConfig;
pub use error::{HostError, Result};
pub use services::{HostServices, HostServicesBuilder};
