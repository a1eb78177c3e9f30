//! User account management

pub mod lifecycle;

pub use lifecycle::UserLifecycle;
