//! Request handlers for the HTTP API

pub mod api;
pub mod headers;

pub use api::{handle_rejection, routes};
pub use headers::{ApiHeaders, Authorization, ProductHeader};
