//! HTTP handlers for resource dispatch and login.

pub mod auth;
pub mod resource;
pub use auth::auth;
pub use resource::{dispatch, resource, Action};
