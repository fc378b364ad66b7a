//! Entity repository, account operations and request validation.

mod account;
mod crud;
pub mod password;
mod validation;

pub use account::{AccountService, ChangePasswordRequest, LoginRequest};
pub use crud::{EntityRepository, UpsertOutcome};
pub use validation::RequestValidator;
