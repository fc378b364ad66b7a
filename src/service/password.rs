//! Password hashing and verification. Argon2 runs on the blocking pool.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use tokio::sync::OnceCell;

use crate::error::AppError;

static DUMMY_HASH: OnceCell<String> = OnceCell::const_new();

/// Hash a password with Argon2id and a random salt. Returns a PHC string.
pub async fn hash_password(input: &str) -> Result<String, AppError> {
    let input = input.to_owned();
    tokio::task::spawn_blocking(move || hash_blocking(&input))
        .await
        .map_err(|e| AppError::Internal(format!("spawn password hashing task: {e}")))?
}

/// Verify a password against a stored PHC string.
///
/// Verification uses the parameters embedded in the hash itself. A stored value that
/// is not a valid hash never verifies.
pub async fn verify_password(input: &str, hash: &str) -> Result<bool, AppError> {
    let (input, hash) = (input.to_owned(), hash.to_owned());
    tokio::task::spawn_blocking(move || verify_blocking(&input, &hash))
        .await
        .map_err(|e| AppError::Internal(format!("spawn password verification task: {e}")))
}

/// A valid hash of no real password, verified against when an account does not exist
/// so both outcomes cost one Argon2 run.
pub async fn dummy_hash() -> Result<&'static str, AppError> {
    DUMMY_HASH
        .get_or_try_init(|| hash_password("no account matches this password"))
        .await
        .map(String::as_str)
}

#[cfg(test)]
pub(crate) fn dummy_hash_ready() -> bool {
    DUMMY_HASH.initialized()
}

fn hash_blocking(input: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(input.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("hash password: {e}")))?;
    Ok(hash.to_string())
}

fn verify_blocking(input: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default().verify_password(input.as_bytes(), &parsed).is_ok(),
        Err(_) => {
            tracing::warn!("stored password is not a valid hash");
            false
        }
    }
}
