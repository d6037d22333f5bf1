use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use rand::thread_rng;

use crate::error::ServiceError;

const MIN_PASSWORD_LEN: usize = 8;

pub fn hash_password(password: &str) -> Result<String, ServiceError> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(ServiceError::InvalidInput("Password too short"));
    }
    hash_secret(password)
}

/// One-way hash without the password length policy; also covers reset-challenge
/// tokens, which must never be compared by equality to their stored form.
pub fn hash_secret(secret: &str) -> Result<String, ServiceError> {
    let salt = SaltString::generate(&mut thread_rng());
    let hash = Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map_err(|_| ServiceError::Hash)?
        .to_string();
    Ok(hash)
}

pub fn verify_secret(secret: &str, hash: &str) -> Result<bool, ServiceError> {
    let parsed = PasswordHash::new(hash).map_err(|_| ServiceError::Hash)?;

    Ok(Argon2::default()
        .verify_password(secret.as_bytes(), &parsed)
        .is_ok())
}
