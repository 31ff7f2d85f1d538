//! Collection password gate.
//!
//! A protected collection stores an Argon2 PHC string in its settings
//! table. The password gates `open`; it does not encrypt the file.

use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};

use crate::error::{DbError, DbResult};

/// Hashes a password for storage.
pub fn hash_password(password: &str) -> DbResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| DbError::Internal(format!("Failed to hash password: {}", e)))?;

    Ok(hash.to_string())
}

/// Checks a password against a stored hash. Malformed hashes never match.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Applies the gate: `stored` is the hash from the settings table, if any.
pub(crate) fn check(stored: Option<&str>, supplied: Option<&str>) -> DbResult<()> {
    match (stored, supplied) {
        (None, _) => Ok(()),
        (Some(hash), Some(password)) if verify_password(password, hash) => Ok(()),
        (Some(_), _) => Err(DbError::IncorrectPassword),
    }
}
