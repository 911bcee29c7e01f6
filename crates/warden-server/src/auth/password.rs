//! Password hashing and verification using argon2id.

use argon2::Argon2;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};

/// Hash a password with a random salt.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)?
        .to_string())
}

/// Check `password` against a stored digest. A malformed digest is an error,
/// a mismatch is `Ok(false)`.
pub fn verify_password(password: &str, digest: &str) -> Result<bool, argon2::password_hash::Error> {
    let parsed = PasswordHash::new(digest)?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify() {
        let digest = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &digest).unwrap());
        assert!(!verify_password("battery staple", &digest).unwrap());
    }

    #[test]
    fn salts_differ() {
        assert_ne!(
            hash_password("same-password").unwrap(),
            hash_password("same-password").unwrap()
        );
    }

    #[test]
    fn malformed_digest_is_an_error() {
        assert!(verify_password("x", "not-a-phc-string").is_err());
    }
}
