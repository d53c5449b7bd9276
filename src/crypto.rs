use anyhow::{Result, anyhow};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use rand::rngs::OsRng;

pub struct CryptoUtils;

impl CryptoUtils {
    // Hashes a password into an Argon2id PHC string (salt and params embedded)
    pub fn hash_password(password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| anyhow!("Failed to hash password: {}", e))
    }

    // Checks a password against a stored PHC string
    pub fn verify_password(password: &str, stored_hash: &str) -> Result<bool> {
        let parsed = PasswordHash::new(stored_hash)
            .map_err(|e| anyhow!("Failed to parse stored password hash: {}", e))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }

    // Spends one hash worth of work, for logins naming an unknown user
    pub fn burn_verification(password: &str) {
        let _ = Self::hash_password(password);
    }
}
