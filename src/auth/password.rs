use sha2::{Digest, Sha256};

use super::AuthError;

// bcrypt's supported cost range (the crate's own MIN_COST/MAX_COST are private)
pub(crate) const BCRYPT_MIN_COST: u32 = 4;
pub(crate) const BCRYPT_MAX_COST: u32 = 31;

/// bcrypt hash with the configured cost (clamped to bcrypt's supported range)
pub fn hash_password(password: &str, cost: u32) -> Result<String, AuthError> {
    let cost = cost.clamp(BCRYPT_MIN_COST, BCRYPT_MAX_COST);
    Ok(bcrypt::hash(password, cost)?)
}

/// Check a password against a stored bcrypt hash. Malformed hashes never verify.
pub fn verify_password(password: &str, stored: &str) -> bool {
    match bcrypt::verify(password, stored) {
        Ok(matches) => matches,
        Err(e) => {
            tracing::warn!("Stored password hash could not be verified: {}", e);
            false
        }
    }
}

/// Hex SHA-256 digest, used for refresh tokens at rest
pub fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}
