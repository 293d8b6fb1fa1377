pub mod password;

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::SecurityConfig;
use crate::database::models::{Role, User};

pub use password::{hash_password, verify_password};

pub const MIN_PASSWORD_LENGTH: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid username: {0}")]
    InvalidUsername(String),
    #[error("Invalid password: {0}")]
    InvalidPassword(String),
    #[error("Username '{0}' is already taken")]
    UsernameTaken(String),
    #[error("Registration is disabled")]
    RegistrationDisabled,
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error("{0}")]
    InvalidToken(String),
    #[error("JWT generation error: {0}")]
    TokenGeneration(String),
    #[error("JWT secret is not configured")]
    MissingSecret,
    #[error("Password hashing error: {0}")]
    Hashing(#[from] bcrypt::BcryptError),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Access token payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub username: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn new(user: &User, expiry_hours: u64) -> Self {
        let now = Utc::now();
        let exp = (now + Duration::hours(expiry_hours as i64)).timestamp();

        Self {
            sub: user.id,
            username: user.username.clone(),
            role: user.role(),
            iat: now.timestamp(),
            exp,
        }
    }
}

pub fn generate_jwt(claims: &Claims, security: &SecurityConfig) -> Result<String, AuthError> {
    if security.jwt_secret.is_empty() {
        return Err(AuthError::MissingSecret);
    }

    let encoding_key = EncodingKey::from_secret(security.jwt_secret.as_bytes());
    encode(&Header::default(), claims, &encoding_key)
        .map_err(|e| AuthError::TokenGeneration(e.to_string()))
}

/// Validate signature and expiry, returning the embedded claims
pub fn validate_jwt(token: &str, security: &SecurityConfig) -> Result<Claims, AuthError> {
    if security.jwt_secret.is_empty() {
        return Err(AuthError::MissingSecret);
    }

    let decoding_key = DecodingKey::from_secret(security.jwt_secret.as_bytes());
    let token_data = decode::<Claims>(token, &decoding_key, &Validation::default())
        .map_err(|e| AuthError::InvalidToken(format!("Invalid JWT token: {}", e)))?;

    Ok(token_data.claims)
}

/// Ensures username meets formatting requirements before account creation
pub fn validate_username_format(username: &str) -> Result<(), AuthError> {
    let invalid = |msg: &str| Err(AuthError::InvalidUsername(msg.to_string()));

    if username.is_empty() {
        return invalid("Username cannot be empty");
    }
    if username.len() < 3 {
        return invalid("Username must be at least 3 characters");
    }
    if username.len() > 50 {
        return invalid("Username must be less than 50 characters");
    }

    // Allow alphanumeric, underscore, hyphen
    if !username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return invalid("Username can only contain letters, numbers, underscore, and hyphen");
    }
    if !username.starts_with(|c: char| c.is_ascii_alphanumeric()) {
        return invalid("Username must start with a letter or number");
    }

    Ok(())
}

pub fn validate_password_strength(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::InvalidPassword(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    fn user(role: &str) -> User {
        User {
            id: 7,
            username: "alice".to_string(),
            password_hash: String::new(),
            role: role.to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn jwt_round_trips_claims() {
        let security = AppConfig::development().security;
        let claims = Claims::new(&user("admin"), 1);

        let token = generate_jwt(&claims, &security).unwrap();
        let decoded = validate_jwt(&token, &security).unwrap();
        assert_eq!(decoded, claims);
        assert_eq!(decoded.role, Role::Admin);
    }

    #[test]
    fn rejects_token_signed_with_other_secret() {
        let security = AppConfig::development().security;
        let token = generate_jwt(&Claims::new(&user("user"), 1), &security).unwrap();

        let mut other = security.clone();
        other.jwt_secret = "another-secret".to_string();
        assert!(matches!(validate_jwt(&token, &other), Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn rejects_expired_token() {
        let security = AppConfig::development().security;
        let mut claims = Claims::new(&user("user"), 1);
        claims.iat -= 7200;
        claims.exp -= 7200;

        let token = generate_jwt(&claims, &security).unwrap();
        assert!(matches!(validate_jwt(&token, &security), Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn empty_secret_is_refused() {
        let mut security = AppConfig::development().security;
        security.jwt_secret.clear();
        assert!(matches!(
            generate_jwt(&Claims::new(&user("user"), 1), &security),
            Err(AuthError::MissingSecret)
        ));
    }

    #[test]
    fn username_rules() {
        assert!(validate_username_format("alice_01").is_ok());
        assert!(validate_username_format("al").is_err());
        assert!(validate_username_format("_alice").is_err());
        assert!(validate_username_format("alice smith").is_err());
        assert!(validate_username_format(&"a".repeat(51)).is_err());
    }

    #[test]
    fn password_rules() {
        assert!(validate_password_strength("longenough").is_ok());
        assert!(validate_password_strength("short").is_err());
    }
}
