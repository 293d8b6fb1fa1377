use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::password::sha256_hex;
use crate::auth::{
    generate_jwt, hash_password, validate_password_strength, validate_username_format, verify_password,
    AuthError, Claims,
};
use crate::config::SecurityConfig;
use crate::database::models::{Role, User};

/// Tokens handed to a client after login or refresh
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    /// Access token lifetime in seconds
    pub expires_in: u64,
    pub user: User,
}

pub struct AuthService {
    pool: SqlitePool,
    security: SecurityConfig,
}

impl AuthService {
    pub fn new(pool: SqlitePool, security: SecurityConfig) -> Self {
        Self { pool, security }
    }

    /// Self-service signup; always creates a plain user
    pub async fn register(&self, username: &str, password: &str) -> Result<User, AuthError> {
        if !self.security.allow_registration {
            return Err(AuthError::RegistrationDisabled);
        }
        self.create_user(username, password, Role::User).await
    }

    pub async fn create_user(&self, username: &str, password: &str, role: Role) -> Result<User, AuthError> {
        let username = username.trim();
        validate_username_format(username)?;
        validate_password_strength(password)?;

        let password_hash = hash_password(password, self.security.bcrypt_cost)?;
        let now = Utc::now();

        let result = sqlx::query(
            "INSERT INTO users (username, password_hash, role, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(username)
        .bind(&password_hash)
        .bind(role.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await;

        let id = match result {
            Ok(done) => done.last_insert_rowid(),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                return Err(AuthError::UsernameTaken(username.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        info!("Created {} account '{}' ({})", role, username, id);
        self.find_user(id)
            .await?
            .ok_or(AuthError::Database(sqlx::Error::RowNotFound))
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<TokenPair, AuthError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ?")
            .bind(username.trim())
            .fetch_optional(&self.pool)
            .await?;

        // Same error for unknown user and wrong password
        let user = match user {
            Some(user) if verify_password(password, &user.password_hash) => user,
            _ => {
                debug!("Rejected login for '{}'", username);
                return Err(AuthError::InvalidCredentials);
            }
        };

        let refresh_token = self.store_refresh_token(&self.pool, user.id).await?;
        info!("User '{}' logged in", user.username);
        self.issue(user, refresh_token)
    }

    /// Exchange a refresh token for a new pair. The presented token is consumed.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let mut tx = self.pool.begin().await?;

        // Consume first: the delete takes the write lock, and only one caller
        // can ever get the row back
        let row = sqlx::query_as::<_, (i64, i64)>(
            "DELETE FROM refresh_tokens WHERE token_hash = ? RETURNING user_id, expires_at",
        )
        .bind(sha256_hex(refresh_token))
        .fetch_optional(&mut *tx)
        .await?;

        let Some((user_id, expires_at)) = row else {
            return Err(AuthError::InvalidToken("Invalid refresh token".to_string()));
        };

        if expires_at <= Utc::now().timestamp() {
            tx.commit().await?;
            return Err(AuthError::InvalidToken("Refresh token has expired".to_string()));
        }

        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AuthError::InvalidToken("Refresh token owner no longer exists".to_string()))?;

        let next = self.store_refresh_token(&mut *tx, user.id).await?;
        tx.commit().await?;

        debug!("Rotated refresh token for '{}'", user.username);
        self.issue(user, next)
    }

    /// Revoke every refresh token held by the user. Returns how many were revoked.
    pub async fn logout(&self, user_id: i64) -> Result<u64, AuthError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        info!("Revoked {} refresh tokens for user {}", result.rows_affected(), user_id);
        Ok(result.rows_affected())
    }

    pub async fn find_user(&self, user_id: i64) -> Result<Option<User>, AuthError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    pub async fn cleanup_expired_tokens(&self) -> Result<u64, AuthError> {
        Ok(cleanup_expired_tokens(&self.pool).await?)
    }

    fn issue(&self, user: User, refresh_token: String) -> Result<TokenPair, AuthError> {
        let claims = Claims::new(&user, self.security.jwt_expiry_hours);
        let access_token = generate_jwt(&claims, &self.security)?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            token_type: "Bearer",
            expires_in: self.security.jwt_expiry_hours * 3600,
            user,
        })
    }

    async fn store_refresh_token<'e, E>(&self, executor: E, user_id: i64) -> Result<String, AuthError>
    where
        E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
    {
        let token = Uuid::new_v4().simple().to_string();
        let expires_at = Utc::now().timestamp() + (self.security.refresh_token_expiry_days as i64) * 86_400;

        sqlx::query("INSERT INTO refresh_tokens (user_id, token_hash, expires_at, created_at) VALUES (?, ?, ?, ?)")
            .bind(user_id)
            .bind(sha256_hex(&token))
            .bind(expires_at)
            .bind(Utc::now())
            .execute(executor)
            .await?;
        Ok(token)
    }
}

pub async fn cleanup_expired_tokens(pool: &SqlitePool) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= ?")
        .bind(Utc::now().timestamp())
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Periodically purge expired refresh tokens. Failures are logged and retried
/// on the next tick.
pub fn spawn_token_cleanup(pool: SqlitePool, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            if pool.is_closed() {
                break;
            }
            match cleanup_expired_tokens(&pool).await {
                Ok(0) => {}
                Ok(n) => info!("Purged {} expired refresh tokens", n),
                Err(e) => warn!("Refresh token cleanup failed: {}", e),
            }
        }
    })
}
