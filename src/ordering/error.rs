use thiserror::Error;

use crate::error::ErrorKind;

/// Ordering engine errors. Every variant is raised before or instead of a
/// commit, so the caller never observes a partially applied reindex.
#[derive(Debug, Error)]
pub enum OrderingError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),
}

pub type OrderingResult<T> = Result<T, OrderingError>;

impl OrderingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrderingError::Validation(_) => ErrorKind::ValidationError,
            OrderingError::NotFound(_) => ErrorKind::NotFoundError,
            OrderingError::Conflict(_) => ErrorKind::ConflictError,
            OrderingError::Database(_) => ErrorKind::DatabaseError,
        }
    }
}

/// SQLITE_BUSY / SQLITE_LOCKED and their extended codes
const LOCK_CODES: &[&str] = &["5", "6", "261", "262", "517"];

/// Unique violations and lock timeouts surface as conflicts: inside the engine
/// they mean a concurrent writer won the race for the parent's ordering and the
/// caller should retry.
impl From<sqlx::Error> for OrderingError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                tracing::warn!("Ordering unique constraint violated: {}", db.message());
                OrderingError::Conflict(
                    "Membership order was modified concurrently, please retry".to_string(),
                )
            }
            sqlx::Error::Database(db) if db.code().is_some_and(|code| LOCK_CODES.contains(&code.as_ref())) => {
                tracing::warn!("Ordering write lock not acquired: {}", db.message());
                OrderingError::Conflict(
                    "Membership order is being modified by another request, please retry".to_string(),
                )
            }
            _ => OrderingError::Database(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_kinds() {
        assert_eq!(OrderingError::Validation("x".into()).kind(), ErrorKind::ValidationError);
        assert_eq!(OrderingError::NotFound("x".into()).kind(), ErrorKind::NotFoundError);
        assert_eq!(OrderingError::Conflict("x".into()).kind(), ErrorKind::ConflictError);
        assert_eq!(
            OrderingError::from(sqlx::Error::RowNotFound).kind(),
            ErrorKind::DatabaseError
        );
    }
}
