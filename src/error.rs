// HTTP API Error Types
use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::auth::AuthError;
use crate::database::DatabaseError;
use crate::ordering::OrderingError;
use crate::services::CatalogError;

/// Error taxonomy shared by the engine, the services and the HTTP layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    ValidationError,
    NotFoundError,
    ConflictError,
    DatabaseError,
    AuthenticationError,
    AuthorizationError,
}

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),
    ValidationError {
        message: String,
        field_errors: Option<HashMap<String, String>>,
    },

    // 401 Unauthorized
    Unauthorized(String),

    // 403 Forbidden
    Forbidden(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict
    Conflict(String),

    // 500 Internal Server Error
    InternalServerError(String),
    /// Storage failure; the detail only reaches clients outside production
    Storage(String),

    // 503 Service Unavailable
    ServiceUnavailable(String),
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::ValidationError { .. } => 400,
            ApiError::Unauthorized(_) => 401,
            ApiError::Forbidden(_) => 403,
            ApiError::NotFound(_) => 404,
            ApiError::Conflict(_) => 409,
            ApiError::InternalServerError(_) | ApiError::Storage(_) => 500,
            ApiError::ServiceUnavailable(_) => 503,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::ValidationError { message, .. } => message,
            ApiError::Unauthorized(msg) => msg,
            ApiError::Forbidden(msg) => msg,
            ApiError::NotFound(msg) => msg,
            ApiError::Conflict(msg) => msg,
            ApiError::InternalServerError(msg) => msg,
            ApiError::Storage(_) => "An error occurred while processing your request",
            ApiError::ServiceUnavailable(msg) => msg,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::BadRequest(_) | ApiError::ValidationError { .. } => ErrorKind::ValidationError,
            ApiError::Unauthorized(_) => ErrorKind::AuthenticationError,
            ApiError::Forbidden(_) => ErrorKind::AuthorizationError,
            ApiError::NotFound(_) => ErrorKind::NotFoundError,
            ApiError::Conflict(_) => ErrorKind::ConflictError,
            ApiError::InternalServerError(_) | ApiError::Storage(_) | ApiError::ServiceUnavailable(_) => {
                ErrorKind::DatabaseError
            }
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::ValidationError { .. } => "VALIDATION_ERROR",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::InternalServerError(_) | ApiError::Storage(_) => "INTERNAL_SERVER_ERROR",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        let mut error = json!({
            "kind": self.kind(),
            "code": self.error_code(),
            "message": self.message(),
        });

        if let ApiError::ValidationError {
            field_errors: Some(field_errors),
            ..
        } = self
        {
            error["field_errors"] = json!(field_errors);
        }

        json!({
            "success": false,
            "error": error,
        })
    }
}

// Static constructor methods
impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn validation_error(
        message: impl Into<String>,
        field_errors: Option<HashMap<String, String>>,
    ) -> Self {
        ApiError::ValidationError {
            message: message.into(),
            field_errors,
        }
    }

    pub fn field_error(field: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        let mut field_errors = HashMap::new();
        field_errors.insert(field.to_string(), message.clone());
        ApiError::validation_error(message, Some(field_errors))
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Conflict(message.into())
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }

    /// Storage failures: log the real error and keep it as the detail
    fn storage(context: &str, detail: &dyn std::fmt::Display) -> Self {
        tracing::error!("{}: {}", context, detail);
        ApiError::Storage(format!("{}: {}", context, detail))
    }
}

// Convert other error types to ApiError
impl From<OrderingError> for ApiError {
    fn from(err: OrderingError) -> Self {
        match err {
            OrderingError::Validation(msg) => ApiError::validation_error(msg, None),
            OrderingError::NotFound(msg) => ApiError::not_found(msg),
            OrderingError::Conflict(msg) => ApiError::conflict(msg),
            OrderingError::Database(e) => ApiError::storage("Ordering database error", &e),
        }
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound(msg) => ApiError::not_found(msg),
            DatabaseError::InvalidDatabaseUrl(_) => {
                ApiError::service_unavailable("Database temporarily unavailable")
            }
            DatabaseError::MigrationError(msg) => {
                tracing::error!("Migration error: {}", msg);
                ApiError::service_unavailable("Service is being updated, please try again later")
            }
            DatabaseError::Sqlx(e) => ApiError::storage("Database error", &e),
        }
    }
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::Validation { field, message } => ApiError::field_error(field, message),
            CatalogError::NotFound(msg) => ApiError::not_found(msg),
            CatalogError::Conflict(msg) => ApiError::conflict(msg),
            CatalogError::Ordering(e) => e.into(),
            CatalogError::Database(e) => ApiError::storage("Catalog database error", &e),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidUsername(msg) => ApiError::field_error("username", msg),
            AuthError::InvalidPassword(msg) => ApiError::field_error("password", msg),
            AuthError::UsernameTaken(name) => {
                ApiError::conflict(format!("Username '{}' is already taken", name))
            }
            AuthError::RegistrationDisabled => ApiError::forbidden("Registration is disabled"),
            AuthError::InvalidCredentials => ApiError::unauthorized("Invalid username or password"),
            AuthError::InvalidToken(msg) => ApiError::unauthorized(msg),
            AuthError::TokenGeneration(msg) => {
                tracing::error!("JWT generation error: {}", msg);
                ApiError::internal_server_error("Failed to issue token")
            }
            AuthError::Hashing(e) => {
                tracing::error!("Password hashing error: {}", e);
                ApiError::internal_server_error("Failed to process password")
            }
            AuthError::MissingSecret => {
                tracing::error!("JWT secret is not configured");
                ApiError::internal_server_error("Authentication is not configured")
            }
            AuthError::Database(e) => ApiError::storage("Auth database error", &e),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

/// Response extension carrying the text of a storage failure. The router
/// swaps it into the error body unless it runs with a production config.
#[derive(Debug, Clone)]
pub struct StorageErrorDetail(pub String);

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, Json(self.to_json())).into_response();
        if let ApiError::Storage(detail) = self {
            response.extensions_mut().insert(StorageErrorDetail(detail));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_errors_map_to_statuses() {
        let cases = [
            (OrderingError::Validation("bad".into()), 400, ErrorKind::ValidationError),
            (OrderingError::NotFound("gone".into()), 404, ErrorKind::NotFoundError),
            (OrderingError::Conflict("dup".into()), 409, ErrorKind::ConflictError),
            (OrderingError::Database(sqlx::Error::PoolClosed), 500, ErrorKind::DatabaseError),
        ];
        for (err, status, kind) in cases {
            let api: ApiError = err.into();
            assert_eq!(api.status_code(), status);
            assert_eq!(api.kind(), kind);
        }
    }

    #[test]
    fn forbidden_is_an_authorization_error() {
        let api = ApiError::forbidden("not yours");
        assert_eq!(api.status_code(), 403);
        let body = api.to_json();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["kind"], "AuthorizationError");
        assert_eq!(body["error"]["message"], "not yours");
    }

    #[test]
    fn storage_errors_hide_detail_in_body() {
        let api: ApiError = OrderingError::Database(sqlx::Error::PoolClosed).into();
        assert_eq!(api.status_code(), 500);
        assert_eq!(api.to_json()["error"]["message"], "An error occurred while processing your request");

        let response = api.into_response();
        let detail = response.extensions().get::<StorageErrorDetail>().unwrap();
        assert!(detail.0.starts_with("Ordering database error"));
    }

    #[test]
    fn field_errors_are_included() {
        let body = ApiError::field_error("name", "Name is required").to_json();
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(body["error"]["field_errors"]["name"], "Name is required");
    }
}
