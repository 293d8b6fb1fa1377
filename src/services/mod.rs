pub mod auth_service;
pub mod catalog_service;

pub use auth_service::{cleanup_expired_tokens, spawn_token_cleanup, AuthService, TokenPair};
pub use catalog_service::{CatalogEntity, CatalogError, CatalogInput, CatalogService, DeleteOutcome};
