pub mod catalog;
pub mod user;

pub use catalog::{CatalogRecord, ChildDetail};
pub use user::{Role, User};
