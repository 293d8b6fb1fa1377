pub mod migrate;
pub mod ordering;
pub mod tokens;
pub mod user;
