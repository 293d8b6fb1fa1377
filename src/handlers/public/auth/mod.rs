// handlers/public/auth/mod.rs - Public authentication handlers

pub mod login; // POST /auth/login - authenticate and get tokens
pub mod refresh; // POST /auth/refresh - rotate refresh token
pub mod register; // POST /auth/register - create new account

pub use login::login;
pub use refresh::refresh;
pub use register::register;
