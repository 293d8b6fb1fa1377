// handlers/public/mod.rs - Public handlers (no authentication required)
//
// Token acquisition endpoints. Route prefix: /auth/*

pub mod auth;
