// handlers/mod.rs - Two-tier handler layout
//
// Public (no auth) → Protected (JWT auth). Ownership checks for protocols and
// sections happen inside the protected handlers.
pub mod protected; // JWT authentication required (/api/*)
pub mod public; // No authentication required (/auth/*)
