// handlers/public/mod.rs - Public handlers (no authentication required)
//
// Route Prefix: no /api prefix (/health, /auth/*)
pub mod auth;
pub mod health;

pub use health::health;
