// handlers/protected/mod.rs - Protected handlers (bearer token required)
//
// Route Prefix: /api/* plus /auth/logout
pub mod auth; // Session endpoints for the authenticated caller
pub mod workspace; // Tenant-scoped endpoints
