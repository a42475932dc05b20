// handlers/protected/auth/mod.rs - Session endpoints for the authenticated caller
pub mod logout; // POST /auth/logout
pub mod whoami; // GET /api/auth/whoami

pub use logout::logout_post;
pub use whoami::whoami_get;
