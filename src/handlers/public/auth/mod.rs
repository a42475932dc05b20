// handlers/public/auth/mod.rs - Token acquisition endpoints
pub mod login; // POST /auth/login - authenticate and get tokens
pub mod refresh; // POST /auth/refresh - explicit access token renewal

pub use login::login_post;
pub use refresh::refresh_post;
