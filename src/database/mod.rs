pub mod directories;
pub mod manager;
pub mod models;
pub mod rate_limits;
pub mod refresh_tokens;

pub use directories::{PgTenantDirectory, PgUserDirectory};
pub use manager::{bounded, DatabaseError, DatabaseManager};
pub use rate_limits::PgRateLimitStore;
pub use refresh_tokens::PgRefreshTokenStore;
