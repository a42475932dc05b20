pub mod refresh_token;
pub mod tenant;
pub mod user;

pub use refresh_token::{DeviceFingerprint, NewRefreshToken, RefreshTokenRecord, RevokeReason};
pub use tenant::{Membership, Tenant};
pub use user::User;
