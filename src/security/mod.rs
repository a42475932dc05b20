pub mod client_ip;
pub mod cors;
pub mod rate_limit;
pub mod sanitize;
pub mod threat;

pub use client_ip::ClientIp;
pub use cors::CorsPolicyGuard;
pub use rate_limit::{RateLimitDecision, RateLimitExceeded, RateLimitPolicy, RateLimitStore, RateLimiter};
pub use sanitize::SanitizedParams;
pub use threat::{MemorySuspiciousIps, SuspiciousIpRegistry, ThreatDetector};
