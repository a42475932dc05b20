pub mod auth;
pub mod cors;
pub mod extract;
pub mod instrumentation;
pub mod rate_limit;
pub mod response;
pub mod routes;
pub mod sanitize;
pub mod tenant;
pub mod threat;

pub use auth::authenticate;
pub use cors::cors_guard;
pub use instrumentation::{instrument_request, RequestId, REQUEST_ID_HEADER, RESPONSE_TIME_HEADER};
pub use rate_limit::rate_limit;
pub use response::{ApiResponse, ApiResult};
pub use routes::{Access, RouteCatalog, RouteSpec};
pub use sanitize::sanitize_input;
pub use tenant::resolve_tenant;
pub use threat::threat_guard;
