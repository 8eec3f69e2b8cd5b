/// Tower middleware module
///
/// - `tower_rate_limiter` fixed-window rate limiting per policy and path scope
/// - `app_service`        body buffering and routing, the innermost service
pub mod app_service;
pub mod tower_rate_limiter;

pub use app_service::AppService;
pub use tower_rate_limiter::{ClientIdentity, PathScope, RateLimiterLayer, RateLimiterService};
