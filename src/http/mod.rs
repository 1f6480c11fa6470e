//! HTTP surface: client identity, the per-route throttle middleware and the
//! rate-limit response contract.

mod audit;
mod error;
mod handlers;
mod identity;
mod middleware;
mod router;
mod server;
mod state;


pub use error::{ApiError, RateLimitHeaders, X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING, X_RATELIMIT_RESET};
pub use identity::{client_identity, ClientIdentity};
pub use middleware::{enforce, RouteThrottle};
pub use router::app_router;
pub use server::HttpServer;
pub use state::AppState;
