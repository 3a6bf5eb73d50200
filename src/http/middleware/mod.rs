//! HTTP middleware.
//!
//! # Data Flow
//! ```text
//! global (server.rs, outermost first):
//!     context → body limit → logger → recovery → cors
//! per group / route (router.rs):
//!     auth → admin / api key → rate limit
//! ```

pub mod auth;
pub mod body_limit;
pub mod context;
pub mod logger;
pub mod rate_limit;
pub mod recovery;

pub use auth::{require_admin, require_api_key, require_auth};
pub use body_limit::{body_limit_middleware, BodyLimit};
pub use context::{context_middleware, ensure_context, ContextState, X_TRACE_ID};
pub use logger::logger_middleware;
pub use rate_limit::RateLimiter;
pub use recovery::recovery_middleware;
