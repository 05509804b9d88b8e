//! HTTP middleware stack.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layer (capture errors)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (add unique ID to each request)
//! 4. Rate limiting on auth routes (governor)

pub mod auth;
pub mod rate_limit;
pub mod request_id;
pub mod session;

pub use auth::{AuthRejection, OptionalAuth, RequireAuth};
pub use rate_limit::auth_rate_limiter;
pub use request_id::request_id_middleware;
pub use session::{
    SESSION_COOKIE_NAME, clear_session_cookie, session_cookie, session_token, set_session_cookie,
};
