//! HTTP middleware stack for the storefront.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (hub per request, HTTP transaction)
//! 2. `TraceLayer` (request span with an empty `request_id` field)
//! 3. Request ID (fills the span field and the response header)
//! 4. Session layer (tower-sessions, in-memory store, signed cookie)
//!
//! Identity is not a layer: handlers ask for it through the extractors in
//! [`auth`], which resolve it at most once per request.

pub mod auth;
pub mod request_id;
pub mod session;

pub use auth::{OptionalAuth, RequireAdmin, RequireAuth, resolve_identity};
pub use request_id::{RequestId, request_id_middleware};
pub use session::create_session_layer;
