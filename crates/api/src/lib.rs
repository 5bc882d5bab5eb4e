//! HTTP API layer for webpolls.
//!
//! This crate provides the JSON API and live result streaming:
//!
//! - **Endpoints**: sign-up and sessions, account management, polls, votes
//! - **Extractors**: authenticated and optional callers
//! - **Middleware**: token and session-cookie authentication
//! - **Streaming**: Server-Sent Events fed by the broadcast hub
//!
//! Built on Axum 0.8 with Tower middleware stack.

pub mod endpoints;
pub mod extractors;
pub mod middleware;
pub mod response;
pub mod sse;

use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;

pub use endpoints::router;
pub use middleware::{AppState, auth_middleware};

/// Largest accepted request body. Poll and account payloads are small.
const MAX_BODY_BYTES: usize = 64 * 1024;

/// The API router with authentication applied and state attached.
pub fn app(state: AppState) -> Router {
    router()
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}
