//! API endpoints.

mod auth;
mod polls;
mod users;

use axum::Router;

use crate::middleware::AppState;
use crate::sse;

/// Create the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(auth::router())
        .merge(sse::router())
        .nest("/users", users::router())
        .nest("/polls", polls::router())
}
