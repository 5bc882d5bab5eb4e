//! API middleware.

use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{Request, header},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use tracing::debug;
use webpolls_common::Config;
use webpolls_core::{PollService, UserService};

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "webpolls_session";

/// Application state.
#[derive(Clone)]
pub struct AppState {
    pub user_service: UserService,
    pub poll_service: PollService,
    /// Mark the session cookie `Secure`.
    pub cookie_secure: bool,
    /// Interval between keep-alive comments on live streams.
    pub keep_alive: Duration,
}

impl AppState {
    /// Build the state from services and configuration.
    #[must_use]
    pub fn new(user_service: UserService, poll_service: PollService, config: &Config) -> Self {
        Self {
            user_service,
            poll_service,
            cookie_secure: config.server.cookie_secure,
            keep_alive: Duration::from_secs(config.broadcast.keep_alive_secs),
        }
    }

    /// Session cookie carrying `token`.
    #[must_use]
    pub fn session_cookie(&self, token: String) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, token))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.cookie_secure)
            .build()
    }
}

/// Authentication middleware.
///
/// Resolves the caller from an `Authorization: Bearer` header or, failing
/// that, the session cookie, and stores the user in request extensions.
/// Unknown tokens are ignored; handlers decide whether a user is required.
pub async fn auth_middleware(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string)
        .or_else(|| jar.get(SESSION_COOKIE).map(|c| c.value().to_string()));

    if let Some(token) = token {
        match state.user_service.authenticate_by_token(&token).await {
            Ok(user) => {
                req.extensions_mut().insert(user);
            }
            Err(e) => debug!(error = %e, "Ignoring invalid session token"),
        }
    }

    next.run(req).await
}
