//! Authentication endpoints.

use axum::{Json, Router, extract::State, response::IntoResponse, routing::post};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::{Deserialize, Serialize};
use webpolls_common::{AppError, AppResult};
use webpolls_core::CreateUserInput;
use webpolls_db::entities::user;

use crate::{
    extractors::AuthUser,
    middleware::{AppState, SESSION_COOKIE},
    response::{self, ApiResponse},
};

/// Signup request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Signin request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SigninRequest {
    pub username: String,
    pub password: String,
}

/// Session response for signup and signin.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub id: i32,
    pub username: String,
    pub token: String,
}

/// Start a session: set the cookie and return the token.
fn start_session(
    state: &AppState,
    jar: CookieJar,
    user: user::Model,
) -> AppResult<(CookieJar, ApiResponse<SessionResponse>)> {
    let token = user
        .token
        .ok_or_else(|| AppError::Internal("User has no session token".to_string()))?;

    let jar = jar.add(state.session_cookie(token.clone()));

    Ok((
        jar,
        ApiResponse::ok(SessionResponse {
            id: user.id,
            username: user.username,
            token,
        }),
    ))
}

/// Create a new user account.
async fn signup(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<SignupRequest>,
) -> AppResult<(CookieJar, ApiResponse<SessionResponse>)> {
    let input = CreateUserInput {
        username: req.username,
        email: req.email,
        password: req.password,
    };

    let user = state.user_service.create(input).await?;

    start_session(&state, jar, user)
}

/// Sign in to an existing account.
async fn signin(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<SigninRequest>,
) -> AppResult<(CookieJar, ApiResponse<SessionResponse>)> {
    let user = state
        .user_service
        .authenticate(&req.username, &req.password)
        .await?;

    start_session(&state, jar, user)
}

/// Sign out (invalidate current token by regenerating).
async fn signout(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    jar: CookieJar,
) -> AppResult<impl IntoResponse> {
    state.user_service.regenerate_token(user.id).await?;

    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));

    Ok((jar, response::ok()))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/signin", post(signin))
        .route("/signout", post(signout))
}
