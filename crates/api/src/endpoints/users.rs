//! Users endpoints.

use axum::{Json, Router, extract::State, response::IntoResponse, routing::get};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::{Deserialize, Serialize};
use tracing::info;
use webpolls_common::AppResult;
use webpolls_core::UpdateUserInput;
use webpolls_db::entities::user;

use crate::{
    extractors::AuthUser,
    middleware::{AppState, SESSION_COOKIE},
    response::{self, ApiResponse},
};

/// User response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub created_at: String,
    pub updated_at: Option<String>,
}

impl From<user::Model> for UserResponse {
    fn from(user: user::Model) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            created_at: user.created_at.to_rfc3339(),
            updated_at: user.updated_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// Update profile request. Absent fields are left unchanged.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMeRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Get current user.
async fn me(AuthUser(user): AuthUser) -> ApiResponse<UserResponse> {
    ApiResponse::ok(user.into())
}

/// Update current user.
async fn update_me(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<UpdateMeRequest>,
) -> AppResult<ApiResponse<UserResponse>> {
    let input = UpdateUserInput {
        username: req.username,
        email: req.email,
        password: req.password,
    };

    let updated = state.user_service.update(user.id, input).await?;

    Ok(ApiResponse::ok(updated.into()))
}

/// Delete the current account with its polls and votes.
async fn delete_me(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    jar: CookieJar,
) -> AppResult<impl IntoResponse> {
    let owned: Vec<i32> = state
        .poll_service
        .list_polls_by_owner(user.id, None)
        .await?
        .into_iter()
        .map(|p| p.id)
        .collect();

    state.user_service.delete(user.id).await?;
    state.poll_service.announce_deleted(&owned);

    info!(user_id = user.id, polls = owned.len(), "Account deleted");

    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));

    Ok((jar, response::ok()))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/me", get(me).patch(update_me).delete(delete_me))
}
