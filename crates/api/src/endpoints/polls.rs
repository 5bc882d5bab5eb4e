//! Poll endpoints.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
};
use serde::{Deserialize, Serialize};
use webpolls_common::AppResult;
use webpolls_core::{CreatePollInput, PollResult};
use webpolls_db::entities::poll_option;

use crate::{
    extractors::{AuthUser, MaybeAuthUser},
    middleware::AppState,
    response::{self, ApiResponse},
    sse,
};

/// Create poll request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePollRequest {
    pub question: String,
    pub options: Vec<String>,
}

/// Vote request. A missing `optionId` is rejected by the vote engine.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    #[serde(default)]
    pub option_id: Option<i32>,
}

/// Update option request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOptionRequest {
    pub content: String,
}

/// Poll option response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionResponse {
    pub id: i32,
    pub poll_id: i32,
    pub content: String,
}

impl From<poll_option::Model> for OptionResponse {
    fn from(option: poll_option::Model) -> Self {
        Self {
            id: option.id,
            poll_id: option.poll_id,
            content: option.content,
        }
    }
}

/// List every poll, newest first.
async fn list_polls(
    viewer: MaybeAuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<Vec<PollResult>>> {
    let polls = state.poll_service.list_polls(viewer.id()).await?;
    Ok(ApiResponse::ok(polls))
}

/// List the caller's own polls.
async fn my_polls(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<Vec<PollResult>>> {
    let polls = state
        .poll_service
        .list_polls_by_owner(user.id, Some(user.id))
        .await?;
    Ok(ApiResponse::ok(polls))
}

/// Create a poll.
async fn create_poll(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<CreatePollRequest>,
) -> AppResult<(StatusCode, ApiResponse<PollResult>)> {
    let input = CreatePollInput {
        question: req.question,
        options: req.options,
    };

    let poll = state.poll_service.create_poll(user.id, input).await?;

    Ok(ApiResponse::created(poll))
}

/// Show one poll's results.
async fn show_poll(
    viewer: MaybeAuthUser,
    State(state): State<AppState>,
    Path(poll_id): Path<i32>,
) -> AppResult<ApiResponse<PollResult>> {
    let poll = state.poll_service.get_poll(poll_id, viewer.id()).await?;
    Ok(ApiResponse::ok(poll))
}

/// Delete a poll.
async fn delete_poll(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(poll_id): Path<i32>,
) -> AppResult<impl IntoResponse> {
    state.poll_service.delete_poll(poll_id, user.id).await?;
    Ok(response::ok())
}

/// Vote on a poll.
///
/// Anonymous callers are let through to the poll service, which rejects
/// them with `401`.
async fn vote(
    viewer: MaybeAuthUser,
    State(state): State<AppState>,
    Path(poll_id): Path<i32>,
    Json(req): Json<VoteRequest>,
) -> AppResult<ApiResponse<PollResult>> {
    let poll = state
        .poll_service
        .vote(poll_id, req.option_id.unwrap_or_default(), viewer.id())
        .await?;
    Ok(ApiResponse::ok(poll))
}

/// Change an option's text.
async fn update_option(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path((poll_id, option_id)): Path<(i32, i32)>,
    Json(req): Json<UpdateOptionRequest>,
) -> AppResult<ApiResponse<OptionResponse>> {
    let option = state
        .poll_service
        .update_option(option_id, poll_id, &req.content, user.id)
        .await?;

    Ok(ApiResponse::ok(option.into()))
}

/// Delete an option.
async fn delete_option(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path((poll_id, option_id)): Path<(i32, i32)>,
) -> AppResult<impl IntoResponse> {
    state
        .poll_service
        .delete_option(option_id, poll_id, user.id)
        .await?;
    Ok(response::ok())
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_polls).post(create_poll))
        .route("/mine", get(my_polls))
        .route("/{id}", get(show_poll).delete(delete_poll))
        .route("/{id}/vote", post(vote))
        .route("/{id}/events", get(sse::poll_events))
        .route(
            "/{id}/options/{option_id}",
            patch(update_option).delete(delete_option),
        )
}
