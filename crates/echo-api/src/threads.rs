use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use echo_types::api::{SendMessageRequest, ThreadResponse};
use echo_types::identity::participant_key;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::submit::MAX_CONTENT_CHARS;

#[derive(Debug, Deserialize)]
pub struct ThreadViewQuery {
    /// Device token of the viewer; scopes `has_reacted` and `my_vote`.
    pub viewer: Option<String>,
}

pub async fn get_thread(
    State(state): State<AppState>,
    Path(thread_id): Path<Uuid>,
    Query(query): Query<ThreadViewQuery>,
) -> ApiResult<Json<ThreadResponse>> {
    let viewer = query
        .viewer
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(participant_key);

    let (thread, view) = state
        .threads
        .view(thread_id, viewer)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("thread {}", thread_id)))?;

    Ok(Json(ThreadResponse { thread, view }))
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(thread_id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    let content = req.content.trim().to_string();
    if content.is_empty() {
        return Err(ApiError::BadRequest("Message must not be empty".into()));
    }
    if content.chars().count() > MAX_CONTENT_CHARS {
        return Err(ApiError::BadRequest(format!(
            "Message exceeds {} characters",
            MAX_CONTENT_CHARS
        )));
    }
    if req.device_token.trim().is_empty() {
        return Err(ApiError::BadRequest("Missing device token".into()));
    }

    if state.threads.thread(thread_id).await?.is_none() {
        return Err(ApiError::NotFound(format!("thread {}", thread_id)));
    }

    let outcome = state
        .threads
        .append(thread_id, content, participant_key(req.device_token.trim()))
        .await?;

    Ok((StatusCode::CREATED, Json(outcome.message)))
}
