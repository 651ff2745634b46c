use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

use echo_types::api::{
    ModerationCheckRequest, ModerationVerdict, SubmitConfessionRequest, SubmitConfessionResponse,
};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::submit::{MAX_CONTENT_CHARS, submit_confession};

pub async fn submit(
    State(state): State<AppState>,
    Json(req): Json<SubmitConfessionRequest>,
) -> ApiResult<impl IntoResponse> {
    let outcome = submit_confession(&state.db, &state.ai, req).await?;

    Ok((
        StatusCode::CREATED,
        Json(SubmitConfessionResponse {
            thread_id: outcome.thread.id,
            confession_id: outcome.confession.id,
            title: outcome.thread.title,
            is_explicit: outcome.verdict.is_explicit,
        }),
    ))
}

/// Advisory verdict for a draft. Nothing is stored.
pub async fn check(
    State(state): State<AppState>,
    Json(req): Json<ModerationCheckRequest>,
) -> ApiResult<Json<ModerationVerdict>> {
    if req.text.chars().count() > MAX_CONTENT_CHARS {
        return Err(ApiError::BadRequest(format!(
            "Text exceeds {} characters",
            MAX_CONTENT_CHARS
        )));
    }
    Ok(Json(state.ai.moderator.classify(&req.text).await))
}
