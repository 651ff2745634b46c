use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use echo_types::api::{CreatePollRequest, VoteRequest};
use echo_types::identity::participant_key;
use echo_types::models::PollVote;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const MAX_OPTIONS: usize = 10;

/// Trimmed, non-blank options; at least two are required.
fn clean_options(options: Vec<String>) -> Result<Vec<String>, ApiError> {
    let options: Vec<String> = options
        .into_iter()
        .map(|o| o.trim().to_string())
        .filter(|o| !o.is_empty())
        .collect();

    if options.len() < 2 {
        return Err(ApiError::BadRequest("A poll needs at least two options".into()));
    }
    if options.len() > MAX_OPTIONS {
        return Err(ApiError::BadRequest(format!(
            "A poll takes at most {} options",
            MAX_OPTIONS
        )));
    }
    Ok(options)
}

pub async fn create_poll(
    State(state): State<AppState>,
    Path(thread_id): Path<Uuid>,
    Json(req): Json<CreatePollRequest>,
) -> ApiResult<impl IntoResponse> {
    let question = req.question.trim().to_string();
    if question.is_empty() {
        return Err(ApiError::BadRequest("Question must not be empty".into()));
    }
    let options = clean_options(req.options)?;

    if state.threads.thread(thread_id).await?.is_none() {
        return Err(ApiError::NotFound(format!("thread {}", thread_id)));
    }

    let poll = state.threads.create_poll(thread_id, question, options).await?;
    Ok((StatusCode::CREATED, Json(poll)))
}

/// Replaces any earlier vote by the same identity.
pub async fn vote(
    State(state): State<AppState>,
    Path(poll_id): Path<Uuid>,
    Json(req): Json<VoteRequest>,
) -> ApiResult<Json<PollVote>> {
    if req.device_token.trim().is_empty() {
        return Err(ApiError::BadRequest("Missing device token".into()));
    }

    let poll = state
        .threads
        .poll(poll_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("poll {}", poll_id)))?;
    if req.option_index >= poll.options.len() {
        return Err(ApiError::BadRequest(format!(
            "Option {} does not exist",
            req.option_index
        )));
    }

    let vote = state
        .threads
        .vote(poll_id, participant_key(req.device_token.trim()), req.option_index)
        .await?;
    Ok(Json(vote))
}
