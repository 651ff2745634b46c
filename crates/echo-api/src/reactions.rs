use axum::{
    Json,
    extract::{Path, State},
};
use uuid::Uuid;

use echo_types::api::{ReactRequest, ReactResponse};
use echo_types::identity::participant_key;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Reacting twice is not an error; the second call reports `added: false`.
pub async fn react(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Json(req): Json<ReactRequest>,
) -> ApiResult<Json<ReactResponse>> {
    if req.device_token.trim().is_empty() {
        return Err(ApiError::BadRequest("Missing device token".into()));
    }

    let added = state
        .threads
        .react(message_id, participant_key(req.device_token.trim()))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("message {}", message_id)))?;

    Ok(Json(ReactResponse { added }))
}
