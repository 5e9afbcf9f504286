use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{CurrentStudent, IdentityCookie};
use crate::api::validation::parse_selections;
use crate::core::state::AppState;
use crate::schemas::attempt::{SaveAnswersRequest, SaveAnswersResponse};
use crate::services::attempt_workflow;

pub(super) async fn save_answers(
    Path((test_id, attempt_id)): Path<(String, String)>,
    student: CurrentStudent,
    State(state): State<AppState>,
    Json(payload): Json<SaveAnswersRequest>,
) -> Result<(IdentityCookie, Json<SaveAnswersResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let target = super::attempt_ref(&student, &test_id, &attempt_id)?;
    let selections = parse_selections(&payload.answers)?;

    enforce_save_rate_limit(&state, target.attempt_id).await?;

    let outcome = attempt_workflow::save(&state, target, &selections).await?;

    Ok((
        student.cookie(),
        Json(SaveAnswersResponse {
            attempt_id: outcome.attempt.id,
            revision: outcome.revision,
            saved: outcome.saved,
            ignored_answer_ids: outcome.ignored,
        }),
    ))
}

/// Fails open: answers are never dropped because the limiter is unreachable.
async fn enforce_save_rate_limit(state: &AppState, attempt_id: Uuid) -> Result<(), ApiError> {
    let limits = state.settings().attempts();
    let rate_key = format!("save:{attempt_id}");

    let allowed = match state
        .redis()
        .rate_limit(&rate_key, limits.save_rate_limit, limits.save_rate_window_seconds)
        .await
    {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(error = %err, attempt_id = %attempt_id, "Save rate limit check failed");
            true
        }
    };

    if allowed {
        Ok(())
    } else {
        Err(ApiError::TooManyRequests("Too many saves for this attempt; slow down"))
    }
}
