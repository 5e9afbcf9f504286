use axum::{
    extract::{Path, State},
    Json,
};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{CurrentStudent, IdentityCookie};
use crate::api::validation::parse_selections;
use crate::core::state::AppState;
use crate::schemas::attempt::{AttemptSummary, FinishNextStep, FinishRequest, FinishResponse};
use crate::services::attempt_workflow::{self, FinishOutcome};

pub(super) async fn review_finish(
    Path((test_id, attempt_id)): Path<(String, String)>,
    student: CurrentStudent,
    State(state): State<AppState>,
) -> Result<(IdentityCookie, Json<FinishResponse>), ApiError> {
    let target = super::attempt_ref(&student, &test_id, &attempt_id)?;

    let outcome = attempt_workflow::review(&state, target).await?;

    Ok((student.cookie(), Json(finish_response(&state, outcome))))
}

pub(super) async fn finish_attempt(
    Path((test_id, attempt_id)): Path<(String, String)>,
    student: CurrentStudent,
    State(state): State<AppState>,
    Json(payload): Json<FinishRequest>,
) -> Result<(IdentityCookie, Json<FinishResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let target = super::attempt_ref(&student, &test_id, &attempt_id)?;
    let selections = payload.answers.as_ref().map(parse_selections).transpose()?;

    let outcome =
        attempt_workflow::finish(&state, target, selections.as_ref(), payload.force).await?;

    Ok((student.cookie(), Json(finish_response(&state, outcome))))
}

fn finish_response(state: &AppState, outcome: FinishOutcome) -> FinishResponse {
    match outcome {
        FinishOutcome::Completed { attempt, forced } => FinishResponse {
            next_step: FinishNextStep::Results,
            results_url: Some(super::results_url(state, attempt.test_id, attempt.id)),
            attempt: AttemptSummary::from(&attempt),
            forced,
            total_questions: None,
            missing_count: 0,
            missing: Vec::new(),
        },
        FinishOutcome::NeedsConfirmation { attempt, missing, total_questions } => {
            FinishResponse {
                next_step: FinishNextStep::Confirm,
                results_url: None,
                attempt: AttemptSummary::from(&attempt),
                forced: false,
                total_questions: Some(total_questions),
                missing_count: missing.len(),
                missing,
            }
        }
    }
}
