use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::api::errors::ApiError;
use crate::api::guards::{CurrentStudent, IdentityCookie};
use crate::api::validation::{parse_id, parse_optional_id};
use crate::core::state::AppState;
use crate::schemas::attempt::{AttemptSummary, InProgressView, TakeQuery, TakeResponse};
use crate::services::attempt_workflow::{self, TakeOutcome};

pub(super) async fn take_test(
    Path(test_id): Path<String>,
    Query(query): Query<TakeQuery>,
    student: CurrentStudent,
    State(state): State<AppState>,
) -> Result<(IdentityCookie, Json<TakeResponse>), ApiError> {
    let test_id = parse_id("test_id", &test_id)?;
    let attempt_id = parse_optional_id("attempt_id", query.attempt_id.as_deref())?;

    let outcome = attempt_workflow::take(&state, student.student_id, test_id, attempt_id).await?;

    let response = match outcome {
        TakeOutcome::InProgress(view) => TakeResponse::InProgress(InProgressView::from(&view)),
        TakeOutcome::Completed(attempt) => TakeResponse::Completed {
            results_url: super::results_url(&state, attempt.test_id, attempt.id),
            attempt: AttemptSummary::from(&attempt),
        },
    };

    Ok((student.cookie(), Json(response)))
}

pub(super) async fn retry_test(
    Path(test_id): Path<String>,
    student: CurrentStudent,
    State(state): State<AppState>,
) -> Result<(StatusCode, IdentityCookie, Json<AttemptSummary>), ApiError> {
    let test_id = parse_id("test_id", &test_id)?;

    let resolved = attempt_workflow::retry(&state, student.student_id, test_id).await?;
    let status = if resolved.created { StatusCode::CREATED } else { StatusCode::OK };

    Ok((status, student.cookie(), Json(AttemptSummary::from(&resolved.attempt))))
}
