use axum::{
    extract::{Path, State},
    Json,
};

use crate::api::errors::ApiError;
use crate::api::guards::{CurrentStudent, IdentityCookie};
use crate::core::state::AppState;
use crate::schemas::attempt::ResultsResponse;
use crate::services::attempt_workflow;

pub(super) async fn get_results(
    Path((test_id, attempt_id)): Path<(String, String)>,
    student: CurrentStudent,
    State(state): State<AppState>,
) -> Result<(IdentityCookie, Json<ResultsResponse>), ApiError> {
    let target = super::attempt_ref(&student, &test_id, &attempt_id)?;

    let view = attempt_workflow::results(&state, target).await?;

    Ok((student.cookie(), Json(ResultsResponse::from(view))))
}
