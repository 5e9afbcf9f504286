mod finish;
mod results;
mod save;
mod take;

use axum::{routing::get, routing::post, Router};
use uuid::Uuid;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentStudent;
use crate::api::validation::parse_id;
use crate::core::state::AppState;
use crate::services::attempt_workflow::AttemptRef;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/:test_id/take", get(take::take_test))
        .route("/:test_id/retry", post(take::retry_test))
        .route("/:test_id/attempts/:attempt_id/save", post(save::save_answers))
        .route(
            "/:test_id/attempts/:attempt_id/finish",
            get(finish::review_finish).post(finish::finish_attempt),
        )
        .route("/:test_id/attempts/:attempt_id/results", get(results::get_results))
}

fn attempt_ref(
    student: &CurrentStudent,
    test_id: &str,
    attempt_id: &str,
) -> Result<AttemptRef, ApiError> {
    Ok(AttemptRef {
        student_id: student.student_id,
        test_id: parse_id("test_id", test_id)?,
        attempt_id: parse_id("attempt_id", attempt_id)?,
    })
}

fn results_url(state: &AppState, test_id: Uuid, attempt_id: Uuid) -> String {
    format!(
        "{}/tests/{test_id}/attempts/{attempt_id}/results",
        state.settings().api().api_v1_str
    )
}
