mod handlers;

use axum::{routing::get, Router};

use crate::core::state::AppState;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/users/:user_id/attempts", get(handlers::list_user_attempts))
        .route("/users/:user_id/stats", get(handlers::user_stats))
        .route("/attempts/:attempt_id", get(handlers::get_attempt))
        .route("/attempts/:attempt_id/snapshot", get(handlers::get_archived_snapshot))
}
