use axum::{
    extract::{Path, State},
    Json,
};

use crate::api::errors::ApiError;
use crate::api::guards::InternalCaller;
use crate::api::validation::parse_id;
use crate::core::state::AppState;
use crate::db::models::TestAttempt;
use crate::repositories;
use crate::schemas::stats::{
    ArchivedSnapshotResponse, AttemptDetailResponse, AttemptListItem, UserStatsResponse,
};
use crate::services::{archival, attempt_stats};

pub(super) async fn list_user_attempts(
    Path(user_id): Path<String>,
    _caller: InternalCaller,
    State(state): State<AppState>,
) -> Result<Json<Vec<AttemptListItem>>, ApiError> {
    let user_id = parse_id("user_id", &user_id)?;

    let rows = repositories::attempts::list_by_student(state.db(), user_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list attempts"))?;

    Ok(Json(rows.into_iter().map(AttemptListItem::from).collect()))
}

pub(super) async fn user_stats(
    Path(user_id): Path<String>,
    _caller: InternalCaller,
    State(state): State<AppState>,
) -> Result<Json<UserStatsResponse>, ApiError> {
    let user_id = parse_id("user_id", &user_id)?;

    let rows = repositories::attempts::list_by_student(state.db(), user_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load attempts for stats"))?;

    Ok(Json(UserStatsResponse::from(attempt_stats::aggregate(user_id, &rows))))
}

pub(super) async fn get_attempt(
    Path(attempt_id): Path<String>,
    _caller: InternalCaller,
    State(state): State<AppState>,
) -> Result<Json<AttemptDetailResponse>, ApiError> {
    let attempt = fetch_attempt(&state, &attempt_id).await?;

    let version = repositories::attempt_versions::find(state.db(), attempt.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load attempt snapshot"))?
        .and_then(|row| row.attempt_version);
    let min_point = version
        .as_ref()
        .and_then(|doc| doc.get("minPoint"))
        .and_then(serde_json::Value::as_i64)
        .and_then(|value| i32::try_from(value).ok());

    Ok(Json(AttemptDetailResponse::build(attempt, min_point, version)))
}

pub(super) async fn get_archived_snapshot(
    Path(attempt_id): Path<String>,
    _caller: InternalCaller,
    State(state): State<AppState>,
) -> Result<Json<ArchivedSnapshotResponse>, ApiError> {
    let attempt = fetch_attempt(&state, &attempt_id).await?;

    let Some(key) = attempt.attempt_snapshot_s3 else {
        return Err(ApiError::NotFound("Attempt has no archived snapshot".to_string()));
    };
    let storage = state
        .storage()
        .ok_or_else(|| ApiError::ServiceUnavailable("Snapshot storage is disabled".to_string()))?;

    let snapshot = archival::read_archived(storage, &key)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to read archived snapshot"))?
        .ok_or_else(|| ApiError::NotFound("Archived snapshot not found".to_string()))?;

    Ok(Json(ArchivedSnapshotResponse {
        attempt_id: attempt.id,
        key,
        sha256: attempt.attempt_snapshot_sha256,
        snapshot,
    }))
}

async fn fetch_attempt(state: &AppState, raw_id: &str) -> Result<TestAttempt, ApiError> {
    let attempt_id = parse_id("attempt_id", raw_id)?;

    repositories::attempts::find_by_id(state.db(), attempt_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load attempt"))?
        .ok_or_else(|| ApiError::NotFound("Attempt not found".to_string()))
}
