use time::PrimitiveDateTime;
use uuid::Uuid;

/// Live snapshot column of one attempt, read as raw JSON.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct VersionRow {
    pub(crate) attempt_version: Option<serde_json::Value>,
    pub(crate) version_rev: i64,
    pub(crate) completed: bool,
}

pub(crate) async fn find(
    executor: impl sqlx::PgExecutor<'_>,
    attempt_id: Uuid,
) -> Result<Option<VersionRow>, sqlx::Error> {
    sqlx::query_as::<_, VersionRow>(
        "SELECT attempt_version, version_rev, completed FROM test_attempts WHERE id = $1",
    )
    .bind(attempt_id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn lock(
    executor: impl sqlx::PgExecutor<'_>,
    attempt_id: Uuid,
) -> Result<Option<VersionRow>, sqlx::Error> {
    sqlx::query_as::<_, VersionRow>(
        "SELECT attempt_version, version_rev, completed FROM test_attempts \
         WHERE id = $1 FOR UPDATE",
    )
    .bind(attempt_id)
    .fetch_optional(executor)
    .await
}

/// Writes the document only when none exists yet. Returns the new revision,
/// or `None` when the row already had a snapshot or is completed.
pub(crate) async fn insert_if_empty(
    executor: impl sqlx::PgExecutor<'_>,
    attempt_id: Uuid,
    document: serde_json::Value,
    now: PrimitiveDateTime,
) -> Result<Option<i64>, sqlx::Error> {
    sqlx::query_scalar(
        "UPDATE test_attempts
         SET attempt_version = $1, version_rev = version_rev + 1, updated_at = $2
         WHERE id = $3 AND attempt_version IS NULL AND NOT completed
         RETURNING version_rev",
    )
    .bind(document)
    .bind(now)
    .bind(attempt_id)
    .fetch_optional(executor)
    .await
}

/// Overwrites the document of an in-progress attempt; the caller holds the
/// row lock taken by [`lock`].
pub(crate) async fn replace(
    executor: impl sqlx::PgExecutor<'_>,
    attempt_id: Uuid,
    document: serde_json::Value,
    now: PrimitiveDateTime,
) -> Result<Option<i64>, sqlx::Error> {
    sqlx::query_scalar(
        "UPDATE test_attempts
         SET attempt_version = $1, version_rev = version_rev + 1, updated_at = $2
         WHERE id = $3 AND NOT completed
         RETURNING version_rev",
    )
    .bind(document)
    .bind(now)
    .bind(attempt_id)
    .fetch_optional(executor)
    .await
}
