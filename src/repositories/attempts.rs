use sqlx::PgPool;
use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::db::models::TestAttempt;

pub(crate) const COLUMNS: &str = "\
    id, student_id, test_id, attempt_no, completed, total_points, version_rev, \
    attempt_snapshot_s3, attempt_snapshot_sha256, created_at, updated_at, completed_at";

pub(crate) struct CreateAttempt {
    pub(crate) id: Uuid,
    pub(crate) student_id: Uuid,
    pub(crate) test_id: Uuid,
    pub(crate) attempt_no: i32,
    pub(crate) created_at: PrimitiveDateTime,
}

pub(crate) struct MarkCompleted<'a> {
    pub(crate) id: Uuid,
    pub(crate) total_points: i32,
    pub(crate) snapshot_key: &'a str,
    pub(crate) snapshot_sha256: &'a str,
    pub(crate) completed_at: PrimitiveDateTime,
}

/// Attempt joined with the owning test's title and passing threshold.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct StudentAttemptRow {
    pub(crate) id: Uuid,
    pub(crate) test_id: Uuid,
    pub(crate) test_title: String,
    pub(crate) min_point: Option<i32>,
    pub(crate) attempt_no: i32,
    pub(crate) completed: bool,
    pub(crate) total_points: Option<i32>,
    pub(crate) attempt_snapshot_s3: Option<String>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) completed_at: Option<PrimitiveDateTime>,
}

pub(crate) async fn find_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: Uuid,
) -> Result<Option<TestAttempt>, sqlx::Error> {
    sqlx::query_as::<_, TestAttempt>(&format!(
        "SELECT {COLUMNS} FROM test_attempts WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await
}

/// Row-locks the attempt for the rest of the transaction.
pub(crate) async fn lock_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: Uuid,
) -> Result<Option<TestAttempt>, sqlx::Error> {
    sqlx::query_as::<_, TestAttempt>(&format!(
        "SELECT {COLUMNS} FROM test_attempts WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await
}

/// Serialises attempt creation for one (student, test) pair until commit.
pub(crate) async fn acquire_student_test_lock(
    executor: impl sqlx::PgExecutor<'_>,
    student_id: Uuid,
    test_id: Uuid,
) -> Result<(), sqlx::Error> {
    let key = format!("test_attempts:{student_id}:{test_id}");
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))").bind(key).execute(executor).await?;
    Ok(())
}

/// In-progress attempts, newest first.
pub(crate) async fn list_in_progress(
    executor: impl sqlx::PgExecutor<'_>,
    student_id: Uuid,
    test_id: Uuid,
) -> Result<Vec<TestAttempt>, sqlx::Error> {
    sqlx::query_as::<_, TestAttempt>(&format!(
        "SELECT {COLUMNS} FROM test_attempts \
         WHERE student_id = $1 AND test_id = $2 AND NOT completed \
         ORDER BY created_at DESC, attempt_no DESC"
    ))
    .bind(student_id)
    .bind(test_id)
    .fetch_all(executor)
    .await
}

pub(crate) async fn find_latest_completed(
    executor: impl sqlx::PgExecutor<'_>,
    student_id: Uuid,
    test_id: Uuid,
) -> Result<Option<TestAttempt>, sqlx::Error> {
    sqlx::query_as::<_, TestAttempt>(&format!(
        "SELECT {COLUMNS} FROM test_attempts \
         WHERE student_id = $1 AND test_id = $2 AND completed \
         ORDER BY completed_at DESC, created_at DESC \
         LIMIT 1"
    ))
    .bind(student_id)
    .bind(test_id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn count_completed(
    executor: impl sqlx::PgExecutor<'_>,
    student_id: Uuid,
    test_id: Uuid,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM test_attempts WHERE student_id = $1 AND test_id = $2 AND completed",
    )
    .bind(student_id)
    .bind(test_id)
    .fetch_one(executor)
    .await
}

/// Returns `false` when the single-in-progress index already holds a row.
pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    attempt: CreateAttempt,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO test_attempts (
            id, student_id, test_id, attempt_no, completed, version_rev, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,FALSE,0,$5,$5)
        ON CONFLICT DO NOTHING",
    )
    .bind(attempt.id)
    .bind(attempt.student_id)
    .bind(attempt.test_id)
    .bind(attempt.attempt_no)
    .bind(attempt.created_at)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Flips the attempt to completed. Returns `false` if it already was.
pub(crate) async fn mark_completed(
    executor: impl sqlx::PgExecutor<'_>,
    params: MarkCompleted<'_>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE test_attempts
         SET completed = TRUE,
             total_points = $1,
             attempt_snapshot_s3 = $2,
             attempt_snapshot_sha256 = $3,
             completed_at = $4,
             updated_at = $4
         WHERE id = $5 AND NOT completed",
    )
    .bind(params.total_points)
    .bind(params.snapshot_key)
    .bind(params.snapshot_sha256)
    .bind(params.completed_at)
    .bind(params.id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// `min_point` comes from the attempt's own snapshot so later test edits do not regrade it.
pub(crate) async fn list_by_student(
    pool: &PgPool,
    student_id: Uuid,
) -> Result<Vec<StudentAttemptRow>, sqlx::Error> {
    sqlx::query_as::<_, StudentAttemptRow>(
        "SELECT a.id, a.test_id, t.title AS test_title,
                (a.attempt_version->>'minPoint')::int AS min_point, a.attempt_no, a.completed,
                a.total_points, a.attempt_snapshot_s3, a.created_at, a.completed_at
         FROM test_attempts a
         JOIN tests t ON t.id = a.test_id
         WHERE a.student_id = $1
         ORDER BY a.created_at DESC, a.attempt_no DESC",
    )
    .bind(student_id)
    .fetch_all(pool)
    .await
}
