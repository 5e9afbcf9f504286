use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use thiserror::Error;
use uuid::Uuid;

use crate::core::metrics::{ATTEMPTS_COMPLETED, ATTEMPTS_CREATED};
use crate::core::time::primitive_now_utc;
use crate::db::models::TestAttempt;
use crate::db::types::OpenReason;
use crate::repositories;
use crate::services::archival::{self, ArchivalSnapshot, ArchiveError};
use crate::services::attempt_snapshot::QuestionEntry;
use crate::services::attempt_versions::{self, VersionStoreError};
use crate::services::storage::ObjectStorage;

#[derive(Debug, Error)]
pub(crate) enum LifecycleError {
    #[error("attempt {0} not found")]
    AttemptNotFound(Uuid),
    #[error("attempt {0} is already completed")]
    AlreadyCompleted(Uuid),
    #[error("attempt {0} has no snapshot to complete")]
    MissingSnapshot(Uuid),
    #[error("no in-progress attempt could be opened for student {student_id} on test {test_id}")]
    OpenConflict { student_id: Uuid, test_id: Uuid },
    #[error(transparent)]
    Snapshot(#[from] VersionStoreError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone)]
pub(crate) struct ResolvedAttempt {
    pub(crate) attempt: TestAttempt,
    pub(crate) created: bool,
}

/// Question left without a selection when completion was requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct MissingQuestion {
    pub(crate) question_id: Uuid,
    pub(crate) order: i32,
    pub(crate) question_text: String,
}

impl From<&QuestionEntry> for MissingQuestion {
    fn from(entry: &QuestionEntry) -> Self {
        Self {
            question_id: entry.question_id,
            order: entry.order,
            question_text: entry.question_text.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Completion {
    Completed { attempt: TestAttempt, forced: bool },
    Incomplete { missing: Vec<MissingQuestion> },
}

/// Resumes the in-progress attempt or opens the next one.
pub(crate) async fn resolve_or_create(
    pool: &PgPool,
    student_id: Uuid,
    test_id: Uuid,
) -> Result<ResolvedAttempt, LifecycleError> {
    open(pool, student_id, test_id, OpenReason::FirstTake).await
}

/// Explicit "take again". Completed attempts stay untouched; an attempt that
/// is still in progress is returned instead of opening a second one.
pub(crate) async fn retry(
    pool: &PgPool,
    student_id: Uuid,
    test_id: Uuid,
) -> Result<ResolvedAttempt, LifecycleError> {
    open(pool, student_id, test_id, OpenReason::Retry).await
}

pub(crate) async fn latest_completed(
    pool: &PgPool,
    student_id: Uuid,
    test_id: Uuid,
) -> Result<Option<TestAttempt>, LifecycleError> {
    Ok(repositories::attempts::find_latest_completed(pool, student_id, test_id).await?)
}

/// Current in-progress attempt without opening a new one.
pub(crate) async fn find_in_progress(
    pool: &PgPool,
    student_id: Uuid,
    test_id: Uuid,
) -> Result<Option<TestAttempt>, LifecycleError> {
    let mut conn = pool.acquire().await?;
    Ok(canonical_in_progress(&mut conn, student_id, test_id).await?)
}

async fn open(
    pool: &PgPool,
    student_id: Uuid,
    test_id: Uuid,
    reason: OpenReason,
) -> Result<ResolvedAttempt, LifecycleError> {
    let mut tx = pool.begin().await?;

    repositories::attempts::acquire_student_test_lock(&mut *tx, student_id, test_id).await?;

    if let Some(attempt) = canonical_in_progress(&mut *tx, student_id, test_id).await? {
        tx.commit().await?;
        return Ok(ResolvedAttempt { attempt, created: false });
    }

    let completed = repositories::attempts::count_completed(&mut *tx, student_id, test_id).await?;
    let attempt_id = Uuid::new_v4();
    let inserted = repositories::attempts::create(
        &mut *tx,
        repositories::attempts::CreateAttempt {
            id: attempt_id,
            student_id,
            test_id,
            attempt_no: completed as i32 + 1,
            created_at: primitive_now_utc(),
        },
    )
    .await?;

    let attempt = if inserted {
        repositories::attempts::find_by_id(&mut *tx, attempt_id)
            .await?
            .ok_or(LifecycleError::AttemptNotFound(attempt_id))?
    } else {
        canonical_in_progress(&mut *tx, student_id, test_id)
            .await?
            .ok_or(LifecycleError::OpenConflict { student_id, test_id })?
    };

    tx.commit().await?;

    if inserted {
        metrics::counter!(ATTEMPTS_CREATED, "reason" => reason.as_str()).increment(1);
        tracing::info!(
            attempt_id = %attempt.id,
            student_id = %student_id,
            test_id = %test_id,
            attempt_no = attempt.attempt_no,
            reason = reason.as_str(),
            "Opened test attempt"
        );
    }

    Ok(ResolvedAttempt { attempt, created: inserted })
}

async fn canonical_in_progress(
    conn: &mut PgConnection,
    student_id: Uuid,
    test_id: Uuid,
) -> Result<Option<TestAttempt>, sqlx::Error> {
    let in_progress = repositories::attempts::list_in_progress(conn, student_id, test_id).await?;

    if in_progress.len() > 1 {
        tracing::warn!(
            student_id = %student_id,
            test_id = %test_id,
            count = in_progress.len(),
            canonical = %in_progress[0].id,
            "Multiple in-progress attempts found; resuming the newest"
        );
    }

    Ok(in_progress.into_iter().next())
}

/// Moves an attempt to completed.
///
/// The row stays locked while the sealed snapshot is archived, and the flag
/// is only committed after the archive write succeeded. Without `force`, an
/// attempt with unanswered questions is left untouched and the missing list
/// is returned instead.
pub(crate) async fn complete(
    pool: &PgPool,
    storage: Option<&dyn ObjectStorage>,
    key_prefix: &str,
    attempt_id: Uuid,
    force: bool,
) -> Result<Completion, LifecycleError> {
    let mut tx = pool.begin().await?;

    let attempt = repositories::attempts::lock_by_id(&mut *tx, attempt_id)
        .await?
        .ok_or(LifecycleError::AttemptNotFound(attempt_id))?;

    if attempt.completed {
        return Err(LifecycleError::AlreadyCompleted(attempt_id));
    }

    let snapshot = attempt_versions::read(&mut *tx, attempt_id)
        .await?
        .ok_or(LifecycleError::MissingSnapshot(attempt_id))?
        .snapshot;

    let missing: Vec<MissingQuestion> =
        snapshot.unanswered().into_iter().map(MissingQuestion::from).collect();
    if !missing.is_empty() && !force {
        return Ok(Completion::Incomplete { missing });
    }

    let storage = storage.ok_or(ArchiveError::StorageUnavailable)?;
    let forced = !missing.is_empty();
    let completed_at = primitive_now_utc();
    let sealed = ArchivalSnapshot::seal(&attempt, snapshot, forced, completed_at);
    let stored = archival::archive(storage, key_prefix, &sealed).await?;

    let updated = repositories::attempts::mark_completed(
        &mut *tx,
        repositories::attempts::MarkCompleted {
            id: attempt_id,
            total_points: sealed.total_points(),
            snapshot_key: &stored.key,
            snapshot_sha256: &stored.sha256,
            completed_at,
        },
    )
    .await?;

    if !updated {
        return Err(LifecycleError::AlreadyCompleted(attempt_id));
    }

    let attempt = repositories::attempts::find_by_id(&mut *tx, attempt_id)
        .await?
        .ok_or(LifecycleError::AttemptNotFound(attempt_id))?;

    tx.commit().await?;

    metrics::counter!(ATTEMPTS_COMPLETED, "forced" => if forced { "true" } else { "false" })
        .increment(1);
    tracing::info!(
        attempt_id = %attempt_id,
        total_points = sealed.total_points(),
        missing = missing.len(),
        forced,
        key = %stored.key,
        "Completed test attempt"
    );

    Ok(Completion::Completed { attempt, forced })
}
