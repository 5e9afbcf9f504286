use sqlx::{PgConnection, PgPool};
use thiserror::Error;
use uuid::Uuid;

use crate::core::time::primitive_now_utc;
use crate::repositories;
use crate::services::attempt_snapshot::{AnswerUpdate, AttemptSnapshot, QuestionInit};

#[derive(Debug, Error)]
pub(crate) enum VersionStoreError {
    #[error("attempt {0} not found")]
    AttemptNotFound(Uuid),
    #[error("attempt {0} is already completed")]
    AttemptCompleted(Uuid),
    #[error("attempt {0} has no snapshot yet")]
    MissingSnapshot(Uuid),
    #[error("question {question_id} is not part of attempt {attempt_id}")]
    UnknownQuestion { attempt_id: Uuid, question_id: Uuid },
    #[error("snapshot of attempt {attempt_id} cannot be parsed")]
    Corrupt {
        attempt_id: Uuid,
        #[source]
        source: serde_json::Error,
    },
    #[error("snapshot cannot be encoded")]
    Encode(#[source] serde_json::Error),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Snapshot together with the row revision it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct VersionedSnapshot {
    pub(crate) snapshot: AttemptSnapshot,
    pub(crate) revision: i64,
}

/// Returns `None` while the attempt exists but has not been initialised.
pub(crate) async fn read(
    executor: impl sqlx::PgExecutor<'_>,
    attempt_id: Uuid,
) -> Result<Option<VersionedSnapshot>, VersionStoreError> {
    let row = repositories::attempt_versions::find(executor, attempt_id)
        .await?
        .ok_or(VersionStoreError::AttemptNotFound(attempt_id))?;

    let Some(document) = row.attempt_version else {
        return Ok(None);
    };

    let snapshot = decode(attempt_id, document)?;
    Ok(Some(VersionedSnapshot { snapshot, revision: row.version_rev }))
}

/// Writes the initial document unless one already exists. A second call
/// returns the stored snapshot unchanged, so wording and points stay as they
/// were at first view.
pub(crate) async fn initialize_if_empty(
    pool: &PgPool,
    attempt_id: Uuid,
    attempt_no: i32,
    questions: Vec<QuestionInit>,
    test_title: &str,
    min_point: Option<i32>,
) -> Result<VersionedSnapshot, VersionStoreError> {
    let snapshot = AttemptSnapshot::new(attempt_no, test_title, min_point, questions);
    let document = serde_json::to_value(&snapshot).map_err(VersionStoreError::Encode)?;

    let inserted = repositories::attempt_versions::insert_if_empty(
        pool,
        attempt_id,
        document,
        primitive_now_utc(),
    )
    .await?;

    if let Some(revision) = inserted {
        tracing::debug!(
            attempt_id = %attempt_id,
            questions = snapshot.questions.len(),
            "Initialized attempt snapshot"
        );
        return Ok(VersionedSnapshot { snapshot, revision });
    }

    let row = repositories::attempt_versions::find(pool, attempt_id)
        .await?
        .ok_or(VersionStoreError::AttemptNotFound(attempt_id))?;

    match row.attempt_version {
        Some(document) => Ok(VersionedSnapshot {
            snapshot: decode(attempt_id, document)?,
            revision: row.version_rev,
        }),
        None if row.completed => Err(VersionStoreError::AttemptCompleted(attempt_id)),
        None => Err(VersionStoreError::MissingSnapshot(attempt_id)),
    }
}

/// Replaces one question's answer fields under the row lock. Runs on the
/// caller's connection so several upserts can share a transaction.
pub(crate) async fn upsert_answer(
    conn: &mut PgConnection,
    attempt_id: Uuid,
    update: AnswerUpdate,
) -> Result<i64, VersionStoreError> {
    let row = repositories::attempt_versions::lock(&mut *conn, attempt_id)
        .await?
        .ok_or(VersionStoreError::AttemptNotFound(attempt_id))?;

    if row.completed {
        return Err(VersionStoreError::AttemptCompleted(attempt_id));
    }

    let document = row.attempt_version.ok_or(VersionStoreError::MissingSnapshot(attempt_id))?;
    let mut snapshot = decode(attempt_id, document)?;

    let question_id = update.question_id;
    if !snapshot.apply_answer(update) {
        return Err(VersionStoreError::UnknownQuestion { attempt_id, question_id });
    }

    let document = serde_json::to_value(&snapshot).map_err(VersionStoreError::Encode)?;
    repositories::attempt_versions::replace(&mut *conn, attempt_id, document, primitive_now_utc())
        .await?
        .ok_or(VersionStoreError::AttemptCompleted(attempt_id))
}

fn decode(
    attempt_id: Uuid,
    document: serde_json::Value,
) -> Result<AttemptSnapshot, VersionStoreError> {
    serde_json::from_value(document)
        .map_err(|source| VersionStoreError::Corrupt { attempt_id, source })
}
