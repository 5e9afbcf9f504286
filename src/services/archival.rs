use serde::Serialize;
use thiserror::Error;
use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::core::metrics::ARCHIVE_FAILURES;
use crate::core::time::format_primitive;
use crate::db::models::TestAttempt;
use crate::services::attempt_snapshot::AttemptSnapshot;
use crate::services::storage::{ObjectStorage, StoredObject};

const SNAPSHOT_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Error)]
pub(crate) enum ArchiveError {
    #[error("archival storage is not configured")]
    StorageUnavailable,
    #[error("failed to serialize archival snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write archival snapshot: {0:#}")]
    Write(anyhow::Error),
    #[error("failed to read archival snapshot: {0:#}")]
    Read(anyhow::Error),
    #[error("archived snapshot at {key} is not valid JSON")]
    Corrupt { key: String },
}

/// Immutable copy of a finished attempt's snapshot.
///
/// Only the completion path inside `services` can seal one, and nothing
/// mutates it afterwards.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ArchivalSnapshot {
    attempt_id: Uuid,
    student_id: Uuid,
    test_id: Uuid,
    total_points: i32,
    forced: bool,
    completed_at: String,
    #[serde(flatten)]
    snapshot: AttemptSnapshot,
}

impl ArchivalSnapshot {
    pub(in crate::services) fn seal(
        attempt: &TestAttempt,
        snapshot: AttemptSnapshot,
        forced: bool,
        completed_at: PrimitiveDateTime,
    ) -> Self {
        Self {
            attempt_id: attempt.id,
            student_id: attempt.student_id,
            test_id: attempt.test_id,
            total_points: snapshot.total_points(),
            forced,
            completed_at: format_primitive(completed_at),
            snapshot,
        }
    }

    pub(crate) fn total_points(&self) -> i32 {
        self.total_points
    }

    pub(crate) fn snapshot(&self) -> &AttemptSnapshot {
        &self.snapshot
    }
}

pub(crate) fn snapshot_key(
    prefix: &str,
    student_id: Uuid,
    test_id: Uuid,
    attempt_id: Uuid,
) -> String {
    format!("{prefix}/{student_id}/{test_id}/{attempt_id}.json")
}

/// Writes the sealed snapshot under its deterministic key. A retry after a
/// failed completion overwrites the same object.
pub(crate) async fn archive(
    storage: &dyn ObjectStorage,
    prefix: &str,
    sealed: &ArchivalSnapshot,
) -> Result<StoredObject, ArchiveError> {
    let key = snapshot_key(prefix, sealed.student_id, sealed.test_id, sealed.attempt_id);
    let bytes = serde_json::to_vec(sealed)?;

    match storage.put_object(&key, SNAPSHOT_CONTENT_TYPE, bytes).await {
        Ok(stored) => {
            tracing::info!(
                attempt_id = %sealed.attempt_id,
                key = %stored.key,
                size = stored.size,
                "Archived attempt snapshot"
            );
            Ok(stored)
        }
        Err(err) => {
            metrics::counter!(ARCHIVE_FAILURES).increment(1);
            tracing::error!(
                attempt_id = %sealed.attempt_id,
                key = %key,
                error = %err,
                "Archive write failed"
            );
            Err(ArchiveError::Write(err))
        }
    }
}

pub(crate) async fn read_archived(
    storage: &dyn ObjectStorage,
    key: &str,
) -> Result<Option<serde_json::Value>, ArchiveError> {
    let Some(bytes) = storage.get_object(key).await.map_err(ArchiveError::Read)? else {
        return Ok(None);
    };

    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|_| ArchiveError::Corrupt { key: key.to_string() })
}
