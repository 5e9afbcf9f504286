use serde::Serialize;
use uuid::Uuid;

use crate::core::time::format_primitive;
use crate::db::models::TestAttempt;
use crate::repositories::attempts::StudentAttemptRow;
use crate::services::attempt_stats::{self, StudentStats, TestStats};

#[derive(Debug, Serialize)]
pub(crate) struct AttemptListItem {
    pub(crate) attempt_id: Uuid,
    pub(crate) test_id: Uuid,
    pub(crate) test_title: String,
    pub(crate) attempt_no: i32,
    pub(crate) point: Option<i32>,
    pub(crate) is_completed: bool,
    pub(crate) passed: Option<bool>,
    pub(crate) attempt_snapshot_s3: Option<String>,
    pub(crate) created_at: String,
    pub(crate) completed_at: Option<String>,
}

impl From<StudentAttemptRow> for AttemptListItem {
    fn from(row: StudentAttemptRow) -> Self {
        let passed = attempt_stats::row_passed(&row);
        Self {
            attempt_id: row.id,
            test_id: row.test_id,
            test_title: row.test_title,
            attempt_no: row.attempt_no,
            point: row.total_points,
            is_completed: row.completed,
            passed,
            attempt_snapshot_s3: row.attempt_snapshot_s3,
            created_at: format_primitive(row.created_at),
            completed_at: row.completed_at.map(format_primitive),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct UserStatsResponse {
    pub(crate) user_id: Uuid,
    pub(crate) attempts_total: usize,
    pub(crate) attempts_passed: usize,
    pub(crate) best_score: Option<i32>,
    pub(crate) last_attempt_at: Option<String>,
    pub(crate) per_test: Vec<TestStats>,
}

impl From<StudentStats> for UserStatsResponse {
    fn from(stats: StudentStats) -> Self {
        Self {
            user_id: stats.user_id,
            attempts_total: stats.attempts_total,
            attempts_passed: stats.attempts_passed,
            best_score: stats.best_score,
            last_attempt_at: stats.last_attempt_at.map(format_primitive),
            per_test: stats.per_test,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AttemptDetailResponse {
    pub(crate) attempt_id: Uuid,
    pub(crate) student_id: Uuid,
    pub(crate) test_id: Uuid,
    pub(crate) attempt_no: i32,
    pub(crate) point: Option<i32>,
    pub(crate) is_completed: bool,
    pub(crate) passed: Option<bool>,
    pub(crate) version_rev: i64,
    pub(crate) attempt_version: Option<serde_json::Value>,
    pub(crate) attempt_snapshot_s3: Option<String>,
    pub(crate) attempt_snapshot_sha256: Option<String>,
    pub(crate) created_at: String,
    pub(crate) completed_at: Option<String>,
}

impl AttemptDetailResponse {
    pub(crate) fn build(
        attempt: TestAttempt,
        min_point: Option<i32>,
        attempt_version: Option<serde_json::Value>,
    ) -> Self {
        Self {
            attempt_id: attempt.id,
            student_id: attempt.student_id,
            test_id: attempt.test_id,
            attempt_no: attempt.attempt_no,
            point: attempt.total_points,
            is_completed: attempt.completed,
            passed: attempt_stats::passed(attempt.completed, attempt.total_points, min_point),
            version_rev: attempt.version_rev,
            attempt_version,
            attempt_snapshot_s3: attempt.attempt_snapshot_s3,
            attempt_snapshot_sha256: attempt.attempt_snapshot_sha256,
            created_at: format_primitive(attempt.created_at),
            completed_at: attempt.completed_at.map(format_primitive),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ArchivedSnapshotResponse {
    pub(crate) attempt_id: Uuid,
    pub(crate) key: String,
    pub(crate) sha256: Option<String>,
    pub(crate) snapshot: serde_json::Value,
}
