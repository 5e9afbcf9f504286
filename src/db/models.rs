use serde::Serialize;
use sqlx::FromRow;
use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::db::types::AttemptStatus;

/// Test definition owned by content authors; attempts only read it.
#[derive(Debug, Clone, Serialize, FromRow)]
pub(crate) struct TestDefinition {
    pub(crate) id: Uuid,
    pub(crate) title: String,
    pub(crate) min_point: Option<i32>,
    pub(crate) description: Option<String>,
    pub(crate) created_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub(crate) struct Question {
    pub(crate) id: Uuid,
    pub(crate) test_id: Option<Uuid>,
    pub(crate) draft_id: Option<Uuid>,
    pub(crate) order_index: i32,
    pub(crate) text_of_question: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub(crate) struct Answer {
    pub(crate) id: Uuid,
    pub(crate) question_id: Uuid,
    pub(crate) text: String,
    pub(crate) score: i32,
}

/// Attempt row without the live snapshot document, which is owned by the
/// version store and read separately.
#[derive(Debug, Clone, Serialize, FromRow)]
pub(crate) struct TestAttempt {
    pub(crate) id: Uuid,
    pub(crate) student_id: Uuid,
    pub(crate) test_id: Uuid,
    pub(crate) attempt_no: i32,
    pub(crate) completed: bool,
    pub(crate) total_points: Option<i32>,
    pub(crate) version_rev: i64,
    pub(crate) attempt_snapshot_s3: Option<String>,
    pub(crate) attempt_snapshot_sha256: Option<String>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
    pub(crate) completed_at: Option<PrimitiveDateTime>,
}

impl TestAttempt {
    pub(crate) fn status(&self) -> AttemptStatus {
        AttemptStatus::from_completed(self.completed)
    }
}
