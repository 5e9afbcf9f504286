use uuid::Uuid;

use crate::db::models::Question;

pub(crate) const COLUMNS: &str = "id, test_id, draft_id, order_index, text_of_question";

/// Published questions of a test in display order. Draft questions are never
/// returned.
pub(crate) async fn list_by_test(
    executor: impl sqlx::PgExecutor<'_>,
    test_id: Uuid,
) -> Result<Vec<Question>, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!(
        "SELECT {COLUMNS} FROM questions WHERE test_id = $1 ORDER BY order_index, id"
    ))
    .bind(test_id)
    .fetch_all(executor)
    .await
}
