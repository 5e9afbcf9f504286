use std::collections::HashMap;

use uuid::Uuid;

use crate::db::models::Answer;

pub(crate) const COLUMNS: &str = "id, question_id, text, score";

pub(crate) async fn list_by_questions(
    executor: impl sqlx::PgExecutor<'_>,
    question_ids: &[Uuid],
) -> Result<Vec<Answer>, sqlx::Error> {
    if question_ids.is_empty() {
        return Ok(Vec::new());
    }

    sqlx::query_as::<_, Answer>(&format!(
        "SELECT {COLUMNS} FROM answers WHERE question_id = ANY($1) ORDER BY question_id, id"
    ))
    .bind(question_ids)
    .fetch_all(executor)
    .await
}

/// Answers of every listed question, keyed by question id.
pub(crate) async fn map_by_questions(
    executor: impl sqlx::PgExecutor<'_>,
    question_ids: &[Uuid],
) -> Result<HashMap<Uuid, Vec<Answer>>, sqlx::Error> {
    let mut grouped: HashMap<Uuid, Vec<Answer>> = HashMap::new();
    for answer in list_by_questions(executor, question_ids).await? {
        grouped.entry(answer.question_id).or_default().push(answer);
    }
    Ok(grouped)
}
