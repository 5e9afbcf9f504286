use uuid::Uuid;

use crate::db::models::TestDefinition;

pub(crate) const COLUMNS: &str = "id, title, min_point, description, created_at";

pub(crate) async fn find_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: Uuid,
) -> Result<Option<TestDefinition>, sqlx::Error> {
    sqlx::query_as::<_, TestDefinition>(&format!("SELECT {COLUMNS} FROM tests WHERE id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await
}
