use sqlx::Row;

fn database_url() -> Option<String> {
    dotenvy::dotenv().ok();

    ["LMS_TEST_DATABASE_URL", "DATABASE_URL"]
        .iter()
        .filter_map(|key| std::env::var(key).ok())
        .find(|url| !url.trim().is_empty())
}

#[tokio::test]
async fn migrations_apply_and_tables_exist() -> anyhow::Result<()> {
    let Some(database_url) = database_url() else {
        eprintln!("LMS_TEST_DATABASE_URL and DATABASE_URL are not set; skipping");
        return Ok(());
    };

    let pool =
        sqlx::postgres::PgPoolOptions::new().max_connections(1).connect(&database_url).await?;

    let migrations_dir =
        std::env::var("LMS_MIGRATIONS_DIR").unwrap_or_else(|_| "migrations".to_string());
    let migrator = sqlx::migrate::Migrator::new(std::path::Path::new(&migrations_dir)).await?;
    migrator.run(&pool).await?;

    for table in ["tests", "test_drafts", "questions", "answers", "test_attempts"] {
        let row = sqlx::query("SELECT to_regclass($1)::text").bind(table).fetch_one(&pool).await?;
        let regclass: Option<String> = row.try_get(0)?;
        assert!(regclass.is_some(), "expected table {table} to exist after migrations");
    }

    let row = sqlx::query("SELECT to_regclass('ux_test_attempts_single_in_progress')::text")
        .fetch_one(&pool)
        .await?;
    let index: Option<String> = row.try_get(0)?;
    assert!(index.is_some(), "single in-progress attempt index is missing");

    Ok(())
}
