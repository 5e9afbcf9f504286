use std::sync::{Arc, OnceLock};

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request},
    Router,
};
use sqlx::PgPool;
use time::{Duration, OffsetDateTime};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::api;
use crate::core::{
    config::Settings, redis::RedisHandle, security, state::AppState, time::primitive_now_utc,
};
use crate::db::models::TestAttempt;
use crate::repositories;
use crate::services::attempt_snapshot::QuestionInit;
use crate::services::attempt_versions;
use crate::services::attempt_workflow;
use crate::services::identity::RequestIdentityResolver;
use crate::services::storage::memory::MemoryStorage;
use crate::services::storage::ObjectStorage;

const TEST_DATABASE_URL_ENV: &str = "LMS_TEST_DATABASE_URL";
const TEST_SECRET_KEY: &str = "test-secret";

pub(crate) struct TestContext {
    pub(crate) state: AppState,
    pub(crate) app: Router,
    pub(crate) storage: Arc<MemoryStorage>,
    _guard: OwnedMutexGuard<()>,
}

/// Ids of the two-question test created by [`seed_sample_test`].
///
/// Q1 is single-select (A1 = 1 point, A2 = 0); Q2 is multi-select
/// (B1 = 1, B2 = 1, B3 = 0).
#[derive(Debug, Clone, Copy)]
pub(crate) struct SeededTest {
    pub(crate) test_id: Uuid,
    pub(crate) q1: Uuid,
    pub(crate) q2: Uuid,
    pub(crate) a1: Uuid,
    pub(crate) a2: Uuid,
    pub(crate) b1: Uuid,
    pub(crate) b2: Uuid,
    pub(crate) b3: Uuid,
}

pub(crate) async fn env_lock() -> OwnedMutexGuard<()> {
    static LOCK: OnceLock<Arc<Mutex<()>>> = OnceLock::new();
    let lock = LOCK.get_or_init(|| Arc::new(Mutex::new(()))).clone();
    lock.lock_owned().await
}

pub(crate) fn set_test_env() {
    std::env::set_var("LMS_ENV", "test");
    std::env::set_var("LMS_STRICT_CONFIG", "0");
    std::env::set_var("SECRET_KEY", TEST_SECRET_KEY);
    std::env::set_var("PROMETHEUS_ENABLED", "0");
    std::env::remove_var("S3_ENDPOINT");
    std::env::remove_var("S3_ACCESS_KEY");
    std::env::remove_var("S3_SECRET_KEY");
    std::env::remove_var("S3_BUCKET");
    std::env::remove_var("S3_REGION");
    std::env::remove_var("SNAPSHOT_PREFIX");
    std::env::remove_var("INTERNAL_API_TOKEN");
    std::env::remove_var("SAVE_RATE_LIMIT");
    std::env::remove_var("SAVE_RATE_WINDOW_SECONDS");
    std::env::remove_var("STUDENT_COOKIE_NAME");
    std::env::set_var("AWS_EC2_METADATA_DISABLED", "true");
}

pub(crate) fn set_test_storage_env() {
    std::env::set_var("S3_ENDPOINT", "http://localhost:9000");
    std::env::set_var("S3_ACCESS_KEY", "test-access-key");
    std::env::set_var("S3_SECRET_KEY", "test-secret-key");
    std::env::set_var("S3_BUCKET", "lms-testing-test-bucket");
    std::env::set_var("S3_REGION", "us-east-1");
}

/// Builds a full application against the database named by
/// `LMS_TEST_DATABASE_URL`, or returns `None` when it is unset.
///
/// Archives land in an in-memory store and Redis stays disconnected, so the
/// save limiter always admits.
pub(crate) async fn setup_test_context() -> Option<TestContext> {
    setup_test_context_with(|_| {}).await
}

/// Same as [`setup_test_context`] but lets the caller adjust the environment
/// before settings are loaded.
pub(crate) async fn setup_test_context_with(
    configure: impl FnOnce(&mut Vec<(&'static str, String)>),
) -> Option<TestContext> {
    let guard = env_lock().await;
    let Ok(database_url) = std::env::var(TEST_DATABASE_URL_ENV) else {
        eprintln!("{TEST_DATABASE_URL_ENV} is not set; skipping database test");
        return None;
    };

    set_test_env();
    std::env::set_var("DATABASE_URL", &database_url);
    let mut overrides = Vec::new();
    configure(&mut overrides);
    for (key, value) in &overrides {
        std::env::set_var(key, value);
    }

    let settings = Settings::load().expect("settings");
    for (key, _) in &overrides {
        std::env::remove_var(key);
    }

    let db = prepare_db(&settings).await;
    let redis = RedisHandle::new(settings.redis().redis_url());
    let storage = Arc::new(MemoryStorage::default());
    let identity = Arc::new(RequestIdentityResolver::new(settings.clone()));

    let state = AppState::new(
        settings,
        db,
        redis,
        Some(storage.clone() as Arc<dyn ObjectStorage>),
        identity,
    );
    let app = api::router::router(state.clone());

    Some(TestContext { state, app, storage, _guard: guard })
}

async fn prepare_db(settings: &Settings) -> PgPool {
    let db = crate::db::init_pool(settings).await.expect("db pool");
    reset_public_schema(&db).await.expect("reset schema");
    crate::db::run_migrations(&db).await.expect("migrations");
    db
}

async fn reset_public_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("DROP SCHEMA IF EXISTS public CASCADE").execute(pool).await?;
    sqlx::query("CREATE SCHEMA public").execute(pool).await?;
    Ok(())
}

pub(crate) async fn seed_sample_test(pool: &PgPool, min_point: Option<i32>) -> SeededTest {
    let test_id = Uuid::new_v4();
    sqlx::query("INSERT INTO tests (id, title, min_point, description) VALUES ($1, $2, $3, $4)")
        .bind(test_id)
        .bind("Chemistry basics")
        .bind(min_point)
        .bind("Two questions")
        .execute(pool)
        .await
        .expect("insert test");

    let q1 = insert_question(pool, test_id, 1, "Which gas do plants absorb?").await;
    let q2 = insert_question(pool, test_id, 2, "Pick the noble gases").await;

    SeededTest {
        test_id,
        q1,
        q2,
        a1: insert_answer(pool, q1, "Carbon dioxide", 1).await,
        a2: insert_answer(pool, q1, "Oxygen", 0).await,
        b1: insert_answer(pool, q2, "Neon", 1).await,
        b2: insert_answer(pool, q2, "Argon", 1).await,
        b3: insert_answer(pool, q2, "Nitrogen", 0).await,
    }
}

pub(crate) async fn insert_question(
    pool: &PgPool,
    test_id: Uuid,
    order_index: i32,
    text: &str,
) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO questions (id, test_id, order_index, text_of_question) \
         VALUES ($1, $2, $3, $4)",
    )
    .bind(id)
    .bind(test_id)
    .bind(order_index)
    .bind(text)
    .execute(pool)
    .await
    .expect("insert question");
    id
}

pub(crate) async fn insert_answer(
    pool: &PgPool,
    question_id: Uuid,
    text: &str,
    score: i32,
) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO answers (id, question_id, text, score) VALUES ($1, $2, $3, $4)")
        .bind(id)
        .bind(question_id)
        .bind(text)
        .bind(score)
        .execute(pool)
        .await
        .expect("insert answer");
    id
}

/// Inserts an in-progress attempt numbered after every existing one.
pub(crate) async fn insert_attempt(pool: &PgPool, student_id: Uuid, test_id: Uuid) -> TestAttempt {
    let existing: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM test_attempts WHERE student_id = $1 AND test_id = $2",
    )
    .bind(student_id)
    .bind(test_id)
    .fetch_one(pool)
    .await
    .expect("count attempts");

    let id = Uuid::new_v4();
    let created = repositories::attempts::create(
        pool,
        repositories::attempts::CreateAttempt {
            id,
            student_id,
            test_id,
            attempt_no: existing as i32 + 1,
            created_at: primitive_now_utc(),
        },
    )
    .await
    .expect("create attempt");
    assert!(created, "attempt insert was skipped");

    repositories::attempts::find_by_id(pool, id).await.expect("find attempt").expect("attempt")
}

pub(crate) async fn question_inits(pool: &PgPool, test_id: Uuid) -> Vec<QuestionInit> {
    let questions =
        repositories::questions::list_by_test(pool, test_id).await.expect("questions");
    let ids: Vec<Uuid> = questions.iter().map(|question| question.id).collect();
    let answers = repositories::answers::map_by_questions(pool, &ids).await.expect("answers");
    attempt_workflow::question_inits(&questions, &answers)
}

pub(crate) async fn init_snapshot(pool: &PgPool, attempt: &TestAttempt) {
    let test = repositories::test_definitions::find_by_id(pool, attempt.test_id)
        .await
        .expect("find test")
        .expect("test");
    let inits = question_inits(pool, attempt.test_id).await;
    attempt_versions::initialize_if_empty(
        pool,
        attempt.id,
        attempt.attempt_no,
        inits,
        &test.title,
        test.min_point,
    )
    .await
    .expect("init snapshot");
}

/// Mints a token the way the platform's auth service does.
pub(crate) fn access_token(subject: &str, settings: &Settings, expires_in: Duration) -> String {
    let algorithm = security::algorithm_from_settings(settings).expect("algorithm");
    let claims = security::Claims {
        sub: subject.to_string(),
        exp: (OffsetDateTime::now_utc() + expires_in).unix_timestamp(),
    };

    jsonwebtoken::encode(
        &jsonwebtoken::Header::new(algorithm),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(settings.security().secret_key.as_bytes()),
    )
    .expect("token")
}

pub(crate) fn bearer_token(student_id: &str, settings: &Settings) -> String {
    access_token(student_id, settings, Duration::hours(1))
}

pub(crate) fn json_request(
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);

    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    if let Some(body) = body {
        let bytes = serde_json::to_vec(&body).expect("serialize body");
        builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(bytes))
            .expect("request body")
    } else {
        builder.body(Body::empty()).expect("request body")
    }
}

pub(crate) async fn read_json(response: axum::response::Response<Body>) -> serde_json::Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.expect("response body");
    serde_json::from_slice(&body).unwrap_or_else(|err| {
        let body_text = String::from_utf8_lossy(&body);
        panic!("json parse: {err}; body: {body_text}");
    })
}
