use std::collections::HashMap;

use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::core::metrics::ATTEMPT_SAVES;
use crate::core::state::AppState;
use crate::db::models::{Answer, Question, TestAttempt, TestDefinition};
use crate::repositories;
use crate::services::attempt_lifecycle::{self, Completion, LifecycleError, MissingQuestion};
use crate::services::attempt_snapshot::{AnswerUpdate, QuestionInit};
use crate::services::attempt_versions::{self, VersionStoreError, VersionedSnapshot};
use crate::services::scoring;

/// Selected answer ids per question, as submitted by the student.
pub(crate) type AnswerSelections = HashMap<Uuid, Vec<Uuid>>;

#[derive(Debug, Error)]
pub(crate) enum WorkflowError {
    #[error("test {0} not found")]
    TestNotFound(Uuid),
    #[error("attempt {0} not found")]
    AttemptNotFound(Uuid),
    #[error("attempt {0} belongs to another student")]
    NotOwner(Uuid),
    #[error("attempt {0} is already completed")]
    AlreadyCompleted(Uuid),
    #[error("attempt {0} is not completed yet")]
    NotCompleted(Uuid),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Snapshot(#[from] VersionStoreError),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Identifies an attempt as addressed by a student request.
#[derive(Debug, Clone, Copy)]
pub(crate) struct AttemptRef {
    pub(crate) student_id: Uuid,
    pub(crate) test_id: Uuid,
    pub(crate) attempt_id: Uuid,
}

/// In-progress attempt with its snapshot and the live answer options of each
/// snapshot question.
#[derive(Debug, Clone)]
pub(crate) struct AttemptView {
    pub(crate) attempt: TestAttempt,
    pub(crate) versioned: VersionedSnapshot,
    pub(crate) options: HashMap<Uuid, Vec<Answer>>,
}

#[derive(Debug, Clone)]
pub(crate) enum TakeOutcome {
    InProgress(AttemptView),
    Completed(TestAttempt),
}

#[derive(Debug, Clone)]
pub(crate) struct SaveOutcome {
    pub(crate) attempt: TestAttempt,
    pub(crate) revision: i64,
    pub(crate) saved: usize,
    pub(crate) ignored: Vec<Uuid>,
}

#[derive(Debug, Clone)]
pub(crate) enum FinishOutcome {
    Completed { attempt: TestAttempt, forced: bool },
    NeedsConfirmation {
        attempt: TestAttempt,
        missing: Vec<MissingQuestion>,
        total_questions: usize,
    },
}

#[derive(Debug, Clone)]
pub(crate) struct ResultsView {
    pub(crate) attempt: TestAttempt,
    pub(crate) versioned: VersionedSnapshot,
    pub(crate) total_points: i32,
    pub(crate) max_points: i32,
    pub(crate) passed: bool,
}

/// Resumes the requested or current attempt, opening a first one when the
/// student has none. With no attempt in progress the latest completed one is
/// returned instead of starting over.
pub(crate) async fn take(
    state: &AppState,
    student_id: Uuid,
    test_id: Uuid,
    attempt_id: Option<Uuid>,
) -> Result<TakeOutcome, WorkflowError> {
    let pool = state.db();
    let test = fetch_test(pool, test_id).await?;

    let attempt = match attempt_id {
        Some(attempt_id) => {
            let attempt =
                load_owned(pool, AttemptRef { student_id, test_id, attempt_id }).await?;
            if attempt.completed {
                return Ok(TakeOutcome::Completed(attempt));
            }
            attempt
        }
        None => match attempt_lifecycle::find_in_progress(pool, student_id, test_id).await? {
            Some(attempt) => attempt,
            None => {
                if let Some(done) =
                    attempt_lifecycle::latest_completed(pool, student_id, test_id).await?
                {
                    return Ok(TakeOutcome::Completed(done));
                }
                attempt_lifecycle::resolve_or_create(pool, student_id, test_id).await?.attempt
            }
        },
    };

    let versioned = ensure_snapshot(pool, &attempt, Some(&test)).await?;
    let question_ids: Vec<Uuid> =
        versioned.snapshot.questions.iter().map(|entry| entry.question_id).collect();
    let options = repositories::answers::map_by_questions(pool, &question_ids).await?;

    Ok(TakeOutcome::InProgress(AttemptView { attempt, versioned, options }))
}

/// Opens a fresh attempt on explicit request.
pub(crate) async fn retry(
    state: &AppState,
    student_id: Uuid,
    test_id: Uuid,
) -> Result<attempt_lifecycle::ResolvedAttempt, WorkflowError> {
    fetch_test(state.db(), test_id).await?;
    Ok(attempt_lifecycle::retry(state.db(), student_id, test_id).await?)
}

/// Scores and stores every submitted question in one transaction. Questions
/// absent from `selections` keep their previous answers; an empty list clears
/// one.
pub(crate) async fn save(
    state: &AppState,
    target: AttemptRef,
    selections: &AnswerSelections,
) -> Result<SaveOutcome, WorkflowError> {
    let pool = state.db();
    let attempt = load_owned(pool, target).await?;
    if attempt.completed {
        return Err(WorkflowError::AlreadyCompleted(attempt.id));
    }

    save_selections(pool, attempt, selections).await
}

/// Confirmation view: which questions are still unanswered.
pub(crate) async fn review(
    state: &AppState,
    target: AttemptRef,
) -> Result<FinishOutcome, WorkflowError> {
    let pool = state.db();
    let attempt = load_owned(pool, target).await?;
    if attempt.completed {
        let forced = attempt_versions::read(pool, attempt.id)
            .await?
            .is_some_and(|versioned| !versioned.snapshot.unanswered().is_empty());
        return Ok(FinishOutcome::Completed { attempt, forced });
    }

    let versioned = ensure_snapshot(pool, &attempt, None).await?;
    let missing = versioned.snapshot.unanswered().into_iter().map(MissingQuestion::from).collect();

    Ok(FinishOutcome::NeedsConfirmation {
        attempt,
        missing,
        total_questions: versioned.snapshot.questions.len(),
    })
}

/// Saves any last-moment answers, then tries to complete the attempt.
pub(crate) async fn finish(
    state: &AppState,
    target: AttemptRef,
    selections: Option<&AnswerSelections>,
    force: bool,
) -> Result<FinishOutcome, WorkflowError> {
    let pool = state.db();
    let mut attempt = load_owned(pool, target).await?;
    if attempt.completed {
        return Err(WorkflowError::AlreadyCompleted(attempt.id));
    }

    if let Some(selections) = selections {
        attempt = save_selections(pool, attempt, selections).await?.attempt;
    } else {
        ensure_snapshot(pool, &attempt, None).await?;
    }

    let completion = attempt_lifecycle::complete(
        pool,
        state.storage(),
        &state.settings().s3().snapshot_prefix,
        attempt.id,
        force,
    )
    .await?;

    match completion {
        Completion::Completed { attempt, forced } => {
            Ok(FinishOutcome::Completed { attempt, forced })
        }
        Completion::Incomplete { missing } => {
            let total_questions = attempt_versions::read(pool, attempt.id)
                .await?
                .map(|versioned| versioned.snapshot.questions.len())
                .unwrap_or_default();
            Ok(FinishOutcome::NeedsConfirmation { attempt, missing, total_questions })
        }
    }
}

/// Final snapshot of a completed attempt with its pass/fail verdict.
pub(crate) async fn results(
    state: &AppState,
    target: AttemptRef,
) -> Result<ResultsView, WorkflowError> {
    let pool = state.db();
    let attempt = load_owned(pool, target).await?;
    if !attempt.completed {
        return Err(WorkflowError::NotCompleted(attempt.id));
    }

    let versioned = attempt_versions::read(pool, attempt.id)
        .await?
        .ok_or(VersionStoreError::MissingSnapshot(attempt.id))?;
    let total_points = attempt.total_points.unwrap_or_else(|| versioned.snapshot.total_points());
    let max_points = versioned.snapshot.max_points();
    let passed = versioned.snapshot.passed(total_points);

    Ok(ResultsView { attempt, versioned, total_points, max_points, passed })
}

/// Builds snapshot entries from live questions and their answers.
pub(crate) fn question_inits(
    questions: &[Question],
    answers: &HashMap<Uuid, Vec<Answer>>,
) -> Vec<QuestionInit> {
    questions
        .iter()
        .map(|question| {
            let options = answers.get(&question.id).map(Vec::as_slice).unwrap_or_default();
            QuestionInit {
                question_id: question.id,
                order: question.order_index,
                question_text: question.text_of_question.clone(),
                max_points: scoring::max_points(options),
                multi_select: scoring::selection_kind(options).is_multi(),
            }
        })
        .collect()
}

async fn save_selections(
    pool: &PgPool,
    attempt: TestAttempt,
    selections: &AnswerSelections,
) -> Result<SaveOutcome, WorkflowError> {
    let versioned = ensure_snapshot(pool, &attempt, None).await?;
    if selections.is_empty() {
        let revision = versioned.revision;
        return Ok(SaveOutcome { attempt, revision, saved: 0, ignored: Vec::new() });
    }

    let mut entries = Vec::with_capacity(selections.len());
    for question_id in selections.keys() {
        let entry = versioned.snapshot.entry(*question_id).ok_or(
            VersionStoreError::UnknownQuestion {
                attempt_id: attempt.id,
                question_id: *question_id,
            },
        )?;
        entries.push(entry);
    }
    entries.sort_by_key(|entry| entry.order);

    let question_ids: Vec<Uuid> = entries.iter().map(|entry| entry.question_id).collect();
    let options = repositories::answers::map_by_questions(pool, &question_ids).await?;

    let mut ignored = Vec::new();
    let mut updates = Vec::with_capacity(entries.len());
    for entry in entries {
        let answers = options.get(&entry.question_id).map(Vec::as_slice).unwrap_or_default();
        let selected = selections.get(&entry.question_id).map(Vec::as_slice).unwrap_or_default();
        let scored = scoring::score_selection(answers, selected);
        ignored.extend(scored.ignored.iter().copied());
        updates.push(AnswerUpdate::from_scored(entry, scoring::max_points(answers), scored));
    }

    let saved = updates.len();
    let mut revision = versioned.revision;
    let mut tx = pool.begin().await?;
    for update in updates {
        revision = attempt_versions::upsert_answer(&mut *tx, attempt.id, update).await?;
    }
    tx.commit().await?;

    metrics::counter!(ATTEMPT_SAVES).increment(saved as u64);
    if !ignored.is_empty() {
        tracing::debug!(
            attempt_id = %attempt.id,
            ignored = ignored.len(),
            "Ignored answer ids that do not belong to their question"
        );
    }

    Ok(SaveOutcome { attempt, revision, saved, ignored })
}

async fn ensure_snapshot(
    pool: &PgPool,
    attempt: &TestAttempt,
    test: Option<&TestDefinition>,
) -> Result<VersionedSnapshot, WorkflowError> {
    if let Some(versioned) = attempt_versions::read(pool, attempt.id).await? {
        return Ok(versioned);
    }

    let loaded;
    let test = match test {
        Some(test) => test,
        None => {
            loaded = fetch_test(pool, attempt.test_id).await?;
            &loaded
        }
    };

    let questions = repositories::questions::list_by_test(pool, test.id).await?;
    let question_ids: Vec<Uuid> = questions.iter().map(|question| question.id).collect();
    let answers = repositories::answers::map_by_questions(pool, &question_ids).await?;

    Ok(attempt_versions::initialize_if_empty(
        pool,
        attempt.id,
        attempt.attempt_no,
        question_inits(&questions, &answers),
        &test.title,
        test.min_point,
    )
    .await?)
}

async fn fetch_test(pool: &PgPool, test_id: Uuid) -> Result<TestDefinition, WorkflowError> {
    repositories::test_definitions::find_by_id(pool, test_id)
        .await?
        .ok_or(WorkflowError::TestNotFound(test_id))
}

async fn load_owned(pool: &PgPool, target: AttemptRef) -> Result<TestAttempt, WorkflowError> {
    let attempt = repositories::attempts::find_by_id(pool, target.attempt_id)
        .await?
        .ok_or(WorkflowError::AttemptNotFound(target.attempt_id))?;

    if attempt.test_id != target.test_id {
        return Err(WorkflowError::AttemptNotFound(target.attempt_id));
    }
    if attempt.student_id != target.student_id {
        return Err(WorkflowError::NotOwner(target.attempt_id));
    }

    Ok(attempt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    fn question(order: i32, text: &str) -> Question {
        Question {
            id: Uuid::new_v4(),
            test_id: Some(Uuid::new_v4()),
            draft_id: None,
            order_index: order,
            text_of_question: text.to_string(),
        }
    }

    fn answer(question_id: Uuid, score: i32) -> Answer {
        Answer { id: Uuid::new_v4(), question_id, text: format!("{score} points"), score }
    }

    #[test]
    fn question_inits_capture_points_and_kind() {
        let single = question(1, "single");
        let multi = question(2, "multi");
        let bare = question(3, "no answers");
        let mut answers = HashMap::new();
        answers.insert(single.id, vec![answer(single.id, 1), answer(single.id, 0)]);
        answers.insert(
            multi.id,
            vec![answer(multi.id, 1), answer(multi.id, 1), answer(multi.id, 0)],
        );

        let inits = question_inits(&[single.clone(), multi.clone(), bare.clone()], &answers);

        assert_eq!(inits.len(), 3);
        assert_eq!((inits[0].max_points, inits[0].multi_select), (1, false));
        assert_eq!((inits[1].max_points, inits[1].multi_select), (2, true));
        assert_eq!((inits[2].max_points, inits[2].multi_select), (0, false));
        assert_eq!(inits[1].question_text, "multi");
    }

    #[tokio::test]
    async fn concurrent_saves_to_different_questions_both_land() {
        let Some(ctx) = test_support::setup_test_context().await else {
            return;
        };
        let pool = ctx.state.db();
        let seeded = test_support::seed_sample_test(pool, None).await;
        let student = Uuid::new_v4();
        let attempt = test_support::insert_attempt(pool, student, seeded.test_id).await;
        test_support::init_snapshot(pool, &attempt).await;
        let initial =
            attempt_versions::read(pool, attempt.id).await.expect("read").expect("snapshot");
        let target =
            AttemptRef { student_id: student, test_id: seeded.test_id, attempt_id: attempt.id };

        let first = HashMap::from([(seeded.q1, vec![seeded.a1])]);
        let second = HashMap::from([(seeded.q2, vec![seeded.b1, seeded.b2])]);
        let (left, right) =
            tokio::join!(save(&ctx.state, target, &first), save(&ctx.state, target, &second));
        left.expect("first save");
        right.expect("second save");

        let versioned =
            attempt_versions::read(pool, attempt.id).await.expect("read").expect("snapshot");
        let q1 = versioned.snapshot.entry(seeded.q1).expect("q1");
        let q2 = versioned.snapshot.entry(seeded.q2).expect("q2");
        assert_eq!(q1.answer_ids, vec![seeded.a1]);
        assert_eq!(q1.earned_points, 1);
        assert_eq!(q2.answer_ids.len(), 2);
        assert_eq!(q2.earned_points, 2);
        assert_eq!(versioned.snapshot.total_points(), 3);
        assert_eq!(versioned.revision, initial.revision + 2);
    }

    #[tokio::test]
    async fn review_of_forced_attempt_reports_forced() {
        let Some(ctx) = test_support::setup_test_context().await else {
            return;
        };
        let pool = ctx.state.db();
        let seeded = test_support::seed_sample_test(pool, None).await;
        let student = Uuid::new_v4();
        let attempt = test_support::insert_attempt(pool, student, seeded.test_id).await;
        let target =
            AttemptRef { student_id: student, test_id: seeded.test_id, attempt_id: attempt.id };
        let selections = HashMap::from([(seeded.q1, vec![seeded.a1])]);

        let outcome = finish(&ctx.state, target, Some(&selections), true).await.expect("finish");
        assert!(matches!(outcome, FinishOutcome::Completed { forced: true, .. }));

        let reviewed = review(&ctx.state, target).await.expect("review");
        assert!(matches!(reviewed, FinishOutcome::Completed { forced: true, .. }));
    }

    #[tokio::test]
    async fn review_of_fully_answered_attempt_is_not_forced() {
        let Some(ctx) = test_support::setup_test_context().await else {
            return;
        };
        let pool = ctx.state.db();
        let seeded = test_support::seed_sample_test(pool, None).await;
        let student = Uuid::new_v4();
        let attempt = test_support::insert_attempt(pool, student, seeded.test_id).await;
        let target =
            AttemptRef { student_id: student, test_id: seeded.test_id, attempt_id: attempt.id };
        let selections =
            HashMap::from([(seeded.q1, vec![seeded.a2]), (seeded.q2, vec![seeded.b3])]);

        let outcome = finish(&ctx.state, target, Some(&selections), false).await.expect("finish");
        assert!(matches!(outcome, FinishOutcome::Completed { forced: false, .. }));

        let reviewed = review(&ctx.state, target).await.expect("review");
        assert!(matches!(reviewed, FinishOutcome::Completed { forced: false, .. }));
    }
}
