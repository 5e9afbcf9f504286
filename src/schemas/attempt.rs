use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::core::time::format_primitive;
use crate::db::models::{Answer, TestAttempt};
use crate::db::types::AttemptStatus;
use crate::services::attempt_lifecycle::MissingQuestion;
use crate::services::attempt_snapshot::QuestionEntry;
use crate::services::attempt_workflow::{AttemptView, ResultsView};
use crate::services::scoring::SelectionKind;

pub(crate) const MAX_QUESTIONS_PER_SAVE: usize = 500;
pub(crate) const MAX_ANSWERS_PER_QUESTION: usize = 100;

#[derive(Debug, Deserialize)]
pub(crate) struct TakeQuery {
    #[serde(default)]
    pub(crate) attempt_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct SaveAnswersRequest {
    #[validate(custom(function = "validate_selection_map"))]
    pub(crate) answers: HashMap<String, Vec<String>>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub(crate) struct FinishRequest {
    #[serde(default)]
    #[validate(custom(function = "validate_selection_map"))]
    pub(crate) answers: Option<HashMap<String, Vec<String>>>,
    #[serde(default)]
    pub(crate) force: bool,
}

fn validate_selection_map(value: &HashMap<String, Vec<String>>) -> Result<(), ValidationError> {
    if value.len() > MAX_QUESTIONS_PER_SAVE {
        return Err(ValidationError::new("too_many_questions"));
    }
    if value.values().any(|ids| ids.len() > MAX_ANSWERS_PER_QUESTION) {
        return Err(ValidationError::new("too_many_answers"));
    }
    Ok(())
}

#[derive(Debug, Serialize)]
pub(crate) struct AttemptSummary {
    pub(crate) id: Uuid,
    pub(crate) test_id: Uuid,
    pub(crate) student_id: Uuid,
    pub(crate) attempt_no: i32,
    pub(crate) status: AttemptStatus,
    pub(crate) total_points: Option<i32>,
    pub(crate) created_at: String,
    pub(crate) completed_at: Option<String>,
}

impl From<&TestAttempt> for AttemptSummary {
    fn from(attempt: &TestAttempt) -> Self {
        Self {
            id: attempt.id,
            test_id: attempt.test_id,
            student_id: attempt.student_id,
            attempt_no: attempt.attempt_no,
            status: attempt.status(),
            total_points: attempt.total_points,
            created_at: format_primitive(attempt.created_at),
            completed_at: attempt.completed_at.map(format_primitive),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AnswerOption {
    pub(crate) id: Uuid,
    pub(crate) text: String,
    pub(crate) selected: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct QuestionView {
    pub(crate) question_id: Uuid,
    pub(crate) order: i32,
    pub(crate) text: String,
    pub(crate) max_points: i32,
    pub(crate) selection: SelectionKind,
    pub(crate) answered: bool,
    pub(crate) selected_answer_ids: Vec<Uuid>,
    pub(crate) options: Vec<AnswerOption>,
}

impl QuestionView {
    fn build(entry: &QuestionEntry, options: &[Answer]) -> Self {
        let selection =
            if entry.multi_select { SelectionKind::Multi } else { SelectionKind::Single };

        Self {
            question_id: entry.question_id,
            order: entry.order,
            text: entry.question_text.clone(),
            max_points: entry.max_points,
            selection,
            answered: entry.is_answered(),
            selected_answer_ids: entry.answer_ids.clone(),
            options: options
                .iter()
                .map(|answer| AnswerOption {
                    id: answer.id,
                    text: answer.text.clone(),
                    selected: entry.answer_ids.contains(&answer.id),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct InProgressView {
    pub(crate) attempt: AttemptSummary,
    pub(crate) test_title: String,
    pub(crate) min_point: Option<i32>,
    pub(crate) revision: i64,
    pub(crate) total_questions: usize,
    pub(crate) answered_count: usize,
    pub(crate) missing_count: usize,
    pub(crate) questions: Vec<QuestionView>,
}

impl From<&AttemptView> for InProgressView {
    fn from(view: &AttemptView) -> Self {
        let snapshot = &view.versioned.snapshot;
        let answered_count = snapshot.answered_count();

        Self {
            attempt: AttemptSummary::from(&view.attempt),
            test_title: snapshot.test_title.clone(),
            min_point: snapshot.min_point,
            revision: view.versioned.revision,
            total_questions: snapshot.questions.len(),
            answered_count,
            missing_count: snapshot.questions.len() - answered_count,
            questions: snapshot
                .questions
                .iter()
                .map(|entry| {
                    let options =
                        view.options.get(&entry.question_id).map(Vec::as_slice).unwrap_or_default();
                    QuestionView::build(entry, options)
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub(crate) enum TakeResponse {
    InProgress(InProgressView),
    Completed { attempt: AttemptSummary, results_url: String },
}

#[derive(Debug, Serialize)]
pub(crate) struct SaveAnswersResponse {
    pub(crate) attempt_id: Uuid,
    pub(crate) revision: i64,
    pub(crate) saved: usize,
    pub(crate) ignored_answer_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum FinishNextStep {
    Results,
    Confirm,
}

#[derive(Debug, Serialize)]
pub(crate) struct FinishResponse {
    pub(crate) next_step: FinishNextStep,
    pub(crate) attempt: AttemptSummary,
    pub(crate) forced: bool,
    pub(crate) total_questions: Option<usize>,
    pub(crate) missing_count: usize,
    pub(crate) missing: Vec<MissingQuestion>,
    pub(crate) results_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ResultQuestion {
    pub(crate) question_id: Uuid,
    pub(crate) order: i32,
    pub(crate) text: String,
    pub(crate) max_points: i32,
    pub(crate) earned_points: i32,
    pub(crate) answer_ids: Vec<Uuid>,
    pub(crate) answer_texts: Vec<String>,
    pub(crate) answer_points: Vec<i32>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ResultsResponse {
    pub(crate) attempt: AttemptSummary,
    pub(crate) test_title: String,
    pub(crate) total_points: i32,
    pub(crate) max_points: i32,
    pub(crate) min_point: Option<i32>,
    pub(crate) passed: bool,
    pub(crate) questions: Vec<ResultQuestion>,
}

impl From<ResultsView> for ResultsResponse {
    fn from(view: ResultsView) -> Self {
        let snapshot = view.versioned.snapshot;

        Self {
            attempt: AttemptSummary::from(&view.attempt),
            test_title: snapshot.test_title,
            total_points: view.total_points,
            max_points: view.max_points,
            min_point: snapshot.min_point,
            passed: view.passed,
            questions: snapshot
                .questions
                .into_iter()
                .map(|entry| ResultQuestion {
                    question_id: entry.question_id,
                    order: entry.order,
                    text: entry.question_text,
                    max_points: entry.max_points,
                    earned_points: entry.earned_points,
                    answer_ids: entry.answer_ids,
                    answer_texts: entry.answer_texts,
                    answer_points: entry.answer_points,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_request_defaults_to_no_force() {
        let request: FinishRequest = serde_json::from_str("{}").expect("finish request");
        assert!(!request.force);
        assert!(request.answers.is_none());
        assert!(request.validate().is_ok());
    }

    #[test]
    fn oversized_selection_is_rejected() {
        let ids = vec![Uuid::new_v4().to_string(); MAX_ANSWERS_PER_QUESTION + 1];
        let request = SaveAnswersRequest {
            answers: HashMap::from([(Uuid::new_v4().to_string(), ids)]),
        };
        assert!(request.validate().is_err());

        let finish = FinishRequest {
            answers: Some(HashMap::from([(
                Uuid::new_v4().to_string(),
                vec![String::new(); MAX_ANSWERS_PER_QUESTION + 1],
            )])),
            force: true,
        };
        assert!(finish.validate().is_err());
    }
}
