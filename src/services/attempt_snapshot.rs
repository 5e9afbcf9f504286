use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::services::scoring::ScoredSelection;

/// Live answer document attached to an attempt row.
///
/// Title, passing threshold and question wording are captured when the
/// document is first written, so display and grading never re-read the test
/// definition afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AttemptSnapshot {
    pub(crate) attempt_no: i32,
    pub(crate) test_title: String,
    pub(crate) min_point: Option<i32>,
    #[serde(default)]
    pub(crate) questions: Vec<QuestionEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QuestionEntry {
    pub(crate) question_id: Uuid,
    pub(crate) order: i32,
    pub(crate) question_text: String,
    pub(crate) max_points: i32,
    #[serde(default)]
    pub(crate) multi_select: bool,
    #[serde(default)]
    pub(crate) answer_ids: Vec<Uuid>,
    #[serde(default)]
    pub(crate) answer_texts: Vec<String>,
    #[serde(default)]
    pub(crate) answer_points: Vec<i32>,
    #[serde(default)]
    pub(crate) earned_points: i32,
}

/// Question state captured when the snapshot is initialised.
#[derive(Debug, Clone)]
pub(crate) struct QuestionInit {
    pub(crate) question_id: Uuid,
    pub(crate) order: i32,
    pub(crate) question_text: String,
    pub(crate) max_points: i32,
    pub(crate) multi_select: bool,
}

/// Full replacement of one question's answer fields.
#[derive(Debug, Clone)]
pub(crate) struct AnswerUpdate {
    pub(crate) question_id: Uuid,
    pub(crate) question_text: String,
    pub(crate) max_points: i32,
    pub(crate) answer_ids: Vec<Uuid>,
    pub(crate) answer_texts: Vec<String>,
    pub(crate) answer_points: Vec<i32>,
    pub(crate) earned_points: i32,
}

impl AnswerUpdate {
    pub(crate) fn from_scored(
        entry: &QuestionEntry,
        max_points: i32,
        scored: ScoredSelection,
    ) -> Self {
        Self {
            question_id: entry.question_id,
            question_text: entry.question_text.clone(),
            max_points,
            answer_ids: scored.answer_ids,
            answer_texts: scored.answer_texts,
            answer_points: scored.answer_points,
            earned_points: scored.earned_points,
        }
    }
}

impl QuestionEntry {
    pub(crate) fn is_answered(&self) -> bool {
        !self.answer_ids.is_empty()
    }
}

impl AttemptSnapshot {
    pub(crate) fn new(
        attempt_no: i32,
        test_title: impl Into<String>,
        min_point: Option<i32>,
        questions: Vec<QuestionInit>,
    ) -> Self {
        let mut questions: Vec<QuestionEntry> = questions
            .into_iter()
            .map(|init| QuestionEntry {
                question_id: init.question_id,
                order: init.order,
                question_text: init.question_text,
                max_points: init.max_points,
                multi_select: init.multi_select,
                answer_ids: Vec::new(),
                answer_texts: Vec::new(),
                answer_points: Vec::new(),
                earned_points: 0,
            })
            .collect();
        questions.sort_by_key(|entry| entry.order);

        Self { attempt_no, test_title: test_title.into(), min_point, questions }
    }

    pub(crate) fn entry(&self, question_id: Uuid) -> Option<&QuestionEntry> {
        self.questions.iter().find(|entry| entry.question_id == question_id)
    }

    /// Replaces the answer fields of one entry in place. Returns `false` when
    /// the question is not part of this snapshot.
    pub(crate) fn apply_answer(&mut self, update: AnswerUpdate) -> bool {
        let Some(entry) =
            self.questions.iter_mut().find(|entry| entry.question_id == update.question_id)
        else {
            return false;
        };

        entry.question_text = update.question_text;
        entry.max_points = update.max_points;
        entry.answer_ids = update.answer_ids;
        entry.answer_texts = update.answer_texts;
        entry.answer_points = update.answer_points;
        entry.earned_points = update.earned_points;
        true
    }

    pub(crate) fn unanswered(&self) -> Vec<&QuestionEntry> {
        self.questions.iter().filter(|entry| !entry.is_answered()).collect()
    }

    pub(crate) fn answered_count(&self) -> usize {
        self.questions.iter().filter(|entry| entry.is_answered()).count()
    }

    pub(crate) fn total_points(&self) -> i32 {
        self.questions.iter().map(|entry| entry.earned_points).sum()
    }

    pub(crate) fn max_points(&self) -> i32 {
        self.questions.iter().map(|entry| entry.max_points).sum()
    }

    pub(crate) fn passed(&self, total_points: i32) -> bool {
        self.min_point.map_or(true, |min_point| total_points >= min_point)
    }
}
