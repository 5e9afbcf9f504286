use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::models::Answer;

/// Derived from the answer set on demand; never stored on the question row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum SelectionKind {
    Single,
    Multi,
}

impl SelectionKind {
    pub(crate) fn is_multi(self) -> bool {
        matches!(self, Self::Multi)
    }
}

/// Result of scoring one question's selection against its answer set.
/// Texts and points are denormalized so later edits to answers cannot change
/// what the attempt recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ScoredSelection {
    pub(crate) answer_ids: Vec<Uuid>,
    pub(crate) answer_texts: Vec<String>,
    pub(crate) answer_points: Vec<i32>,
    pub(crate) earned_points: i32,
    pub(crate) ignored: Vec<Uuid>,
}

pub(crate) fn max_points(answers: &[Answer]) -> i32 {
    answers.iter().map(|answer| answer.score.max(0)).sum()
}

pub(crate) fn selection_kind(answers: &[Answer]) -> SelectionKind {
    let positive = answers.iter().filter(|answer| answer.score > 0).count();
    if positive > 1 {
        SelectionKind::Multi
    } else {
        SelectionKind::Single
    }
}

/// Scores `selected` against `answers`, keeping submission order.
///
/// Duplicate ids count once. Ids that do not belong to the answer set are
/// dropped and reported in `ignored` rather than failing the save. A
/// single-select question keeps only its first recognised id.
pub(crate) fn score_selection(answers: &[Answer], selected: &[Uuid]) -> ScoredSelection {
    let kind = selection_kind(answers);
    let mut scored = ScoredSelection::default();

    for id in selected {
        if scored.answer_ids.contains(id) || scored.ignored.contains(id) {
            continue;
        }

        let Some(answer) = answers.iter().find(|answer| answer.id == *id) else {
            scored.ignored.push(*id);
            continue;
        };

        if !kind.is_multi() && !scored.answer_ids.is_empty() {
            scored.ignored.push(*id);
            continue;
        }

        scored.answer_ids.push(answer.id);
        scored.answer_texts.push(answer.text.clone());
        scored.answer_points.push(answer.score);
        scored.earned_points += answer.score;
    }

    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer(question_id: Uuid, text: &str, score: i32) -> Answer {
        Answer { id: Uuid::new_v4(), question_id, text: text.to_string(), score }
    }

    #[test]
    fn one_positive_answer_is_single_select() {
        let q = Uuid::new_v4();
        let answers = vec![answer(q, "A1", 1), answer(q, "A2", 0)];

        assert_eq!(selection_kind(&answers), SelectionKind::Single);
        assert_eq!(max_points(&answers), 1);
    }

    #[test]
    fn two_positive_answers_make_multi_select() {
        let q = Uuid::new_v4();
        let answers = vec![answer(q, "B1", 1), answer(q, "B2", 1), answer(q, "B3", 0)];

        assert_eq!(selection_kind(&answers), SelectionKind::Multi);
        assert_eq!(max_points(&answers), 2);
    }

    #[test]
    fn empty_answer_set_scores_nothing() {
        assert_eq!(selection_kind(&[]), SelectionKind::Single);
        assert_eq!(max_points(&[]), 0);
        assert_eq!(score_selection(&[], &[Uuid::new_v4()]).earned_points, 0);
    }

    #[test]
    fn multi_select_sums_selected_scores() {
        let q = Uuid::new_v4();
        let answers = vec![answer(q, "B1", 1), answer(q, "B2", 1), answer(q, "B3", 0)];

        let scored = score_selection(&answers, &[answers[0].id, answers[1].id]);
        assert_eq!(scored.earned_points, 2);
        assert_eq!(scored.answer_texts, vec!["B1".to_string(), "B2".to_string()]);
        assert_eq!(scored.answer_points, vec![1, 1]);
        assert!(scored.ignored.is_empty());
    }

    #[test]
    fn unknown_ids_contribute_zero_and_are_reported() {
        let q = Uuid::new_v4();
        let answers = vec![answer(q, "A1", 1), answer(q, "A2", 0)];
        let stranger = Uuid::new_v4();

        let scored = score_selection(&answers, &[stranger, answers[0].id]);
        assert_eq!(scored.answer_ids, vec![answers[0].id]);
        assert_eq!(scored.earned_points, 1);
        assert_eq!(scored.ignored, vec![stranger]);
    }

    #[test]
    fn duplicates_count_once() {
        let q = Uuid::new_v4();
        let answers = vec![answer(q, "B1", 2), answer(q, "B2", 3)];

        let scored = score_selection(&answers, &[answers[1].id, answers[1].id, answers[0].id]);
        assert_eq!(scored.answer_ids, vec![answers[1].id, answers[0].id]);
        assert_eq!(scored.earned_points, 5);
        assert!(scored.ignored.is_empty());
    }

    #[test]
    fn single_select_keeps_first_choice() {
        let q = Uuid::new_v4();
        let answers = vec![answer(q, "A1", 1), answer(q, "A2", 0)];

        let scored = score_selection(&answers, &[answers[1].id, answers[0].id]);
        assert_eq!(scored.answer_ids, vec![answers[1].id]);
        assert_eq!(scored.earned_points, 0);
        assert_eq!(scored.ignored, vec![answers[0].id]);
    }

    #[test]
    fn earned_never_exceeds_max() {
        let q = Uuid::new_v4();
        let answers =
            vec![answer(q, "a", 4), answer(q, "b", 0), answer(q, "c", 2), answer(q, "d", 1)];
        let all: Vec<Uuid> = answers.iter().map(|answer| answer.id).collect();

        for end in 0..=all.len() {
            let scored = score_selection(&answers, &all[..end]);
            assert!(scored.earned_points <= max_points(&answers));
        }
    }
}
