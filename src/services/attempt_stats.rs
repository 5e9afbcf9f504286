use std::collections::BTreeMap;

use serde::Serialize;
use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::repositories::attempts::StudentAttemptRow;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StudentStats {
    pub(crate) user_id: Uuid,
    pub(crate) attempts_total: usize,
    pub(crate) attempts_passed: usize,
    pub(crate) best_score: Option<i32>,
    pub(crate) last_attempt_at: Option<PrimitiveDateTime>,
    pub(crate) per_test: Vec<TestStats>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct TestStats {
    pub(crate) test_id: Uuid,
    pub(crate) test_title: String,
    pub(crate) attempts: usize,
    pub(crate) best_score: Option<i32>,
    pub(crate) passed_count: usize,
}

/// `None` until the attempt is completed with a score; no threshold passes.
pub(crate) fn passed(
    completed: bool,
    total_points: Option<i32>,
    min_point: Option<i32>,
) -> Option<bool> {
    if !completed {
        return None;
    }
    let total_points = total_points?;
    Some(min_point.map_or(true, |min_point| total_points >= min_point))
}

pub(crate) fn row_passed(row: &StudentAttemptRow) -> Option<bool> {
    passed(row.completed, row.total_points, row.min_point)
}

pub(crate) fn aggregate(user_id: Uuid, rows: &[StudentAttemptRow]) -> StudentStats {
    let mut per_test: BTreeMap<Uuid, TestStats> = BTreeMap::new();

    for row in rows {
        let stats = per_test.entry(row.test_id).or_insert_with(|| TestStats {
            test_id: row.test_id,
            test_title: row.test_title.clone(),
            attempts: 0,
            best_score: None,
            passed_count: 0,
        });
        stats.attempts += 1;
        stats.best_score = stats.best_score.max(row.total_points);
        if row_passed(row) == Some(true) {
            stats.passed_count += 1;
        }
    }

    let mut per_test: Vec<TestStats> = per_test.into_values().collect();
    per_test.sort_by(|left, right| left.test_title.cmp(&right.test_title));

    StudentStats {
        user_id,
        attempts_total: rows.len(),
        attempts_passed: rows.iter().filter(|row| row_passed(row) == Some(true)).count(),
        best_score: rows.iter().filter_map(|row| row.total_points).max(),
        last_attempt_at: rows
            .iter()
            .filter(|row| row.completed)
            .filter_map(|row| row.completed_at)
            .max(),
        per_test,
    }
}
