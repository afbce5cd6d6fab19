// src/scoring.rs

use std::collections::BTreeMap;

use crate::models::{
    attempt::{ClassProgressRow, QuizAttempt, UNANSWERED},
    quiz::QuizQuestion,
};

/// Counts correct answers.
///
/// `answers[i]` is compared with question `i`'s correct index for every
/// question in the quiz. Missing, unanswered or out-of-range answers simply
/// don't score; extra answers beyond the last question are ignored.
pub fn calculate_score(questions: &[QuizQuestion], answers: &[i64]) -> i64 {
    questions
        .iter()
        .enumerate()
        .filter(|(i, q)| answers.get(*i) == Some(&q.correct_index))
        .count() as i64
}

/// Replaces `null` entries with the unanswered marker.
pub fn normalize_answers(raw: Vec<Option<i64>>) -> Vec<i64> {
    raw.into_iter().map(|a| a.unwrap_or(UNANSWERED)).collect()
}

/// Rounds to one decimal place, halves away from zero (percentages are
/// never negative, so this is round-half-up).
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn percent(score: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    score as f64 / total as f64 * 100.0
}

struct StudentTally<'a> {
    name: &'a str,
    attempts: i64,
    percent_sum: f64,
}

/// Builds one progress row per student from the attempts made in a class.
///
/// `attempts` should be in creation order: the display name comes from a
/// student's first attempt. Rows are ordered by email.
pub fn aggregate_class_progress(
    class_name: &str,
    total_quizzes: usize,
    attempts: &[QuizAttempt],
) -> Vec<ClassProgressRow> {
    if total_quizzes == 0 {
        return Vec::new();
    }

    let mut tallies: BTreeMap<&str, StudentTally<'_>> = BTreeMap::new();
    for attempt in attempts {
        let tally = tallies.entry(attempt.email.as_str()).or_insert(StudentTally {
            name: attempt.name.as_str(),
            attempts: 0,
            percent_sum: 0.0,
        });
        tally.attempts += 1;
        tally.percent_sum += percent(attempt.score, attempt.total);
    }

    let total_quizzes = total_quizzes as i64;
    tallies
        .into_iter()
        .map(|(email, tally)| {
            let name = if tally.name.is_empty() { email } else { tally.name };
            ClassProgressRow {
                email: email.to_string(),
                name: name.to_string(),
                class_name: class_name.to_string(),
                attempts_count: tally.attempts,
                total_quizzes,
                avg_score: round1(tally.percent_sum / tally.attempts as f64),
                attendance_percent: round1(tally.attempts as f64 / total_quizzes as f64 * 100.0),
            }
        })
        .collect()
}
