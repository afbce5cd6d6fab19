// src/models/attempt.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, types::Json};

use crate::models::quiz::QuizInfo;

/// Marker stored for a question the student left unanswered.
pub const UNANSWERED: i64 = -1;

/// Represents the 'quiz_attempts' table in the database.
/// One row per (quiz, email); rows are never updated.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizAttempt {
    pub id: i64,
    #[serde(rename = "quiz")]
    pub quiz_id: i64,
    pub name: String,
    pub email: String,
    pub class_name: String,

    /// Number of correct answers.
    pub score: i64,

    /// Number of questions in the quiz when the attempt was recorded.
    pub total: i64,

    /// Chosen option index per question.
    pub answers: Json<Vec<i64>>,
    pub created_at: DateTime<Utc>,
}

/// Insert payload handed to the store.
#[derive(Debug, Clone)]
pub struct NewAttempt {
    pub quiz_id: i64,
    pub name: String,
    pub email: String,
    pub class_name: String,
    pub score: i64,
    pub total: i64,
    pub answers: Vec<i64>,
}

/// A student's attempt history entry.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptSummary {
    pub quiz: i64,
    pub score: i64,
    pub total: i64,
    pub created_at: DateTime<Utc>,
}

impl From<&QuizAttempt> for AttemptSummary {
    fn from(a: &QuizAttempt) -> Self {
        Self {
            quiz: a.quiz_id,
            score: a.score,
            total: a.total,
            created_at: a.created_at,
        }
    }
}

/// Attempt with its quiz metadata joined in, for teacher and parent views.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptWithQuiz {
    pub id: i64,
    pub quiz: QuizInfo,
    pub name: String,
    pub email: String,
    pub class_name: String,
    pub score: i64,
    pub total: i64,
    pub answers: Json<Vec<i64>>,
    pub created_at: DateTime<Utc>,
}

impl AttemptWithQuiz {
    pub fn new(attempt: QuizAttempt, quiz: QuizInfo) -> Self {
        Self {
            id: attempt.id,
            quiz,
            name: attempt.name,
            email: attempt.email,
            class_name: attempt.class_name,
            score: attempt.score,
            total: attempt.total,
            answers: attempt.answers,
            created_at: attempt.created_at,
        }
    }
}

/// DTO for submitting a quiz attempt.
///
/// Every field is optional at the JSON level so that missing values reach
/// the handler and are reported with a specific message.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAttemptRequest {
    /// Chosen option per question; `null` means unanswered.
    pub answers: Option<Vec<Option<i64>>>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub class_name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAttemptResponse {
    pub message: String,
    pub score: i64,
    pub total: i64,
    pub already_submitted: bool,
}

/// Query parameters for the by-student listing.
#[derive(Debug, Deserialize)]
pub struct StudentQuery {
    pub email: Option<String>,
}

/// Query parameters for class-scoped views.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassQuery {
    pub class_name: Option<String>,
}

/// Per-student progress within a class. Computed on demand, never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassProgressRow {
    pub email: String,
    pub name: String,
    pub class_name: String,
    pub attempts_count: i64,
    pub total_quizzes: i64,

    /// Mean percentage score, one decimal place.
    pub avg_score: f64,

    /// Share of the class's quizzes attempted, one decimal place.
    pub attendance_percent: f64,
}
