// src/models/quiz.rs

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use validator::Validate;

/// One multiple-choice question inside a quiz.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    pub question_text: String,

    /// Answer options in display order.
    pub options: Vec<String>,

    /// Index into `options` of the correct answer.
    pub correct_index: i64,
}

/// Represents the 'quizzes' table in the database.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Quiz {
    pub id: i64,
    pub title: String,
    pub subject: Option<String>,

    /// Cohort the quiz is assigned to, e.g. "10" or "10-A".
    pub class_name: String,

    /// Ordered questions, stored as a JSON array.
    pub questions: Json<Vec<QuizQuestion>>,

    /// User id of the authoring teacher.
    pub created_by: i64,
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Quiz metadata joined into attempt listings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizInfo {
    pub id: i64,
    pub title: String,
    pub subject: Option<String>,
    pub class_name: String,
    pub questions: Json<Vec<QuizQuestion>>,
}

impl From<&Quiz> for QuizInfo {
    fn from(quiz: &Quiz) -> Self {
        Self {
            id: quiz.id,
            title: quiz.title.clone(),
            subject: quiz.subject.clone(),
            class_name: quiz.class_name.clone(),
            questions: quiz.questions.clone(),
        }
    }
}

/// Insert payload handed to the store.
#[derive(Debug, Clone)]
pub struct NewQuiz {
    pub title: String,
    pub subject: Option<String>,
    pub class_name: String,
    pub questions: Vec<QuizQuestion>,
    pub created_by: i64,
    pub due_date: Option<DateTime<Utc>>,
}

/// Query parameters for listing quizzes.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizFilter {
    pub class_name: Option<String>,
    pub subject: Option<String>,
}

impl QuizFilter {
    pub fn matches(&self, quiz: &Quiz) -> bool {
        self.class_name.as_deref().is_none_or(|c| quiz.class_name == c)
            && self
                .subject
                .as_deref()
                .is_none_or(|s| quiz.subject.as_deref() == Some(s))
    }
}

/// DTO for creating a new quiz.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateQuizRequest {
    #[serde(default)]
    #[validate(length(min = 1, max = 200, message = "Title is required."))]
    pub title: String,

    #[validate(length(max = 100))]
    pub subject: Option<String>,

    #[serde(default)]
    #[validate(length(min = 1, max = 20, message = "className is required."))]
    pub class_name: String,

    #[serde(default, deserialize_with = "deserialize_due_date")]
    pub due_date: Option<DateTime<Utc>>,

    #[serde(default)]
    #[validate(
        length(min = 1, message = "At least one question is required."),
        custom(function = validate_questions)
    )]
    pub questions: Vec<QuizQuestion>,
}

impl CreateQuizRequest {
    pub fn into_new_quiz(self, created_by: i64) -> NewQuiz {
        NewQuiz {
            title: self.title.trim().to_string(),
            subject: self.subject.filter(|s| !s.trim().is_empty()),
            class_name: self.class_name.trim().to_string(),
            questions: self.questions,
            created_by,
            due_date: self.due_date,
        }
    }
}

/// Every question needs text, at least two options, and a correct index
/// that points into its options.
fn validate_questions(questions: &[QuizQuestion]) -> Result<(), validator::ValidationError> {
    for q in questions {
        if q.question_text.trim().is_empty() {
            return Err(validator::ValidationError::new("question_text_required"));
        }
        if q.options.len() < 2 {
            return Err(validator::ValidationError::new("at_least_two_options"));
        }
        if q.correct_index < 0 || q.correct_index as usize >= q.options.len() {
            return Err(validator::ValidationError::new("correct_index_out_of_range"));
        }
    }
    Ok(())
}

/// Accepts either an RFC 3339 timestamp or a bare `YYYY-MM-DD` date
/// (the shape an HTML date input produces), which is read as midnight UTC.
fn deserialize_due_date<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    let Some(raw) = raw.filter(|s| !s.trim().is_empty()) else {
        return Ok(None);
    };
    let raw = raw.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(ts.with_timezone(&Utc)));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| Some(dt.and_utc()))
        .ok_or_else(|| serde::de::Error::custom(format!("invalid dueDate '{}'", raw)))
}
