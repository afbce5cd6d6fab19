// src/store/mod.rs

use std::fmt;

use async_trait::async_trait;

use crate::models::{
    attempt::{AttemptSummary, AttemptWithQuiz, NewAttempt, QuizAttempt},
    quiz::{NewQuiz, Quiz, QuizFilter},
    user::{NewUser, User},
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Unique constraint names. The in-memory store reports the same names so
/// handlers can match on them regardless of backend.
pub const ATTEMPT_UNIQUE: &str = "quiz_attempts_quiz_id_email_key";
pub const USER_EMAIL_UNIQUE: &str = "users_email_key";
pub const PARENT_CODE_UNIQUE: &str = "users_parent_access_code_key";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A unique constraint rejected the write. Carries the constraint name.
    Duplicate(String),

    /// Connectivity, timeout or any other persistence failure.
    Backend(String),
}

impl StoreError {
    pub fn is_duplicate_of(&self, constraint: &str) -> bool {
        matches!(self, StoreError::Duplicate(c) if c == constraint)
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Duplicate(c) => write!(f, "unique constraint '{}' violated", c),
            StoreError::Backend(msg) => write!(f, "storage failure: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return StoreError::Duplicate(db_err.constraint().unwrap_or_default().to_string());
            }
        }
        StoreError::Backend(err.to_string())
    }
}

/// Persistence for users, quizzes and attempts.
///
/// Implementations must enforce attempt uniqueness per `(quiz_id, email)`
/// atomically inside `insert_attempt`, and must remove a quiz's attempts in
/// the same operation that removes the quiz.
#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError>;
    async fn find_user_by_id(&self, id: i64) -> Result<Option<User>, StoreError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn find_student_by_access_code(&self, code: &str) -> Result<Option<User>, StoreError>;
    async fn update_password(&self, user_id: i64, password_hash: &str) -> Result<(), StoreError>;
    /// Sets the code only while the student has none. Returns `false` when a
    /// code was already present, leaving it untouched.
    async fn set_parent_access_code(&self, user_id: i64, code: &str) -> Result<bool, StoreError>;

    /// Returns the updated user, or `None` when no such user exists.
    async fn update_class_name(&self, user_id: i64, class_name: &str) -> Result<Option<User>, StoreError>;

    async fn insert_quiz(&self, quiz: NewQuiz) -> Result<Quiz, StoreError>;
    async fn find_quiz(&self, id: i64) -> Result<Option<Quiz>, StoreError>;

    /// Newest first.
    async fn list_quizzes(&self, filter: &QuizFilter) -> Result<Vec<Quiz>, StoreError>;
    async fn quiz_ids_for_class(&self, class_name: &str) -> Result<Vec<i64>, StoreError>;

    /// Deletes the quiz and all of its attempts. Returns `None` when the quiz
    /// does not exist, otherwise the number of attempts removed.
    async fn delete_quiz_cascade(&self, id: i64) -> Result<Option<u64>, StoreError>;

    /// Fails with `StoreError::Duplicate(ATTEMPT_UNIQUE)` when the student
    /// already has an attempt for this quiz. The existing row is untouched.
    async fn insert_attempt(&self, attempt: NewAttempt) -> Result<QuizAttempt, StoreError>;
    async fn attempts_by_email(&self, email: &str) -> Result<Vec<AttemptSummary>, StoreError>;

    /// Attempts of one class joined with their quiz, newest first.
    async fn attempts_by_class(&self, class_name: &str) -> Result<Vec<AttemptWithQuiz>, StoreError>;

    /// Attempts of one student joined with their quiz, newest first.
    async fn attempts_with_quiz_by_email(&self, email: &str) -> Result<Vec<AttemptWithQuiz>, StoreError>;

    /// Attempts in `class_name` against any of `quiz_ids`, oldest first.
    async fn attempts_for_quizzes(
        &self,
        class_name: &str,
        quiz_ids: &[i64],
    ) -> Result<Vec<QuizAttempt>, StoreError>;
}
