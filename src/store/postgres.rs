// src/store/postgres.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, types::Json};

use super::{Store, StoreError};
use crate::{
    models::{
        attempt::{AttemptSummary, AttemptWithQuiz, NewAttempt, QuizAttempt},
        quiz::{NewQuiz, Quiz, QuizFilter, QuizInfo, QuizQuestion},
        user::{NewUser, User},
    },
    otp::{OtpCheck, OtpPurpose, OtpStore},
};

const USER_COLUMNS: &str = "id, name, email, password_hash, role, class_name, department, \
     parent_phone, parent_access_code, parent_of, created_at";

const QUIZ_COLUMNS: &str =
    "id, title, subject, class_name, questions, created_by, due_date, created_at, updated_at";

const ATTEMPT_COLUMNS: &str =
    "id, quiz_id, name, email, class_name, score, total, answers, created_at";

/// Flat row of an attempt joined with its quiz.
#[derive(FromRow)]
struct AttemptQuizRow {
    id: i64,
    quiz_id: i64,
    name: String,
    email: String,
    class_name: String,
    score: i64,
    total: i64,
    answers: Json<Vec<i64>>,
    created_at: DateTime<Utc>,
    quiz_title: String,
    quiz_subject: Option<String>,
    quiz_class_name: String,
    quiz_questions: Json<Vec<QuizQuestion>>,
}

impl From<AttemptQuizRow> for AttemptWithQuiz {
    fn from(row: AttemptQuizRow) -> Self {
        AttemptWithQuiz {
            id: row.id,
            quiz: QuizInfo {
                id: row.quiz_id,
                title: row.quiz_title,
                subject: row.quiz_subject,
                class_name: row.quiz_class_name,
                questions: row.quiz_questions,
            },
            name: row.name,
            email: row.email,
            class_name: row.class_name,
            score: row.score,
            total: row.total,
            answers: row.answers,
            created_at: row.created_at,
        }
    }
}

const ATTEMPT_QUIZ_SELECT: &str = r#"
    SELECT
        a.id, a.quiz_id, a.name, a.email, a.class_name,
        a.score, a.total, a.answers, a.created_at,
        q.title AS quiz_title,
        q.subject AS quiz_subject,
        q.class_name AS quiz_class_name,
        q.questions AS quiz_questions
    FROM quiz_attempts a
    JOIN quizzes q ON q.id = a.quiz_id
"#;

/// Postgres-backed store. Uniqueness and cascades are enforced by the
/// schema in `migrations/`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO users (name, email, password_hash, role, class_name, parent_phone, parent_of)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {USER_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, User>(&sql)
            .bind(user.name)
            .bind(user.email)
            .bind(user.password_hash)
            .bind(user.role.as_str())
            .bind(user.class_name)
            .bind(user.parent_phone)
            .bind(user.parent_of)
            .fetch_one(&self.pool)
            .await?;
        Ok(row)
    }

    async fn find_user_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_student_by_access_code(&self, code: &str) -> Result<Option<User>, StoreError> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE role = 'student' AND parent_access_code = $1"
        );
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(code)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn update_password(&self, user_id: i64, password_hash: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
            .bind(password_hash)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_parent_access_code(&self, user_id: i64, code: &str) -> Result<bool, StoreError> {
        let updated = sqlx::query(
            "UPDATE users SET parent_access_code = $1 WHERE id = $2 AND parent_access_code IS NULL",
        )
        .bind(code)
        .bind(user_id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(updated > 0)
    }

    async fn update_class_name(&self, user_id: i64, class_name: &str) -> Result<Option<User>, StoreError> {
        let sql = format!("UPDATE users SET class_name = $1 WHERE id = $2 RETURNING {USER_COLUMNS}");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(class_name)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn insert_quiz(&self, quiz: NewQuiz) -> Result<Quiz, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO quizzes (title, subject, class_name, questions, created_by, due_date)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {QUIZ_COLUMNS}
            "#
        );
        Ok(sqlx::query_as::<_, Quiz>(&sql)
            .bind(quiz.title)
            .bind(quiz.subject)
            .bind(quiz.class_name)
            .bind(Json(quiz.questions))
            .bind(quiz.created_by)
            .bind(quiz.due_date)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn find_quiz(&self, id: i64) -> Result<Option<Quiz>, StoreError> {
        let sql = format!("SELECT {QUIZ_COLUMNS} FROM quizzes WHERE id = $1");
        Ok(sqlx::query_as::<_, Quiz>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_quizzes(&self, filter: &QuizFilter) -> Result<Vec<Quiz>, StoreError> {
        let sql = format!(
            r#"
            SELECT {QUIZ_COLUMNS}
            FROM quizzes
            WHERE ($1::TEXT IS NULL OR class_name = $1)
              AND ($2::TEXT IS NULL OR subject = $2)
            ORDER BY created_at DESC, id DESC
            "#
        );
        Ok(sqlx::query_as::<_, Quiz>(&sql)
            .bind(filter.class_name.as_deref())
            .bind(filter.subject.as_deref())
            .fetch_all(&self.pool)
            .await?)
    }

    async fn quiz_ids_for_class(&self, class_name: &str) -> Result<Vec<i64>, StoreError> {
        Ok(sqlx::query_scalar::<_, i64>("SELECT id FROM quizzes WHERE class_name = $1")
            .bind(class_name)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn delete_quiz_cascade(&self, id: i64) -> Result<Option<u64>, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Attempts first, so the quiz row is the last thing to go.
        let removed = sqlx::query("DELETE FROM quiz_attempts WHERE quiz_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let deleted = sqlx::query("DELETE FROM quizzes WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if deleted == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        tx.commit().await?;
        Ok(Some(removed))
    }

    async fn insert_attempt(&self, attempt: NewAttempt) -> Result<QuizAttempt, StoreError> {
        // No ON CONFLICT clause: a second attempt must surface as a unique violation.
        let sql = format!(
            r#"
            INSERT INTO quiz_attempts (quiz_id, name, email, class_name, score, total, answers)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {ATTEMPT_COLUMNS}
            "#
        );
        Ok(sqlx::query_as::<_, QuizAttempt>(&sql)
            .bind(attempt.quiz_id)
            .bind(attempt.name)
            .bind(attempt.email)
            .bind(attempt.class_name)
            .bind(attempt.score)
            .bind(attempt.total)
            .bind(Json(attempt.answers))
            .fetch_one(&self.pool)
            .await?)
    }

    async fn attempts_by_email(&self, email: &str) -> Result<Vec<AttemptSummary>, StoreError> {
        Ok(sqlx::query_as::<_, AttemptSummary>(
            r#"
            SELECT quiz_id AS quiz, score, total, created_at
            FROM quiz_attempts
            WHERE email = $1
            ORDER BY id
            "#,
        )
        .bind(email)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn attempts_by_class(&self, class_name: &str) -> Result<Vec<AttemptWithQuiz>, StoreError> {
        let sql = format!(
            "{ATTEMPT_QUIZ_SELECT} WHERE a.class_name = $1 ORDER BY a.created_at DESC, a.id DESC"
        );
        let rows = sqlx::query_as::<_, AttemptQuizRow>(&sql)
            .bind(class_name)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(AttemptWithQuiz::from).collect())
    }

    async fn attempts_with_quiz_by_email(&self, email: &str) -> Result<Vec<AttemptWithQuiz>, StoreError> {
        let sql = format!(
            "{ATTEMPT_QUIZ_SELECT} WHERE a.email = $1 ORDER BY a.created_at DESC, a.id DESC"
        );
        let rows = sqlx::query_as::<_, AttemptQuizRow>(&sql)
            .bind(email)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(AttemptWithQuiz::from).collect())
    }

    async fn attempts_for_quizzes(
        &self,
        class_name: &str,
        quiz_ids: &[i64],
    ) -> Result<Vec<QuizAttempt>, StoreError> {
        let sql = format!(
            r#"
            SELECT {ATTEMPT_COLUMNS}
            FROM quiz_attempts
            WHERE class_name = $1 AND quiz_id = ANY($2)
            ORDER BY created_at, id
            "#
        );
        Ok(sqlx::query_as::<_, QuizAttempt>(&sql)
            .bind(class_name)
            .bind(quiz_ids)
            .fetch_all(&self.pool)
            .await?)
    }
}

/// Pending OTPs live in a table so every instance behind a load balancer
/// sees the same codes.
#[async_trait]
impl OtpStore for PgStore {
    async fn issue(
        &self,
        purpose: OtpPurpose,
        email: &str,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO pending_otps (purpose, email, code, expires_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (purpose, email) DO UPDATE SET
                code = EXCLUDED.code,
                expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(purpose.as_str())
        .bind(email)
        .bind(code)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn check(
        &self,
        purpose: OtpPurpose,
        email: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<OtpCheck, StoreError> {
        let pending: Option<(String, DateTime<Utc>)> = sqlx::query_as(
            "SELECT code, expires_at FROM pending_otps WHERE purpose = $1 AND email = $2",
        )
        .bind(purpose.as_str())
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        let Some((stored, expires_at)) = pending else {
            return Ok(OtpCheck::Missing);
        };

        if expires_at < now {
            self.consume(purpose, email).await?;
            return Ok(OtpCheck::Expired);
        }

        Ok(if stored == code { OtpCheck::Valid } else { OtpCheck::Mismatch })
    }

    async fn consume(&self, purpose: OtpPurpose, email: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM pending_otps WHERE purpose = $1 AND email = $2")
            .bind(purpose.as_str())
            .bind(email)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
