// src/store/memory.rs

use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use chrono::Utc;
use sqlx::types::Json;

use super::{ATTEMPT_UNIQUE, PARENT_CODE_UNIQUE, Store, StoreError, USER_EMAIL_UNIQUE};
use crate::models::{
    attempt::{AttemptSummary, AttemptWithQuiz, NewAttempt, QuizAttempt},
    quiz::{NewQuiz, Quiz, QuizFilter, QuizInfo},
    user::{NewUser, User},
};

/// Single-process store. All reads and writes go through one mutex, so the
/// uniqueness checks in `insert_*` cannot interleave with another writer.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    users: BTreeMap<i64, User>,
    quizzes: BTreeMap<i64, Quiz>,
    /// Insertion order.
    attempts: Vec<QuizAttempt>,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn join(&self, attempt: &QuizAttempt) -> Option<AttemptWithQuiz> {
        self.quizzes
            .get(&attempt.quiz_id)
            .map(|q| AttemptWithQuiz::new(attempt.clone(), QuizInfo::from(q)))
    }

    fn joined_newest_first<F>(&self, keep: F) -> Vec<AttemptWithQuiz>
    where
        F: Fn(&QuizAttempt) -> bool,
    {
        let mut rows: Vec<AttemptWithQuiz> = self
            .attempts
            .iter()
            .filter(|a| keep(a))
            .filter_map(|a| self.join(a))
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        rows
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut inner = self.lock()?;
        if inner.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Duplicate(USER_EMAIL_UNIQUE.to_string()));
        }

        let id = inner.next_id();
        let row = User {
            id,
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            role: user.role.as_str().to_string(),
            class_name: user.class_name,
            department: None,
            parent_phone: user.parent_phone,
            parent_access_code: None,
            parent_of: user.parent_of,
            created_at: Some(Utc::now()),
        };
        inner.users.insert(id, row.clone());
        Ok(row)
    }

    async fn find_user_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        Ok(self.lock()?.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.lock()?.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_student_by_access_code(&self, code: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .lock()?
            .users
            .values()
            .find(|u| u.role == "student" && u.parent_access_code.as_deref() == Some(code))
            .cloned())
    }

    async fn update_password(&self, user_id: i64, password_hash: &str) -> Result<(), StoreError> {
        if let Some(user) = self.lock()?.users.get_mut(&user_id) {
            user.password_hash = password_hash.to_string();
        }
        Ok(())
    }

    async fn set_parent_access_code(&self, user_id: i64, code: &str) -> Result<bool, StoreError> {
        let mut inner = self.lock()?;
        if inner
            .users
            .values()
            .any(|u| u.id != user_id && u.parent_access_code.as_deref() == Some(code))
        {
            return Err(StoreError::Duplicate(PARENT_CODE_UNIQUE.to_string()));
        }
        match inner.users.get_mut(&user_id) {
            Some(user) if user.parent_access_code.is_none() => {
                user.parent_access_code = Some(code.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_class_name(&self, user_id: i64, class_name: &str) -> Result<Option<User>, StoreError> {
        Ok(self.lock()?.users.get_mut(&user_id).map(|user| {
            user.class_name = Some(class_name.to_string());
            user.clone()
        }))
    }

    async fn insert_quiz(&self, quiz: NewQuiz) -> Result<Quiz, StoreError> {
        let mut inner = self.lock()?;
        let id = inner.next_id();
        let now = Utc::now();
        let row = Quiz {
            id,
            title: quiz.title,
            subject: quiz.subject,
            class_name: quiz.class_name,
            questions: Json(quiz.questions),
            created_by: quiz.created_by,
            due_date: quiz.due_date,
            created_at: now,
            updated_at: now,
        };
        inner.quizzes.insert(id, row.clone());
        Ok(row)
    }

    async fn find_quiz(&self, id: i64) -> Result<Option<Quiz>, StoreError> {
        Ok(self.lock()?.quizzes.get(&id).cloned())
    }

    async fn list_quizzes(&self, filter: &QuizFilter) -> Result<Vec<Quiz>, StoreError> {
        let inner = self.lock()?;
        let mut quizzes: Vec<Quiz> = inner
            .quizzes
            .values()
            .filter(|q| filter.matches(q))
            .cloned()
            .collect();
        quizzes.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(quizzes)
    }

    async fn quiz_ids_for_class(&self, class_name: &str) -> Result<Vec<i64>, StoreError> {
        Ok(self
            .lock()?
            .quizzes
            .values()
            .filter(|q| q.class_name == class_name)
            .map(|q| q.id)
            .collect())
    }

    async fn delete_quiz_cascade(&self, id: i64) -> Result<Option<u64>, StoreError> {
        let mut inner = self.lock()?;
        if inner.quizzes.remove(&id).is_none() {
            return Ok(None);
        }
        let before = inner.attempts.len();
        inner.attempts.retain(|a| a.quiz_id != id);
        Ok(Some((before - inner.attempts.len()) as u64))
    }

    async fn insert_attempt(&self, attempt: NewAttempt) -> Result<QuizAttempt, StoreError> {
        let mut inner = self.lock()?;
        if !inner.quizzes.contains_key(&attempt.quiz_id) {
            return Err(StoreError::Backend(format!(
                "quiz {} does not exist",
                attempt.quiz_id
            )));
        }
        if inner
            .attempts
            .iter()
            .any(|a| a.quiz_id == attempt.quiz_id && a.email == attempt.email)
        {
            return Err(StoreError::Duplicate(ATTEMPT_UNIQUE.to_string()));
        }

        let id = inner.next_id();
        let row = QuizAttempt {
            id,
            quiz_id: attempt.quiz_id,
            name: attempt.name,
            email: attempt.email,
            class_name: attempt.class_name,
            score: attempt.score,
            total: attempt.total,
            answers: Json(attempt.answers),
            created_at: Utc::now(),
        };
        inner.attempts.push(row.clone());
        Ok(row)
    }

    async fn attempts_by_email(&self, email: &str) -> Result<Vec<AttemptSummary>, StoreError> {
        Ok(self
            .lock()?
            .attempts
            .iter()
            .filter(|a| a.email == email)
            .map(AttemptSummary::from)
            .collect())
    }

    async fn attempts_by_class(&self, class_name: &str) -> Result<Vec<AttemptWithQuiz>, StoreError> {
        Ok(self.lock()?.joined_newest_first(|a| a.class_name == class_name))
    }

    async fn attempts_with_quiz_by_email(&self, email: &str) -> Result<Vec<AttemptWithQuiz>, StoreError> {
        Ok(self.lock()?.joined_newest_first(|a| a.email == email))
    }

    async fn attempts_for_quizzes(
        &self,
        class_name: &str,
        quiz_ids: &[i64],
    ) -> Result<Vec<QuizAttempt>, StoreError> {
        Ok(self
            .lock()?
            .attempts
            .iter()
            .filter(|a| a.class_name == class_name && quiz_ids.contains(&a.quiz_id))
            .cloned()
            .collect())
    }
}
