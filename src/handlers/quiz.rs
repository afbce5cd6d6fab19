// src/handlers/quiz.rs

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        attempt::{
            ClassProgressRow, ClassQuery, NewAttempt, StudentQuery, SubmitAttemptRequest,
            SubmitAttemptResponse,
        },
        quiz::{CreateQuizRequest, QuizFilter},
        user::Role,
    },
    scoring::{aggregate_class_progress, calculate_score, normalize_answers},
    state::AppState,
    store::{ATTEMPT_UNIQUE, StoreError},
    utils::{extract::ApiJson, jwt::Claims},
};

/// Returns the trimmed value, or a 400 with `message` when it is absent or blank.
fn required(value: Option<String>, message: &str) -> Result<String, AppError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::BadRequest(message.to_string()))
}

/// Creates a quiz.
///
/// * Teachers and admins only.
/// * Requires a title, a class and at least one well-formed question.
pub async fn create_quiz(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(payload): ApiJson<CreateQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    claims.require_staff("Only teachers can create quizzes")?;

    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let creator = claims.user_id()?;
    let quiz = state
        .store
        .insert_quiz(payload.into_new_quiz(creator))
        .await
        .map_err(|e| {
            tracing::error!("Failed to create quiz: {}", e);
            AppError::from(e)
        })?;

    tracing::info!(quiz_id = quiz.id, class = %quiz.class_name, "Quiz created");
    Ok((StatusCode::CREATED, Json(quiz)))
}

/// Lists quizzes, newest first, optionally filtered by class and subject.
pub async fn list_quizzes(
    State(state): State<AppState>,
    Query(filter): Query<QuizFilter>,
) -> Result<impl IntoResponse, AppError> {
    let quizzes = state.store.list_quizzes(&filter).await?;
    Ok(Json(quizzes))
}

/// Retrieves a single quiz by ID.
/// The response still carries each question's `correctIndex`.
pub async fn get_quiz(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = state
        .store
        .find_quiz(id)
        .await?
        .ok_or(AppError::NotFound("Quiz not found".to_string()))?;

    Ok(Json(quiz))
}

/// Deletes a quiz together with every attempt made against it.
///
/// Teachers may delete only their own quizzes; admins may delete any.
/// The response is sent only after both deletes have committed.
pub async fn delete_quiz(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    claims.require_staff("Only teachers can delete quizzes.")?;

    let quiz = state
        .store
        .find_quiz(id)
        .await?
        .ok_or(AppError::NotFound("Quiz not found.".to_string()))?;

    let requester = claims.user_id()?;
    if claims.role() != Some(Role::Admin) && quiz.created_by != requester {
        tracing::warn!(quiz_id = id, requester, "Refusing to delete another teacher's quiz");
        return Err(AppError::Forbidden(
            "Only the teacher who created this quiz can delete it.".to_string(),
        ));
    }

    let removed = state
        .store
        .delete_quiz_cascade(id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete quiz {} and its attempts: {}", id, e);
            AppError::from(e)
        })?
        .ok_or(AppError::NotFound("Quiz not found.".to_string()))?;

    tracing::info!(quiz_id = id, attempts_removed = removed, "Quiz deleted");
    Ok(Json(serde_json::json!({
        "message": "Quiz deleted successfully.",
        "attemptsRemoved": removed,
    })))
}

/// Records a student's single attempt at a quiz.
///
/// * Scores by position: `answers[i]` against question `i`.
/// * Any answer count is accepted; missing answers are wrong.
/// * A second submission for the same (quiz, email) is rejected by the
///   store's unique constraint and reported as `alreadySubmitted`.
pub async fn submit_attempt(
    State(state): State<AppState>,
    Path(quiz_id): Path<i64>,
    ApiJson(req): ApiJson<SubmitAttemptRequest>,
) -> Result<impl IntoResponse, AppError> {
    let answers = req
        .answers
        .map(normalize_answers)
        .ok_or(AppError::BadRequest("Answers array is required.".to_string()))?;
    let email = required(req.email, "Email is required.")?;

    let quiz = state
        .store
        .find_quiz(quiz_id)
        .await?
        .ok_or(AppError::NotFound("Quiz not found".to_string()))?;

    let total = quiz.questions.len() as i64;
    let score = calculate_score(&quiz.questions, &answers);

    let attempt = NewAttempt {
        quiz_id,
        name: req.name.map(|n| n.trim().to_string()).unwrap_or_default(),
        email,
        class_name: req.class_name.map(|c| c.trim().to_string()).unwrap_or_default(),
        score,
        total,
        answers,
    };

    let saved = match state.store.insert_attempt(attempt).await {
        Ok(saved) => saved,
        Err(e) if e.is_duplicate_of(ATTEMPT_UNIQUE) => {
            tracing::info!(quiz_id, "Rejected duplicate quiz submission");
            return Err(AppError::DuplicateSubmission);
        }
        Err(e) => {
            tracing::error!("Failed to record attempt for quiz {}: {}", quiz_id, e);
            return Err(AppError::from(e));
        }
    };

    Ok((
        StatusCode::CREATED,
        Json(SubmitAttemptResponse {
            message: "Submission recorded.".to_string(),
            score: saved.score,
            total: saved.total,
            already_submitted: false,
        }),
    ))
}

/// A student's attempt history.
pub async fn attempts_by_student(
    State(state): State<AppState>,
    Query(query): Query<StudentQuery>,
) -> Result<impl IntoResponse, AppError> {
    let email = required(query.email, "Email is required.")?;
    let attempts = state.store.attempts_by_email(&email).await?;
    Ok(Json(attempts))
}

/// All attempts of a class with quiz details, newest first.
/// Teachers and admins only.
pub async fn attempts_by_class(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ClassQuery>,
) -> Result<impl IntoResponse, AppError> {
    claims.require_staff("Only teachers can view class attempts.")?;
    let class_name = required(query.class_name, "className query is required.")?;

    let attempts = state.store.attempts_by_class(&class_name).await?;
    Ok(Json(attempts))
}

/// Per-student progress for a class.
///
/// Classes without quizzes yield an empty list. A failed read yields an
/// error, never a partial list.
pub async fn class_progress(
    State(state): State<AppState>,
    Query(query): Query<ClassQuery>,
) -> Result<impl IntoResponse, AppError> {
    let class_name = required(query.class_name, "className query is required.")?;

    let quiz_ids = state.store.quiz_ids_for_class(&class_name).await?;
    if quiz_ids.is_empty() {
        return Ok(Json(Vec::<ClassProgressRow>::new()));
    }

    let attempts = state
        .store
        .attempts_for_quizzes(&class_name, &quiz_ids)
        .await
        .map_err(|e: StoreError| {
            tracing::error!("Failed to compute class progress for {}: {}", class_name, e);
            AppError::from(e)
        })?;

    Ok(Json(aggregate_class_progress(&class_name, quiz_ids.len(), &attempts)))
}
