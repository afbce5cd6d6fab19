// src/handlers/parent.rs

use argon2::password_hash::rand_core::{OsRng, RngCore};
use axum::{Extension, Json, extract::State, response::IntoResponse};
use serde::Deserialize;
use serde_json::json;

use crate::{
    error::AppError,
    models::user::{Role, User, normalize_email},
    state::AppState,
    store::PARENT_CODE_UNIQUE,
    utils::{extract::ApiJson, jwt::Claims},
};

/// No 0/O or 1/I, so codes survive being read aloud.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const CODE_LENGTH: usize = 8;
const MAX_CODE_ATTEMPTS: usize = 5;

fn generate_parent_code() -> String {
    (0..CODE_LENGTH)
        .map(|_| CODE_ALPHABET[OsRng.next_u32() as usize % CODE_ALPHABET.len()] as char)
        .collect()
}

/// DTO for a teacher generating a code on a student's behalf.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateCodeRequest {
    pub student_email: Option<String>,
    pub student_id: Option<i64>,
}

/// Gives the student a parent access code if they don't have one yet.
/// The unique index decides collisions; a colliding code is regenerated.
/// When a concurrent request sets a code first, that code is returned.
async fn ensure_parent_code(state: &AppState, mut student: User) -> Result<User, AppError> {
    if student.parent_access_code.is_some() {
        return Ok(student);
    }

    for _ in 0..MAX_CODE_ATTEMPTS {
        let code = generate_parent_code();
        match state.store.set_parent_access_code(student.id, &code).await {
            Ok(true) => {
                student.parent_access_code = Some(code);
                return Ok(student);
            }
            Ok(false) => {
                return state
                    .store
                    .find_user_by_id(student.id)
                    .await?
                    .filter(|u| u.parent_access_code.is_some())
                    .ok_or(AppError::NotFound("Student not found.".to_string()));
            }
            Err(e) if e.is_duplicate_of(PARENT_CODE_UNIQUE) => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Err(AppError::InternalServerError(
        "Could not allocate a unique parent access code".to_string(),
    ))
}

/// Generates (once) the code a parent uses to link to a student.
///
/// * Teachers name the student by `studentId` or `studentEmail`.
/// * Students get their own code.
pub async fn generate_code(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    body: Option<ApiJson<GenerateCodeRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let (student, generated_by) = match claims.role() {
        Some(Role::Teacher) => {
            let req = body.map(|ApiJson(b)| b).unwrap_or_default();
            let found = if let Some(id) = req.student_id {
                state.store.find_user_by_id(id).await?
            } else if let Some(email) = req.student_email.filter(|e| !e.trim().is_empty()) {
                state.store.find_user_by_email(&normalize_email(&email)).await?
            } else {
                return Err(AppError::BadRequest(
                    "studentEmail or studentId is required.".to_string(),
                ));
            };
            let student = found
                .filter(|u| u.role() == Some(Role::Student))
                .ok_or(AppError::NotFound("Student not found.".to_string()))?;
            (student, "teacher")
        }
        Some(Role::Student) => {
            let student = state
                .store
                .find_user_by_id(claims.user_id()?)
                .await?
                .filter(|u| u.role() == Some(Role::Student))
                .ok_or(AppError::NotFound("Student not found.".to_string()))?;
            (student, "student")
        }
        _ => {
            return Err(AppError::Forbidden(
                "Only teachers or students can generate parent codes.".to_string(),
            ));
        }
    };

    let student = ensure_parent_code(&state, student).await?;

    Ok(Json(json!({
        "studentId": student.id,
        "name": student.name,
        "className": student.class_name,
        "parentAccessCode": student.parent_access_code,
        "generatedBy": generated_by,
    })))
}

/// A parent's view of their linked student and every attempt they made.
pub async fn overview(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    if claims.role() != Some(Role::Parent) {
        return Err(AppError::Forbidden("Only parents can access this.".to_string()));
    }

    let parent = state
        .store
        .find_user_by_id(claims.user_id()?)
        .await?
        .ok_or(AppError::NotFound("User not found".to_string()))?;

    let student_id = parent
        .parent_of
        .ok_or(AppError::BadRequest("No linked student found for this parent.".to_string()))?;
    let student = state
        .store
        .find_user_by_id(student_id)
        .await?
        .ok_or(AppError::BadRequest("No linked student found for this parent.".to_string()))?;

    let attempts = state.store.attempts_with_quiz_by_email(&student.email).await?;

    Ok(Json(json!({
        "student": {
            "id": student.id,
            "name": student.name,
            "email": student.email,
            "className": student.class_name,
        },
        "attempts": attempts,
    })))
}
