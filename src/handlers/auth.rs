// src/handlers/auth.rs

use axum::{
    Extension, Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{Duration, Utc};
use serde_json::json;
use validator::Validate;

use crate::{
    error::AppError,
    mailer::otp_body,
    models::{
        attempt::ClassQuery,
        user::{
            ForgotPasswordRequest, LoginRequest, NewUser, RegisterRequest, ResetPasswordRequest,
            Role, SendOtpRequest, UpdateClassRequest, VerifyOtpRequest, normalize_email,
        },
    },
    otp::{OtpCheck, OtpPurpose, generate_code},
    state::AppState,
    store::USER_EMAIL_UNIQUE,
    utils::{
        extract::ApiJson,
        hash::{hash_password, verify_password},
        jwt::{Claims, sign_jwt},
    },
};

/// Fixed signup codes: a student registering with one of these joins that class.
pub const CLASS_REFERRAL_CODES: [(&str, &str); 10] = [
    ("1", "0145"),
    ("2", "2381"),
    ("3", "3674"),
    ("4", "4920"),
    ("5", "5063"),
    ("6", "6198"),
    ("7", "7432"),
    ("8", "8591"),
    ("9", "9736"),
    ("10", "1084"),
];

fn class_for_referral_code(code: &str) -> Option<&'static str> {
    CLASS_REFERRAL_CODES
        .iter()
        .find(|(_, c)| *c == code.trim())
        .map(|(class, _)| *class)
}

fn referral_code_for_class(class_name: &str) -> Option<&'static str> {
    CLASS_REFERRAL_CODES
        .iter()
        .find(|(class, _)| *class == class_name.trim())
        .map(|(_, code)| *code)
}

/// Generates a code, stores it for `(purpose, email)` and mails it.
async fn issue_otp(
    state: &AppState,
    purpose: OtpPurpose,
    email: &str,
    subject: &str,
) -> Result<(), AppError> {
    let ttl = state.config.otp_ttl_seconds;
    let code = generate_code();
    state
        .otps
        .issue(purpose, email, &code, Utc::now() + Duration::seconds(ttl))
        .await?;
    state
        .mailer
        .send(email, subject, &otp_body(&code, ttl / 60))
        .await?;
    tracing::info!(email, purpose = purpose.as_str(), "OTP issued");
    Ok(())
}

/// Sends a signup OTP to an email address that has no account yet.
pub async fn send_signup_otp(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<SendOtpRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let email = normalize_email(&payload.email);
    if state.store.find_user_by_email(&email).await?.is_some() {
        return Err(AppError::Conflict("Email already registered".to_string()));
    }

    issue_otp(&state, OtpPurpose::Signup, &email, "Account Activation OTP").await?;

    Ok(Json(json!({ "message": "OTP sent successfully" })))
}

/// Registers a new user.
///
/// * Requires a valid signup OTP for the email.
/// * Students join the class their referral code belongs to.
/// * Parents are linked to the student owning the access code.
/// * Hashes the password using Argon2 before storing it.
pub async fn register(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let role = match Role::parse(&payload.role) {
        Some(role @ (Role::Student | Role::Teacher | Role::Parent)) => role,
        _ => return Err(AppError::BadRequest("Invalid role".to_string())),
    };

    let email = normalize_email(&payload.email);

    match state
        .otps
        .check(OtpPurpose::Signup, &email, payload.otp.trim(), Utc::now())
        .await?
    {
        OtpCheck::Valid => {}
        OtpCheck::Missing => {
            return Err(AppError::BadRequest(
                "No OTP request found or OTP expired. Please request a new code.".to_string(),
            ));
        }
        OtpCheck::Expired => {
            return Err(AppError::BadRequest(
                "OTP expired. Please request a new code.".to_string(),
            ));
        }
        OtpCheck::Mismatch => return Err(AppError::BadRequest("Invalid OTP.".to_string())),
    }

    let mut class_name = None;
    let mut parent_of = None;

    match role {
        Role::Student => {
            let code = payload
                .referral_code
                .as_deref()
                .filter(|c| !c.trim().is_empty())
                .ok_or(AppError::BadRequest("Referral code is required.".to_string()))?;
            let class = class_for_referral_code(code)
                .ok_or(AppError::BadRequest("Invalid referral code.".to_string()))?;
            class_name = Some(class.to_string());
        }
        Role::Parent => {
            let code = payload
                .student_code
                .as_deref()
                .filter(|c| !c.trim().is_empty())
                .ok_or(AppError::BadRequest("Student access code required.".to_string()))?;
            let student = state
                .store
                .find_student_by_access_code(code.trim())
                .await?
                .ok_or(AppError::BadRequest("Invalid student access code.".to_string()))?;
            parent_of = Some(student.id);
        }
        _ => {}
    }

    let password_hash = hash_password(&payload.password)?;

    let user = state
        .store
        .insert_user(NewUser {
            name: payload.name.trim().to_string(),
            email: email.clone(),
            password_hash,
            role,
            class_name,
            parent_phone: payload
                .parent_phone
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty()),
            parent_of,
        })
        .await
        .map_err(|e| {
            if e.is_duplicate_of(USER_EMAIL_UNIQUE) {
                AppError::Conflict("Email already registered".to_string())
            } else {
                tracing::error!("Failed to register user: {}", e);
                AppError::from(e)
            }
        })?;

    state.otps.consume(OtpPurpose::Signup, &email).await?;
    tracing::info!(user_id = user.id, role = role.as_str(), "User registered");

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "User registered successfully", "user": user })),
    ))
}

/// Authenticates a user and returns a JWT token.
pub async fn login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let email = normalize_email(&payload.email);
    let user = state
        .store
        .find_user_by_email(&email)
        .await?
        .ok_or(AppError::AuthError("Invalid credentials".to_string()))?;

    if !verify_password(&payload.password, &user.password_hash)? {
        return Err(AppError::AuthError("Invalid credentials".to_string()));
    }

    let role = user.role().ok_or_else(|| {
        AppError::InternalServerError(format!("User {} has unknown role '{}'", user.id, user.role))
    })?;

    let token = sign_jwt(
        user.id,
        role,
        &state.config.jwt_secret,
        state.config.jwt_expiration,
    )?;

    Ok(Json(json!({
        "token": token,
        "type": "Bearer",
        "user": user
    })))
}

/// The caller's own profile.
pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .store
        .find_user_by_id(claims.user_id()?)
        .await?
        .ok_or(AppError::NotFound("User not found".to_string()))?;

    Ok(Json(user))
}

/// Moves the calling student to another class.
pub async fn update_class(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(payload): ApiJson<UpdateClassRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let class_name = payload
        .class_name
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .ok_or(AppError::BadRequest("className is required".to_string()))?;

    if claims.role() != Some(Role::Student) {
        tracing::warn!(user = %claims.sub, role = %claims.role, "Class change refused");
        return Err(AppError::Forbidden("Only students can change class".to_string()));
    }

    let user = state
        .store
        .update_class_name(claims.user_id()?, &class_name)
        .await?
        .ok_or(AppError::NotFound("User not found".to_string()))?;

    tracing::info!(user_id = user.id, class = %class_name, "Student changed class");
    Ok(Json(user))
}

/// The signup referral code of a class. Teachers only.
pub async fn referral_code(
    Extension(claims): Extension<Claims>,
    Query(query): Query<ClassQuery>,
) -> Result<impl IntoResponse, AppError> {
    claims.require_staff("Only teachers can view codes.")?;

    let class_name = query
        .class_name
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .ok_or(AppError::BadRequest("className is required.".to_string()))?;
    let code = referral_code_for_class(&class_name)
        .ok_or(AppError::BadRequest("No code found.".to_string()))?;

    Ok(Json(json!({ "className": class_name, "referralCode": code })))
}

/// Starts a password reset by mailing a reset OTP.
pub async fn forgot_password(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<ForgotPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    let email = normalize_email(&payload.email);
    if email.is_empty() {
        return Err(AppError::BadRequest("Email is required".to_string()));
    }

    state
        .store
        .find_user_by_email(&email)
        .await?
        .ok_or(AppError::NotFound("User not found".to_string()))?;

    issue_otp(&state, OtpPurpose::PasswordReset, &email, "Password Reset OTP").await?;

    Ok(Json(json!({ "message": "OTP sent successfully" })))
}

/// Checks a reset OTP without using it up.
pub async fn verify_reset_otp(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<VerifyOtpRequest>,
) -> Result<impl IntoResponse, AppError> {
    let email = normalize_email(&payload.email);
    let check = state
        .otps
        .check(OtpPurpose::PasswordReset, &email, payload.otp.trim(), Utc::now())
        .await?;

    if check != OtpCheck::Valid {
        return Err(AppError::BadRequest("Invalid or expired OTP".to_string()));
    }

    Ok(Json(json!({ "message": "OTP verified" })))
}

/// Sets a new password once the reset OTP checks out.
pub async fn reset_password(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<ResetPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let email = normalize_email(&payload.email);
    let check = state
        .otps
        .check(OtpPurpose::PasswordReset, &email, payload.otp.trim(), Utc::now())
        .await?;
    if check != OtpCheck::Valid {
        return Err(AppError::BadRequest("Invalid session".to_string()));
    }

    let user = state
        .store
        .find_user_by_email(&email)
        .await?
        .ok_or(AppError::BadRequest("Invalid session".to_string()))?;

    if verify_password(&payload.new_password, &user.password_hash)? {
        return Err(AppError::BadRequest(
            "New password cannot be the same as the old one.".to_string(),
        ));
    }

    let password_hash = hash_password(&payload.new_password)?;
    state.store.update_password(user.id, &password_hash).await?;
    state.otps.consume(OtpPurpose::PasswordReset, &email).await?;
    tracing::info!(user_id = user.id, "Password reset");

    Ok(Json(json!({ "message": "Password reset successful" })))
}
