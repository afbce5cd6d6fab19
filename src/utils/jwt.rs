// src/utils/jwt.rs

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::{config::Config, error::AppError, models::user::Role};

/// Token payload: who the caller is and until when.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Claims {
    /// User id, decimal.
    pub sub: String,
    pub role: String,
    /// Unix seconds.
    pub exp: usize,
}

impl Claims {
    pub fn user_id(&self) -> Result<i64, AppError> {
        self.sub
            .parse::<i64>()
            .map_err(|_| AppError::AuthError("Invalid token subject".to_string()))
    }

    pub fn role(&self) -> Option<Role> {
        Role::parse(&self.role)
    }

    /// Fails with 403 unless the caller is a teacher or admin.
    pub fn require_staff(&self, message: &str) -> Result<(), AppError> {
        match self.role() {
            Some(role) if role.is_staff() => Ok(()),
            _ => {
                tracing::warn!(user = %self.sub, role = %self.role, "{}", message);
                Err(AppError::Forbidden(message.to_string()))
            }
        }
    }
}

/// Issues an HS256 token valid for `ttl_seconds`.
pub fn sign_jwt(user_id: i64, role: Role, secret: &str, ttl_seconds: u64) -> Result<String, AppError> {
    let issued_at = u64::try_from(Utc::now().timestamp())
        .map_err(|e| AppError::InternalServerError(format!("clock before epoch: {}", e)))?;

    let claims = Claims {
        sub: user_id.to_string(),
        role: role.as_str().to_string(),
        exp: (issued_at + ttl_seconds) as usize,
    };

    let key = EncodingKey::from_secret(secret.as_bytes());
    encode(&Header::default(), &claims, &key).map_err(|e| {
        tracing::error!("Failed to sign token for user {}: {}", user_id, e);
        AppError::InternalServerError(e.to_string())
    })
}

/// Decodes a token, checking signature and expiry.
pub fn verify_jwt(token: &str, secret: &str) -> Result<Claims, AppError> {
    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &Validation::default())
        .map(|data| data.claims)
        .map_err(|e| {
            tracing::debug!("Rejected token: {}", e);
            AppError::AuthError("Invalid token".to_string())
        })
}

/// Requires `Authorization: Bearer <token>` and hands the decoded `Claims`
/// to handlers through request extensions. Anything else is a 401.
pub async fn auth_middleware(
    State(config): State<Config>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let claims = verify_jwt(token.trim(), &config.jwt_secret).map_err(|_| StatusCode::UNAUTHORIZED)?;
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
