// src/otp.rs

use std::{
    collections::HashMap,
    sync::Mutex,
};

use argon2::password_hash::rand_core::{OsRng, RngCore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::store::StoreError;

/// What a one-time code unlocks. Codes for different purposes never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OtpPurpose {
    Signup,
    PasswordReset,
}

impl OtpPurpose {
    pub fn as_str(self) -> &'static str {
        match self {
            OtpPurpose::Signup => "signup",
            OtpPurpose::PasswordReset => "password_reset",
        }
    }
}

/// Outcome of checking a submitted code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpCheck {
    Valid,
    Missing,
    /// The code had expired; it has been removed.
    Expired,
    Mismatch,
}

/// Keyed store of pending codes with per-key expiry.
#[async_trait]
pub trait OtpStore: Send + Sync {
    /// Stores `code` for `(purpose, email)`, replacing any pending code.
    async fn issue(
        &self,
        purpose: OtpPurpose,
        email: &str,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Checks without consuming. Expired entries are removed.
    async fn check(
        &self,
        purpose: OtpPurpose,
        email: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<OtpCheck, StoreError>;

    async fn consume(&self, purpose: OtpPurpose, email: &str) -> Result<(), StoreError>;
}

/// Six decimal digits, never starting with zero.
pub fn generate_code() -> String {
    (100_000 + OsRng.next_u32() % 900_000).to_string()
}

struct PendingOtp {
    code: String,
    expires_at: DateTime<Utc>,
}

/// Process-local OTP store for single-instance deployments.
#[derive(Default)]
pub struct MemoryOtpStore {
    pending: Mutex<HashMap<(OtpPurpose, String), PendingOtp>>,
}

impl MemoryOtpStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<(OtpPurpose, String), PendingOtp>>, StoreError> {
        self.pending
            .lock()
            .map_err(|_| StoreError::Backend("otp store lock poisoned".to_string()))
    }
}

#[async_trait]
impl OtpStore for MemoryOtpStore {
    async fn issue(
        &self,
        purpose: OtpPurpose,
        email: &str,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut pending = self.lock()?;
        // Drop anything stale while we hold the lock.
        let now = Utc::now();
        pending.retain(|_, otp| otp.expires_at >= now);
        pending.insert(
            (purpose, email.to_string()),
            PendingOtp {
                code: code.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn check(
        &self,
        purpose: OtpPurpose,
        email: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<OtpCheck, StoreError> {
        let mut pending = self.lock()?;
        let key = (purpose, email.to_string());

        let Some(otp) = pending.get(&key) else {
            return Ok(OtpCheck::Missing);
        };

        if otp.expires_at < now {
            pending.remove(&key);
            return Ok(OtpCheck::Expired);
        }

        Ok(if otp.code == code { OtpCheck::Valid } else { OtpCheck::Mismatch })
    }

    async fn consume(&self, purpose: OtpPurpose, email: &str) -> Result<(), StoreError> {
        self.lock()?.remove(&(purpose, email.to_string()));
        Ok(())
    }
}
