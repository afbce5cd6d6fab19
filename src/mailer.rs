// src/mailer.rs

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::AppError;

/// Outgoing mail. Delivery itself is out of scope for this service.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), AppError>;
}

/// Writes messages to the log instead of delivering them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), AppError> {
        tracing::info!(to, subject, "Outgoing mail queued");
        tracing::debug!(to, body, "Outgoing mail body");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Keeps every message in memory so callers can read them back.
#[derive(Debug, Default)]
pub struct Outbox {
    sent: Mutex<Vec<SentMail>>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent message sent to `to`.
    pub fn last_to(&self, to: &str) -> Option<SentMail> {
        self.sent
            .lock()
            .ok()
            .and_then(|sent| sent.iter().rev().find(|m| m.to == to).cloned())
    }
}

#[async_trait]
impl Mailer for Outbox {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), AppError> {
        self.sent
            .lock()
            .map_err(|_| AppError::InternalServerError("outbox lock poisoned".to_string()))?
            .push(SentMail {
                to: to.to_string(),
                subject: subject.to_string(),
                body: body.to_string(),
            });
        Ok(())
    }
}

/// Body of the OTP mails for signup and password reset.
pub fn otp_body(code: &str, ttl_minutes: i64) -> String {
    format!("Your OTP is {}. Valid for {} minutes.", code, ttl_minutes)
}
