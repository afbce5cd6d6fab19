// src/config.rs

use std::env;
use dotenvy::dotenv;

/// Seconds a signed token stays valid unless `JWT_EXPIRATION` says otherwise (7 days).
pub const DEFAULT_JWT_EXPIRATION: u64 = 7 * 24 * 60 * 60;

/// Seconds a signup or password-reset OTP stays valid.
pub const DEFAULT_OTP_TTL_SECONDS: i64 = 10 * 60;

/// Where quizzes, attempts, users and pending OTPs are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    /// Single-process store, for local runs and tests.
    Memory,
}

impl StorageBackend {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Some(Self::Postgres),
            "memory" | "mem" => Some(Self::Memory),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub storage_backend: StorageBackend,
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub jwt_expiration: u64,
    pub otp_ttl_seconds: i64,
    pub port: u16,
    pub frontend_url: Option<String>,
    pub rust_log: String,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let storage_backend = env::var("STORAGE_BACKEND")
            .ok()
            .map(|v| StorageBackend::parse(&v).expect("STORAGE_BACKEND must be 'postgres' or 'memory'"))
            .unwrap_or(StorageBackend::Postgres);

        let database_url = env::var("DATABASE_URL").ok();
        if storage_backend == StorageBackend::Postgres && database_url.is_none() {
            panic!("DATABASE_URL must be set");
        }

        let jwt_secret = env::var("JWT_SECRET")
            .expect("JWT_SECRET must be set");

        let jwt_expiration = env::var("JWT_EXPIRATION")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_JWT_EXPIRATION);

        let otp_ttl_seconds = env::var("OTP_TTL_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_OTP_TTL_SECONDS);

        let port = env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5000);

        let rust_log = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string());

        Self {
            storage_backend,
            database_url,
            jwt_secret,
            jwt_expiration,
            otp_ttl_seconds,
            port,
            frontend_url: env::var("FRONTEND_URL").ok().filter(|v| !v.trim().is_empty()),
            rust_log,
            admin_email: env::var("ADMIN_EMAIL").ok(),
            admin_password: env::var("ADMIN_PASSWORD").ok(),
        }
    }
}
