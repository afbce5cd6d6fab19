// src/state.rs

use std::sync::Arc;

use axum::extract::FromRef;

use crate::{
    config::Config,
    mailer::Mailer,
    otp::{MemoryOtpStore, OtpStore},
    store::{MemoryStore, PgStore, Store},
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub otps: Arc<dyn OtpStore>,
    pub mailer: Arc<dyn Mailer>,
    pub config: Config,
}

impl AppState {
    /// Quizzes, attempts, users and OTPs all in Postgres.
    pub fn postgres(store: PgStore, config: Config, mailer: Arc<dyn Mailer>) -> Self {
        let store = Arc::new(store);
        Self {
            store: store.clone(),
            otps: store,
            mailer,
            config,
        }
    }

    /// Everything in process memory. Suitable for a single instance only.
    pub fn in_memory(config: Config, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            otps: Arc::new(MemoryOtpStore::new()),
            mailer,
            config,
        }
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
