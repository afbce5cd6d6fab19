// src/routes.rs

use axum::{
    Json, Router,
    http::{HeaderValue, Method},
    middleware,
    routing::{get, patch, post},
};
use serde_json::{Value, json};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{auth, parent, quiz},
    state::AppState,
    utils::jwt::auth_middleware,
};

const LOCAL_FRONTEND: &str = "http://localhost:5173";

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "message": "API is healthy" }))
}

fn cors_layer(state: &AppState) -> CorsLayer {
    let origins: Vec<HeaderValue> = std::iter::once(LOCAL_FRONTEND)
        .chain(state.config.frontend_url.as_deref())
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ])
        .allow_credentials(true)
}

/// Assembles the main application router.
///
/// * Merges all sub-routers (auth, quizzes, parents).
/// * Protects routes that need a caller identity with the JWT middleware.
/// * Applies global middleware (Trace, CORS).
pub fn create_router(state: AppState) -> Router {
    let require_auth = middleware::from_fn_with_state(state.clone(), auth_middleware);

    let auth_routes = Router::new()
        .route("/register/send-otp", post(auth::send_signup_otp))
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/forgot-password", post(auth::forgot_password))
        .route("/verify-otp", post(auth::verify_reset_otp))
        .route("/reset-password", post(auth::reset_password))
        // Protected auth routes
        .merge(
            Router::new()
                .route("/me", get(auth::me))
                .route("/class", patch(auth::update_class))
                .route("/referral-code", get(auth::referral_code))
                .layer(require_auth.clone()),
        );

    let quiz_routes = Router::new()
        .route("/", get(quiz::list_quizzes))
        .route("/class-progress", get(quiz::class_progress))
        .route("/attempts/by-student", get(quiz::attempts_by_student))
        .route("/{id}", get(quiz::get_quiz))
        .route("/{id}/submit", post(quiz::submit_attempt))
        // Protected quiz routes
        .merge(
            Router::new()
                .route("/", post(quiz::create_quiz))
                .route("/{id}", axum::routing::delete(quiz::delete_quiz))
                .route("/attempts/by-class", get(quiz::attempts_by_class))
                .layer(require_auth.clone()),
        );

    let parent_routes = Router::new()
        .route("/generate-code", post(parent::generate_code))
        .route("/overview", get(parent::overview))
        .layer(require_auth);

    let cors = cors_layer(&state);

    Router::new()
        .route("/api/health", get(health))
        .nest("/api/auth", auth_routes)
        .nest("/api/quizzes", quiz_routes)
        .nest("/api/parents", parent_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
