// tests/api_tests.rs

use std::sync::Arc;

use eshiksha_quiz::{
    config::{Config, StorageBackend},
    mailer::Outbox,
    routes,
    state::AppState,
};
use serde_json::{Value, json};

/// Helper function to spawn the app on a random port for testing.
/// Returns the base URL and the outbox that captures OTP mails.
async fn spawn_app() -> (String, Arc<Outbox>) {
    let config = Config {
        storage_backend: StorageBackend::Memory,
        database_url: None,
        jwt_secret: "test_secret_for_integration_tests".to_string(),
        jwt_expiration: 600, // 10 minutes for tests
        otp_ttl_seconds: 600,
        port: 0,
        frontend_url: None,
        rust_log: "error".to_string(),
        admin_email: None,
        admin_password: None,
    };

    let outbox = Arc::new(Outbox::new());
    let state = AppState::in_memory(config, outbox.clone());
    let app = routes::create_router(state);

    // Bind to port 0 to get a random available port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");

    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (address, outbox)
}

fn unique_email(prefix: &str) -> String {
    format!("{}_{}@example.com", prefix, &uuid::Uuid::new_v4().to_string()[..8])
}

fn otp_in(outbox: &Outbox, email: &str) -> String {
    let mail = outbox.last_to(email).expect("No mail sent");
    mail.body
        .split(|c: char| !c.is_ascii_digit())
        .find(|part| part.len() == 6)
        .expect("No OTP in mail body")
        .to_string()
}

async fn send_otp(client: &reqwest::Client, address: &str, email: &str) -> reqwest::Response {
    client
        .post(format!("{}/api/auth/register/send-otp", address))
        .json(&json!({ "email": email }))
        .send()
        .await
        .expect("Failed to execute request.")
}

async fn register(client: &reqwest::Client, address: &str, outbox: &Outbox, body: Value) -> reqwest::Response {
    let email = body["email"].as_str().unwrap().to_string();
    send_otp(client, address, &email).await;
    let mut body = body;
    // Mail goes to the normalized address.
    body["otp"] = json!(otp_in(outbox, &email.trim().to_lowercase()));
    client
        .post(format!("{}/api/auth/register", address))
        .json(&body)
        .send()
        .await
        .expect("Failed to execute request.")
}

async fn login(client: &reqwest::Client, address: &str, email: &str, password: &str) -> reqwest::Response {
    client
        .post(format!("{}/api/auth/login", address))
        .json(&json!({ "email": email, "password": password }))
        .send()
        .await
        .expect("Failed to execute request.")
}

async fn token_for(client: &reqwest::Client, address: &str, email: &str) -> String {
    let body: Value = login(client, address, email, "password123").await.json().await.unwrap();
    body["token"].as_str().expect("Token not found").to_string()
}

#[tokio::test]
async fn health_check_works() {
    let (address, _) = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/api/health", address))
        .send()
        .await
        .expect("Failed to execute request.");
    assert!(response.status().is_success());

    let missing = client
        .get(format!("{}/api/non-existent-route", address))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(missing.status().as_u16(), 404);
}

#[tokio::test]
async fn student_registers_with_otp_and_logs_in() {
    let (address, outbox) = spawn_app().await;
    let client = reqwest::Client::new();
    let email = unique_email("student");

    let resp = register(
        &client,
        &address,
        &outbox,
        json!({
            "name": "Asha",
            "email": email.to_uppercase(),
            "password": "password123",
            "role": "student",
            "referralCode": "1084",
        }),
    )
    .await;
    assert_eq!(resp.status().as_u16(), 201);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["user"]["email"], email.as_str());
    assert_eq!(body["user"]["className"], "10");
    assert!(body["user"].get("passwordHash").is_none());

    let resp = login(&client, &address, &email, "password123").await;
    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["type"], "Bearer");
    let token = body["token"].as_str().unwrap();

    let me: Value = client
        .get(format!("{}/api/auth/me", address))
        .bearer_auth(token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(me["name"], "Asha");
    assert_eq!(me["role"], "student");
}

#[tokio::test]
async fn registration_rejects_bad_otp_and_referral() {
    let (address, outbox) = spawn_app().await;
    let client = reqwest::Client::new();
    let email = unique_email("bad");

    send_otp(&client, &address, &email).await;
    let resp = client
        .post(format!("{}/api/auth/register", address))
        .json(&json!({
            "name": "Wrong",
            "email": email,
            "password": "password123",
            "role": "teacher",
            "otp": "not-it",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);

    let resp = register(
        &client,
        &address,
        &outbox,
        json!({
            "name": "No class",
            "email": unique_email("nocls"),
            "password": "password123",
            "role": "student",
            "referralCode": "0000",
        }),
    )
    .await;
    assert_eq!(resp.status().as_u16(), 400);

    let resp = register(
        &client,
        &address,
        &outbox,
        json!({
            "name": "Root",
            "email": unique_email("root"),
            "password": "password123",
            "role": "admin",
        }),
    )
    .await;
    assert_eq!(resp.status().as_u16(), 400);
}

#[tokio::test]
async fn existing_email_cannot_request_signup_otp() {
    let (address, outbox) = spawn_app().await;
    let client = reqwest::Client::new();
    let email = unique_email("dup");

    let resp = register(
        &client,
        &address,
        &outbox,
        json!({ "name": "T", "email": email, "password": "password123", "role": "teacher" }),
    )
    .await;
    assert_eq!(resp.status().as_u16(), 201);

    let resp = send_otp(&client, &address, &email).await;
    assert_eq!(resp.status().as_u16(), 409);
}

#[tokio::test]
async fn login_with_wrong_password_is_unauthorized() {
    let (address, outbox) = spawn_app().await;
    let client = reqwest::Client::new();
    let email = unique_email("pw");
    register(
        &client,
        &address,
        &outbox,
        json!({ "name": "T", "email": email, "password": "password123", "role": "teacher" }),
    )
    .await;

    let resp = login(&client, &address, &email, "wrong-password").await;
    assert_eq!(resp.status().as_u16(), 401);

    let resp = client
        .get(format!("{}/api/auth/me", address))
        .bearer_auth("not-a-jwt")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 401);
}

#[tokio::test]
async fn password_reset_flow() {
    let (address, outbox) = spawn_app().await;
    let client = reqwest::Client::new();
    let email = unique_email("reset");
    register(
        &client,
        &address,
        &outbox,
        json!({ "name": "T", "email": email, "password": "password123", "role": "teacher" }),
    )
    .await;

    let resp = client
        .post(format!("{}/api/auth/forgot-password", address))
        .json(&json!({ "email": unique_email("ghost") }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);

    let resp = client
        .post(format!("{}/api/auth/forgot-password", address))
        .json(&json!({ "email": email }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let otp = otp_in(&outbox, &email);

    let resp = client
        .post(format!("{}/api/auth/verify-otp", address))
        .json(&json!({ "email": email, "otp": otp }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    let same = client
        .post(format!("{}/api/auth/reset-password", address))
        .json(&json!({ "email": email, "otp": otp, "newPassword": "password123" }))
        .send()
        .await
        .unwrap();
    assert_eq!(same.status().as_u16(), 400);

    let resp = client
        .post(format!("{}/api/auth/reset-password", address))
        .json(&json!({ "email": email, "otp": otp, "newPassword": "brandnew456" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    assert_eq!(login(&client, &address, &email, "password123").await.status().as_u16(), 401);
    assert_eq!(login(&client, &address, &email, "brandnew456").await.status().as_u16(), 200);

    // The OTP is single use.
    let replay = client
        .post(format!("{}/api/auth/reset-password", address))
        .json(&json!({ "email": email, "otp": otp, "newPassword": "another789" }))
        .send()
        .await
        .unwrap();
    assert_eq!(replay.status().as_u16(), 400);
}

#[tokio::test]
async fn teachers_can_read_referral_codes() {
    let (address, outbox) = spawn_app().await;
    let client = reqwest::Client::new();
    let email = unique_email("ref");
    register(
        &client,
        &address,
        &outbox,
        json!({ "name": "T", "email": email, "password": "password123", "role": "teacher" }),
    )
    .await;
    let token = token_for(&client, &address, &email).await;

    let body: Value = client
        .get(format!("{}/api/auth/referral-code?className=10", address))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["referralCode"], "1084");

    let resp = client
        .get(format!("{}/api/auth/referral-code?className=10", address))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 401);
}

#[tokio::test]
async fn parent_links_to_student_and_sees_attempts() {
    let (address, outbox) = spawn_app().await;
    let client = reqwest::Client::new();

    // Teacher publishes a quiz
    let teacher_email = unique_email("teacher");
    register(
        &client,
        &address,
        &outbox,
        json!({ "name": "T", "email": teacher_email, "password": "password123", "role": "teacher" }),
    )
    .await;
    let teacher = token_for(&client, &address, &teacher_email).await;
    let quiz: Value = client
        .post(format!("{}/api/quizzes", address))
        .bearer_auth(&teacher)
        .json(&json!({
            "title": "Fractions",
            "subject": "Maths",
            "className": "10",
            "questions": [{"questionText": "1/2 + 1/2?", "options": ["1", "2"], "correctIndex": 0}],
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    // Student takes it and creates a parent code
    let student_email = unique_email("kid");
    register(
        &client,
        &address,
        &outbox,
        json!({
            "name": "Kid",
            "email": student_email,
            "password": "password123",
            "role": "student",
            "referralCode": "1084",
        }),
    )
    .await;
    let student = token_for(&client, &address, &student_email).await;
    client
        .post(format!("{}/api/quizzes/{}/submit", address, quiz["id"]))
        .json(&json!({ "answers": [0], "name": "Kid", "email": student_email, "className": "10" }))
        .send()
        .await
        .unwrap();

    let first: Value = client
        .post(format!("{}/api/parents/generate-code", address))
        .bearer_auth(&student)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let code = first["parentAccessCode"].as_str().unwrap().to_string();
    assert_eq!(code.len(), 8);
    assert_eq!(first["generatedBy"], "student");

    // Asking again, even via the teacher, returns the same code
    let again: Value = client
        .post(format!("{}/api/parents/generate-code", address))
        .bearer_auth(&teacher)
        .json(&json!({ "studentEmail": student_email }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(again["parentAccessCode"], code.as_str());

    // Parent signs up with it
    let parent_email = unique_email("parent");
    let resp = register(
        &client,
        &address,
        &outbox,
        json!({
            "name": "Parent",
            "email": parent_email,
            "password": "password123",
            "role": "parent",
            "studentCode": code,
        }),
    )
    .await;
    assert_eq!(resp.status().as_u16(), 201);
    let parent = token_for(&client, &address, &parent_email).await;

    let overview: Value = client
        .get(format!("{}/api/parents/overview", address))
        .bearer_auth(&parent)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(overview["student"]["email"], student_email.as_str());
    let attempts = overview["attempts"].as_array().unwrap();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0]["score"], 1);
    assert_eq!(attempts[0]["quiz"]["title"], "Fractions");

    // Only parents get an overview
    let resp = client
        .get(format!("{}/api/parents/overview", address))
        .bearer_auth(&student)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);

    let resp = client
        .post(format!("{}/api/parents/generate-code", address))
        .bearer_auth(&parent)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);
}

#[tokio::test]
async fn students_can_move_to_another_class() {
    let (address, outbox) = spawn_app().await;
    let client = reqwest::Client::new();

    let student_email = unique_email("mover");
    register(
        &client,
        &address,
        &outbox,
        json!({
            "name": "Mover",
            "email": student_email,
            "password": "password123",
            "role": "student",
            "referralCode": "1084",
        }),
    )
    .await;
    let student = token_for(&client, &address, &student_email).await;

    let resp = client
        .patch(format!("{}/api/auth/class", address))
        .bearer_auth(&student)
        .json(&json!({ "className": " 9 " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["className"], "9");

    let me: Value = client
        .get(format!("{}/api/auth/me", address))
        .bearer_auth(&student)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(me["className"], "9");

    let missing = client
        .patch(format!("{}/api/auth/class", address))
        .bearer_auth(&student)
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status().as_u16(), 400);

    let teacher_email = unique_email("staff");
    register(
        &client,
        &address,
        &outbox,
        json!({ "name": "T", "email": teacher_email, "password": "password123", "role": "teacher" }),
    )
    .await;
    let teacher = token_for(&client, &address, &teacher_email).await;
    let resp = client
        .patch(format!("{}/api/auth/class", address))
        .bearer_auth(&teacher)
        .json(&json!({ "className": "9" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);

    let anonymous = client
        .patch(format!("{}/api/auth/class", address))
        .json(&json!({ "className": "9" }))
        .send()
        .await
        .unwrap();
    assert_eq!(anonymous.status().as_u16(), 401);
}
