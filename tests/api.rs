use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use fasthack::{app::build_app, state::AppState};

// ============================================================================
// Helpers
// ============================================================================

fn app() -> Router {
    build_app(AppState::fake())
}

async fn call(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(t) = token {
        req = req.header(header::AUTHORIZATION, format!("Bearer {t}"));
    }
    let req = match body {
        Some(b) => req
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(b.to_string())),
        None => req.body(Body::empty()),
    }
    .unwrap();

    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn register(app: &Router, email: &str) -> Value {
    let (status, body) = call(
        app,
        Method::POST,
        "/api/v1/auth/register",
        None,
        Some(json!({"email": email, "password": "secret1"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body
}

// ============================================================================
// Catalog
// ============================================================================

#[tokio::test]
async fn catalog_is_served_in_full() {
    let app = app();
    let (status, meals) = call(&app, Method::GET, "/api/v1/meals", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(meals.as_array().unwrap().len(), 26);
    assert!(meals[0].get("restaurantId").is_some());

    let (status, restaurants) = call(&app, Method::GET, "/api/v1/restaurants", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(restaurants.as_array().unwrap().len(), 10);
}

#[tokio::test]
async fn health_answers() {
    let resp = app()
        .oneshot(Request::get("/api/v1/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

// ============================================================================
// Accounts
// ============================================================================

#[tokio::test]
async fn register_login_and_conflicts() {
    let app = app();
    let created = register(&app, "Ada@Example.com").await;
    assert_eq!(created["user"]["email"], "ada@example.com");
    assert!(created["access_token"].as_str().is_some());

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/v1/auth/register",
        None,
        Some(json!({"email": "ada@example.com", "password": "secret1"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/auth/login",
        None,
        Some(json!({"email": "ada@example.com", "password": "secret1"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["id"], created["user"]["id"]);

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/v1/auth/login",
        None,
        Some(json!({"email": "ada@example.com", "password": "wrong!"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn register_rejects_invalid_input() {
    let app = app();
    let (status, _) = call(
        &app,
        Method::POST,
        "/api/v1/auth/register",
        None,
        Some(json!({"email": "not-an-email", "password": "secret1"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/v1/auth/register",
        None,
        Some(json!({"email": "a@b.co", "password": "123"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn me_requires_a_token() {
    let (status, _) = call(&app(), Method::GET, "/api/v1/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call(&app(), Method::GET, "/api/v1/me", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn refresh_tokens_rotate() {
    let app = app();
    let created = register(&app, "a@b.co").await;
    let refresh = created["refresh_token"].clone();

    let (status, rotated) = call(
        &app,
        Method::POST,
        "/api/v1/auth/refresh",
        None,
        Some(json!({"refresh_token": refresh})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(rotated["refresh_token"], created["refresh_token"]);

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/v1/auth/refresh",
        None,
        Some(json!({"refresh_token": created["refresh_token"]})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Access tokens are not refresh tokens.
    let (status, _) = call(
        &app,
        Method::POST,
        "/api/v1/auth/refresh",
        None,
        Some(json!({"refresh_token": rotated["access_token"]})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_revokes_access_token() {
    let app = app();
    let created = register(&app, "a@b.co").await;
    let access = created["access_token"].as_str().unwrap().to_string();

    let (status, me) = call(&app, Method::GET, "/api/v1/me", Some(&access), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["email"], "a@b.co");

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/v1/auth/logout",
        Some(&access),
        Some(json!({"refresh_token": created["refresh_token"]})),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = call(&app, Method::GET, "/api/v1/me", Some(&access), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/v1/auth/refresh",
        None,
        Some(json!({"refresh_token": created["refresh_token"]})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// ============================================================================
// Profiles
// ============================================================================

#[tokio::test]
async fn new_accounts_start_with_setup_pending() {
    let app = app();
    let created = register(&app, "a@b.co").await;
    let access = created["access_token"].as_str().unwrap();

    let (status, profile) = call(&app, Method::GET, "/api/v1/profile", Some(access), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["has_completed_setup"], false);
    assert_eq!(profile["id"], created["user"]["id"]);
}

#[tokio::test]
async fn upsert_pins_identity_fields() {
    let app = app();
    let created = register(&app, "a@b.co").await;
    let access = created["access_token"].as_str().unwrap();

    let (status, saved) = call(
        &app,
        Method::PUT,
        "/api/v1/profile",
        Some(access),
        Some(json!({
            "id": "someone-else",
            "email": "evil@b.co",
            "full_name": "Ada",
            "dietary_preferences": ["Keto"],
            "has_completed_setup": true
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(saved["id"], created["user"]["id"]);
    assert_eq!(saved["email"], "a@b.co");

    let (_, profile) = call(&app, Method::GET, "/api/v1/profile", Some(access), None).await;
    assert_eq!(profile["full_name"], "Ada");
    assert_eq!(profile["has_completed_setup"], true);

    let (status, _) = call(
        &app,
        Method::POST,
        "/api/v1/profile",
        Some(access),
        Some(json!({"id": "x", "email": "a@b.co"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn google_sign_in_needs_configuration() {
    let (status, _) = call(
        &app(),
        Method::GET,
        "/api/v1/auth/oauth/google?redirect_to=fasthack://auth/callback",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}
