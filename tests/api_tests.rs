use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use tower::ServiceExt;
use vestra::config::Config;

/// In-memory app with fast hashing. A single DB connection keeps the
/// in-memory database shared across the pool.
async fn spawn_app() -> Router {
    let mut config = Config::default();
    config.general.database_path = "sqlite::memory:".to_string();
    config.general.max_db_connections = 1;
    config.general.min_db_connections = 1;
    config.security.pbkdf2_iterations = 1_000;

    let state = vestra::api::create_app_state_from_config(config, None)
        .await
        .expect("Failed to create app state");
    vestra::api::router(state).await
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn register(app: &Router, username: &str, email: &str, password: &str) -> StatusCode {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/register",
            serde_json::json!({
                "username": username,
                "email": email,
                "password": password,
            }),
        ))
        .await
        .unwrap();

    response.status()
}

async fn login(app: &Router, identifier: &str, password: &str) -> (StatusCode, Option<String>) {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/login",
            serde_json::json!({
                "identifier": identifier,
                "password": password,
            }),
        ))
        .await
        .unwrap();

    let status = response.status();
    if status != StatusCode::OK {
        return (status, None);
    }

    let body = json_body(response).await;
    let token = body["data"]["session_token"].as_str().map(str::to_string);
    (status, token)
}

#[tokio::test]
async fn test_protected_routes_require_auth() {
    let app = spawn_app().await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/system/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/system/status")
                .header("Authorization", "Bearer not-a-real-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_register_login_me_flow() {
    let app = spawn_app().await;

    let status = register(&app, "alice", "a@x.com", "Str0ng!Pass").await;
    assert_eq!(status, StatusCode::OK);

    let (status, token) = login(&app, "alice", "Str0ng!Pass").await;
    assert_eq!(status, StatusCode::OK);
    let token = token.expect("login should return a session token");

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/auth/me")
                .header("Authorization", format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["username"], "alice");
    // The first account ever created is the administrator
    assert_eq!(body["data"]["is_admin"], true);
}

#[tokio::test]
async fn test_register_rejects_bad_input() {
    let app = spawn_app().await;

    // Username too short
    let status = register(&app, "ab", "a@x.com", "Str0ng!Pass").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // No uppercase
    let status = register(&app, "alice", "a@x.com", "alllowercase1!").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Denylisted word
    let status = register(&app, "alice", "a@x.com", "Password1!").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_register_duplicate_email_conflicts() {
    let app = spawn_app().await;

    assert_eq!(
        register(&app, "alice", "a@x.com", "Str0ng!Pass").await,
        StatusCode::OK
    );
    assert_eq!(
        register(&app, "bob", "a@x.com", "Str0ng!Pass").await,
        StatusCode::CONFLICT
    );
}

#[tokio::test]
async fn test_login_wrong_password_unauthorized() {
    let app = spawn_app().await;

    register(&app, "alice", "a@x.com", "Str0ng!Pass").await;

    let (status, _) = login(&app, "alice", "wrong-password").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Unknown identifier looks exactly the same
    let (status, _) = login(&app, "nobody", "wrong-password").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_lockout_over_http() {
    let app = spawn_app().await;

    register(&app, "alice", "a@x.com", "Str0ng!Pass").await;

    for _ in 0..4 {
        let (status, _) = login(&app, "alice", "wrong-password").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    // Fifth failure crosses the threshold
    let (status, _) = login(&app, "alice", "wrong-password").await;
    assert_eq!(status, StatusCode::LOCKED);

    // Correct password is rejected while locked
    let (status, _) = login(&app, "alice", "Str0ng!Pass").await;
    assert_eq!(status, StatusCode::LOCKED);
}

#[tokio::test]
async fn test_logout_idempotent() {
    let app = spawn_app().await;

    register(&app, "alice", "a@x.com", "Str0ng!Pass").await;
    let (_, token) = login(&app, "alice", "Str0ng!Pass").await;
    let token = token.unwrap();

    let logout_request = || {
        Request::builder()
            .method("POST")
            .uri("/api/auth/logout")
            .header("Authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap()
    };

    let response = app.clone().oneshot(logout_request()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["logged_out"], true);

    let response = app.clone().oneshot(logout_request()).await.unwrap();
    let body = json_body(response).await;
    assert_eq!(body["data"]["logged_out"], false);

    // The session no longer authenticates
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/auth/me")
                .header("Authorization", format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_audit_endpoint_is_admin_only() {
    let app = spawn_app().await;

    // First user is admin, second is not
    register(&app, "admin1", "admin@x.com", "Str0ng!Pass").await;
    register(&app, "bob", "b@x.com", "Str0ng!Pass").await;

    let (_, admin_token) = login(&app, "admin1", "Str0ng!Pass").await;
    let (_, bob_token) = login(&app, "bob", "Str0ng!Pass").await;

    let audit_request = |token: &str| {
        Request::builder()
            .uri("/api/auth/audit?limit=50")
            .header("Authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap()
    };

    let response = app
        .clone()
        .oneshot(audit_request(&admin_token.unwrap()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    let events = body["data"].as_array().unwrap();
    assert!(!events.is_empty());
    let actions: Vec<&str> = events
        .iter()
        .filter_map(|e| e["action"].as_str())
        .collect();
    assert!(actions.contains(&"USER_CREATED"));
    assert!(actions.contains(&"LOGIN_SUCCESS"));

    let response = app
        .clone()
        .oneshot(audit_request(&bob_token.unwrap()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_system_status_reports_setup_state() {
    let app = spawn_app().await;

    register(&app, "alice", "a@x.com", "Str0ng!Pass").await;
    let (_, token) = login(&app, "alice", "Str0ng!Pass").await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/system/status")
                .header("Authorization", format!("Bearer {}", token.unwrap()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["database"], "ok");
    assert_eq!(body["data"]["users"], 1);
    assert_eq!(body["data"]["setup_required"], false);
}
