//! End-to-end scenarios over the full router and an in-memory store.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use portfolio_cms::auth::SessionConfig;
use portfolio_cms::create_app;
use portfolio_cms::db::Database;
use portfolio_cms::state::AppState;
use portfolio_cms::upload::UploadConfig;

struct TestApp {
    router: Router,
    db: Database,
}

impl TestApp {
    async fn new() -> Self {
        let db = Database::in_memory();
        db.bootstrap().await.unwrap();
        let state = AppState::new(
            db.clone(),
            SessionConfig::with_secret("integration-secret"),
            UploadConfig {
                public_key: "public_key".into(),
                private_key: "private_key".into(),
            },
        );
        Self {
            router: create_app(state),
            db,
        }
    }

    async fn request(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            req = req.header("authorization", format!("Bearer {token}"));
        }
        let req = match body {
            Some(body) => req
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap())),
            None => req.body(Body::empty()),
        }
        .unwrap();

        let res = self.router.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    /// Sign up the admin and return an access token.
    async fn admin_token(&self) -> String {
        let (status, _) = self
            .request(
                "POST",
                "/api/auth/sign-up",
                None,
                Some(json!({
                    "name": "Site Owner",
                    "email": "owner@example.com",
                    "password": "hunter2hunter2",
                    "confirmPassword": "hunter2hunter2",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = self
            .request(
                "POST",
                "/api/auth/sign-in",
                None,
                Some(json!({ "email": "Owner@Example.com", "password": "hunter2hunter2" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        body["data"]["accessToken"].as_str().unwrap().to_string()
    }
}

#[tokio::test]
async fn project_scenario() {
    let app = TestApp::new().await;
    let token = app.admin_token().await;

    let (status, body) = app
        .request(
            "POST",
            "/api/projects",
            Some(&token),
            Some(json!({ "name": "Demo", "description": "x", "featured": true })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    let id = body["data"]["_id"].as_str().unwrap().to_string();
    assert!(body["data"]["createdAt"].is_string());
    assert!(body["data"]["updatedAt"].is_string());

    let (status, body) = app
        .request(
            "PATCH",
            &format!("/api/projects/{id}"),
            Some(&token),
            Some(json!({ "name": "Demo2" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Demo2");
    assert_eq!(body["data"]["description"], "x");
    assert_eq!(body["data"]["featured"], true);

    let (status, body) = app
        .request("GET", "/api/projects", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, body) = app
        .request("DELETE", &format!("/api/projects/{id}"), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true }));

    let (status, body) = app
        .request("GET", &format!("/api/projects/{id}"), None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["message"], "Project not found");
}

#[tokio::test]
async fn blog_with_empty_title_is_rejected_and_not_stored() {
    let app = TestApp::new().await;
    let token = app.admin_token().await;

    let (status, body) = app
        .request(
            "POST",
            "/api/blogs",
            Some(&token),
            Some(json!({ "title": "", "description": "# Hello" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["message"], "Validation failed");
    assert!(body["error"]["details"]["title"].is_array());
    assert_eq!(app.db.count("blogs").await.unwrap(), 0);
}

#[tokio::test]
async fn mutations_without_token_are_unauthorized() {
    let app = TestApp::new().await;

    let (status, body) = app
        .request(
            "POST",
            "/api/blogs",
            None,
            Some(json!({ "title": "t", "description": "d" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["message"], "Unauthorized");

    let (status, _) = app
        .request(
            "POST",
            "/api/projects",
            Some("forged.token.value"),
            Some(json!({ "name": "n", "description": "d" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    assert_eq!(app.db.count("blogs").await.unwrap(), 0);
    assert_eq!(app.db.count("projects").await.unwrap(), 0);
}

#[tokio::test]
async fn unreadable_body_is_checked_after_authorization() {
    let app = TestApp::new().await;
    let raw = |token: Option<&str>| {
        let mut req = Request::builder()
            .method("POST")
            .uri("/api/projects")
            .header("content-type", "application/json");
        if let Some(token) = token {
            req = req.header("authorization", format!("Bearer {token}"));
        }
        req.body(Body::from("{not json")).unwrap()
    };

    let res = app.router.clone().oneshot(raw(None)).await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let token = app.admin_token().await;
    let res = app.router.clone().oneshot(raw(Some(&token))).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["error"]["details"]["payload"].is_array());
    assert_eq!(app.db.count("projects").await.unwrap(), 0);
}

#[tokio::test]
async fn malformed_id_is_a_validation_error() {
    let app = TestApp::new().await;
    let (status, body) = app.request("GET", "/api/blogs/abc", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["details"]["id"].is_array());
}

#[tokio::test]
async fn second_sign_up_conflicts() {
    let app = TestApp::new().await;
    app.admin_token().await;

    let (status, body) = app
        .request(
            "POST",
            "/api/auth/sign-up",
            None,
            Some(json!({
                "name": "Intruder",
                "email": "intruder@example.com",
                "password": "password123",
                "confirmPassword": "password123",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["message"], "User already exists");
    assert_eq!(app.db.count("users").await.unwrap(), 1);
}

#[tokio::test]
async fn contact_message_flow() {
    let app = TestApp::new().await;
    let token = app.admin_token().await;

    let (status, body) = app
        .request(
            "POST",
            "/api/messages",
            None,
            Some(json!({
                "name": "Visitor",
                "email": "visitor@example.com",
                "message": "Nice site",
                "status": "read",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["status"], "unread");
    let id = body["data"]["_id"].as_str().unwrap().to_string();

    let (status, _) = app.request("GET", "/api/messages", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .request(
            "PATCH",
            &format!("/api/messages/{id}"),
            Some(&token),
            Some(json!({ "status": "archived" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["details"]["status"].is_array());

    let (status, body) = app
        .request(
            "PATCH",
            &format!("/api/messages/{id}"),
            Some(&token),
            Some(json!({ "status": "read" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "read");

    let (status, body) = app
        .request("GET", "/api/messages", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["message"], "Nice site");
}

#[tokio::test]
async fn upload_credentials_for_admin_only() {
    let app = TestApp::new().await;

    let (status, _) = app
        .request("GET", "/api/upload-auth", None, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let token = app.admin_token().await;
    let (status, body) = app
        .request(
            "GET",
            "/api/upload-auth?fileType=image/png&fileSize=2048",
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["publicKey"], "public_key");
    assert!(body["data"]["token"].is_string());

    let (status, body) = app
        .request(
            "GET",
            "/api/upload-auth?fileType=text/html",
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["details"]["fileType"].is_array());
}

#[tokio::test]
async fn sign_out_revokes_refresh_token() {
    let app = TestApp::new().await;
    app.admin_token().await;

    let (_, body) = app
        .request(
            "POST",
            "/api/auth/sign-in",
            None,
            Some(json!({ "email": "owner@example.com", "password": "hunter2hunter2" })),
        )
        .await;
    let access = body["data"]["accessToken"].as_str().unwrap().to_string();
    let refresh = body["data"]["refreshToken"].as_str().unwrap().to_string();

    let (status, _) = app
        .request("POST", "/api/auth/sign-out", Some(&access), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .request(
            "POST",
            "/api/auth/refresh",
            None,
            Some(json!({ "refreshToken": refresh })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
