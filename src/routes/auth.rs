/**
 * Authentication Routes
 * Sign-up, sign-in, token verification, refresh and sign-out
 */
use axum::{body::Bytes, extract::State, http::HeaderMap};

use super::Payload;
use crate::action::Input;
use crate::auth::session::extract_bearer_token;
use crate::auth::{RefreshRequest, SignInData, SignOutRequest, TokenPair, UserIdentity};
use crate::error::{handle_error, AppError};
use crate::response::ActionResponse;
use crate::state::AppState;

/// POST /api/auth/sign-up
/// Register the first admin user (only works while no user exists)
pub async fn sign_up(
    State(state): State<AppState>,
    Payload(params): Payload,
) -> ActionResponse<UserIdentity> {
    state.auth.sign_up(params).await
}

/// POST /api/auth/sign-in
/// Authenticate user and return tokens
pub async fn sign_in(
    State(state): State<AppState>,
    Payload(params): Payload,
) -> ActionResponse<SignInData> {
    state.auth.sign_in(params).await
}

/// POST /api/auth/verify
/// Verify the bearer access token and return the user it belongs to
pub async fn verify(State(state): State<AppState>, headers: HeaderMap) -> ActionResponse<UserIdentity> {
    state.auth.verify(extract_bearer_token(&headers))
}

/// POST /api/auth/refresh
/// Exchange a refresh token for a new token pair
pub async fn refresh(
    State(state): State<AppState>,
    Payload(params): Payload,
) -> ActionResponse<TokenPair> {
    let request: RefreshRequest = match params {
        Input::Json(value) => serde_json::from_value(value).unwrap_or_default(),
        Input::Malformed(reason) => return handle_error(AppError::field("payload", reason)),
    };
    state.auth.refresh(request).await
}

/// POST /api/auth/sign-out
/// Revoke refresh tokens. The body is optional; a bearer header stands in
/// for `accessToken`.
pub async fn sign_out(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ActionResponse<()> {
    let mut request: SignOutRequest = serde_json::from_slice(&body).unwrap_or_default();
    if request.access_token.is_none() {
        request.access_token = extract_bearer_token(&headers).map(str::to_string);
    }
    state.auth.end_session(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::SessionConfig;
    use crate::db::Database;
    use crate::upload::UploadConfig;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::post;
    use axum::Router;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn auth_router() -> Router {
        let db = Database::in_memory();
        db.bootstrap().await.unwrap();
        let state = AppState::new(
            db,
            SessionConfig::with_secret("test-secret"),
            UploadConfig::default(),
        );
        Router::new()
            .route("/api/auth/sign-up", post(sign_up))
            .route("/api/auth/sign-in", post(sign_in))
            .route("/api/auth/verify", post(verify))
            .route("/api/auth/refresh", post(refresh))
            .route("/api/auth/sign-out", post(sign_out))
            .with_state(state)
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn post_json(uri: &str, json: &Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(json).unwrap()))
            .unwrap()
    }

    async fn signed_up(app: &Router) {
        let (status, _) = send(
            app,
            post_json(
                "/api/auth/sign-up",
                &json!({
                    "name": "Ada",
                    "email": "ada@example.com",
                    "password": "password123",
                    "confirmPassword": "password123",
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_sign_in_empty_email_returns_bad_request() {
        let app = auth_router().await;
        let (status, body) = send(
            &app,
            post_json(
                "/api/auth/sign-in",
                &json!({ "email": "", "password": "password123" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"]["details"]["email"].is_array());
    }

    #[tokio::test]
    async fn test_malformed_body_is_payload_error() {
        let app = auth_router().await;
        let req = Request::post("/api/auth/sign-in")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["error"]["details"]["payload"].is_array());
    }

    #[tokio::test]
    async fn test_sign_in_wrong_credentials_returns_unauthorized() {
        let app = auth_router().await;
        signed_up(&app).await;
        let (status, body) = send(
            &app,
            post_json(
                "/api/auth/sign-in",
                &json!({ "email": "ada@example.com", "password": "wrongpassword" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["message"], "Invalid credentials");
    }

    #[tokio::test]
    async fn test_sign_in_then_verify_and_refresh() {
        let app = auth_router().await;
        signed_up(&app).await;

        let (status, body) = send(
            &app,
            post_json(
                "/api/auth/sign-in",
                &json!({ "email": "ADA@example.com", "password": "password123" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let access = body["data"]["accessToken"].as_str().unwrap().to_string();
        let refresh_token = body["data"]["refreshToken"].as_str().unwrap().to_string();
        assert_eq!(body["data"]["user"]["role"], "admin");

        let req = Request::post("/api/auth/verify")
            .header("authorization", format!("Bearer {access}"))
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["email"], "ada@example.com");

        let (status, body) = send(
            &app,
            post_json("/api/auth/refresh", &json!({ "refreshToken": refresh_token })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_ne!(body["data"]["refreshToken"], refresh_token);
    }

    #[tokio::test]
    async fn test_verify_no_token_returns_unauthorized() {
        let app = auth_router().await;
        let req = Request::post("/api/auth/verify").body(Body::empty()).unwrap();
        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_refresh_empty_token_returns_bad_request() {
        let app = auth_router().await;
        let (status, _) = send(
            &app,
            post_json("/api/auth/refresh", &json!({ "refreshToken": "" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_sign_out_without_body_returns_success() {
        let app = auth_router().await;
        let req = Request::post("/api/auth/sign-out").body(Body::empty()).unwrap();
        let (status, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "success": true }));
    }
}
