//! Portfolio CMS - library for app logic and testing

pub mod action;
pub mod auth;
pub mod db;
pub mod error;
pub mod logging;
pub mod repository;
pub mod response;
pub mod routes;
pub mod state;
pub mod upload;
pub mod validation;

use axum::{
    http::{HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer,
};

use auth::SessionConfig;
use db::models::{Blog, Message, Project};
use db::Database;
use state::AppState;
use upload::UploadConfig;

/// Global request body cap.
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Configure CORS from environment variables.
/// Uses ALLOWED_ORIGINS (comma-separated) or FRONTEND_ORIGIN, falling back
/// to the local frontend dev server.
pub fn configure_cors() -> CorsLayer {
    let allowed_origins = std::env::var("ALLOWED_ORIGINS")
        .ok()
        .and_then(|s| {
            let origins: Vec<HeaderValue> = s
                .split(',')
                .filter_map(|origin| origin.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                None
            } else {
                Some(origins)
            }
        })
        .or_else(|| {
            std::env::var("FRONTEND_ORIGIN")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(|origin| vec![origin])
        })
        .unwrap_or_else(|| {
            vec![
                HeaderValue::from_static("http://localhost:3000"),
                HeaderValue::from_static("http://127.0.0.1:3000"),
            ]
        });

    CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
        ])
        .allow_credentials(true)
}

/// Create and configure the application router.
pub fn create_app(state: AppState) -> Router {
    let cors = configure_cors();
    tracing::info!("CORS configured");

    let router = Router::new()
        .route("/api/auth/sign-up", post(routes::auth::sign_up))
        .route("/api/auth/sign-in", post(routes::auth::sign_in))
        .route("/api/auth/verify", post(routes::auth::verify))
        .route("/api/auth/refresh", post(routes::auth::refresh))
        .route("/api/auth/sign-out", post(routes::auth::sign_out))
        .route("/api/upload-auth", get(routes::upload::upload_auth))
        .route("/health", get(routes::health::health_ping))
        .route("/health/detailed", get(routes::health::health_detailed))
        .route("/health/ready", get(routes::health::health_ready));

    let router = routes::records::routes::<Project>(router, "/api/projects");
    let router = routes::records::routes::<Blog>(router, "/api/blogs");
    let router = routes::records::routes::<Message>(router, "/api/messages");

    router
        .with_state(state)
        .layer(logging::middleware::propagate_request_id_layer())
        .layer(middleware::from_fn(logging::middleware::log_request))
        .layer(logging::middleware::request_id_layer())
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(cors)
}

/// Open the configured store: PostgreSQL when DATABASE_URL is set,
/// otherwise an in-process store that lives as long as the server.
async fn open_database() -> Database {
    if std::env::var("DATABASE_URL").is_ok() {
        match Database::connect(None).await {
            Ok(db) => return db,
            Err(e) => {
                tracing::warn!(
                    "Failed to initialize database pool: {}. Falling back to in-memory store.",
                    e
                );
            }
        }
    } else {
        tracing::info!("DATABASE_URL not set. Using in-memory store; data will not persist.");
    }
    Database::in_memory()
}

/// Run the server (used by main).
pub async fn run() {
    dotenvy::dotenv().ok();

    // Held until the end of `run` so buffered log lines are flushed.
    let _log_guards = logging::init();

    routes::health::init_start_time();

    let session = SessionConfig::default();

    // Refuse to start in production with the insecure default JWT secret.
    let environment = std::env::var("ENVIRONMENT").unwrap_or_default();
    if environment == "production" && session.uses_default_secret() {
        panic!(
            "FATAL: JWT_SECRET must be set to a secure, unique value in production. \
             Refusing to start with the default secret."
        );
    }

    let upload = UploadConfig::from_env();
    if upload.private_key.is_empty() {
        tracing::warn!("IMAGEKIT_PRIVATE_KEY is not set; upload credentials are unavailable");
    }

    let db = open_database().await;
    if let Err(e) = db.bootstrap().await {
        tracing::error!("Failed to prepare collections: {}", e);
    }

    let app = create_app(AppState::new(db.clone(), session, upload));

    let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(3001);
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .expect("Invalid HOST/PORT configuration");
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    tracing::info!("Server stopped accepting connections, closing database");
    db.close().await;
    tracing::info!("Graceful shutdown complete");
}

/// Wait for Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received SIGINT, starting graceful shutdown"),
        () = terminate => tracing::info!("Received SIGTERM, starting graceful shutdown"),
    }
}
