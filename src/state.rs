//! Shared application state handed to every handler.

use std::sync::Arc;

use axum::extract::FromRef;
use axum::http::HeaderMap;

use crate::action::ActionGateway;
use crate::auth::{AuthService, SessionConfig, SessionManager, UserIdentity};
use crate::db::models::{Blog, Message, Project};
use crate::db::Database;
use crate::repository::Repository;
use crate::upload::{UploadConfig, UploadService};

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub projects: Arc<Repository<Project>>,
    pub blogs: Arc<Repository<Blog>>,
    pub messages: Arc<Repository<Message>>,
    pub auth: AuthService,
    pub sessions: SessionManager,
    pub upload: UploadService,
}

impl AppState {
    pub fn new(db: Database, session: SessionConfig, upload: UploadConfig) -> Self {
        let gateway = ActionGateway::new(db.clone());
        let sessions = SessionManager::new(session);

        Self {
            projects: Arc::new(Repository::new(gateway.clone())),
            blogs: Arc::new(Repository::new(gateway.clone())),
            messages: Arc::new(Repository::new(gateway.clone())),
            auth: AuthService::new(gateway.clone(), sessions.clone()),
            upload: UploadService::new(gateway, upload),
            sessions,
            db,
        }
    }

    /// The authenticated caller, if the request carries a valid bearer token.
    pub fn caller(&self, headers: &HeaderMap) -> Option<UserIdentity> {
        self.sessions.caller(headers)
    }
}

impl FromRef<AppState> for Arc<Repository<Project>> {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.projects)
    }
}

impl FromRef<AppState> for Arc<Repository<Blog>> {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.blogs)
    }
}

impl FromRef<AppState> for Arc<Repository<Message>> {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.messages)
    }
}

impl FromRef<AppState> for SessionManager {
    fn from_ref(state: &AppState) -> Self {
        state.sessions.clone()
    }
}
