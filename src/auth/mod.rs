//! Accounts and sessions: sign-up, credential checks, token lifecycle.

pub mod password;
pub mod session;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::action::{Action, ActionGateway, Input};
use crate::db::models::{NewUser, User, ADMIN_ROLE, USERS};
use crate::db::store::to_body;
use crate::db::Database;
use crate::error::{handle_error, AppError, AppResult, AuthError, StoreError};
use crate::repository::finish;
use crate::response::ActionResponse;
use crate::validation::{SignIn, SignUp};

pub use session::{SessionConfig, SessionManager, TokenPair};

/// The public face of an account. Never carries the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: String,
}

impl UserIdentity {
    pub fn is_admin(&self) -> bool {
        self.role == ADMIN_ROLE
    }
}

impl From<User> for UserIdentity {
    fn from(user: User) -> Self {
        UserIdentity {
            id: user.id.to_string(),
            name: user.name,
            email: user.email,
            role: user.role,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInData {
    pub user: UserIdentity,
    #[serde(flatten)]
    pub tokens: TokenPair,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignOutRequest {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Store the admin account, mapping any single-tenant or email clash to a conflict.
async fn insert_admin(db: &Database, user: &NewUser) -> AppResult<User> {
    let body = to_body(user)?;
    let mut tx = db.begin().await?;
    let outcome = tx.insert(USERS.name, body).await.map_err(|e| match e {
        StoreError::Duplicate { .. } => AppError::Auth(AuthError::AlreadyExists),
        other => other.into(),
    });
    let doc = finish(tx, outcome).await?;
    Ok(doc.decode()?)
}

#[derive(Clone)]
pub struct AuthService {
    gateway: ActionGateway,
    sessions: SessionManager,
    /// Serializes sign-ups in this process from the user count to the commit.
    sign_up_lock: Arc<Mutex<()>>,
}

impl AuthService {
    pub fn new(gateway: ActionGateway, sessions: SessionManager) -> Self {
        Self {
            gateway,
            sessions,
            sign_up_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Create the site's single admin account. Closed once any user exists.
    pub async fn sign_up(&self, params: impl Into<Input>) -> ActionResponse<UserIdentity> {
        match self.try_sign_up(params.into()).await {
            Ok(user) => ActionResponse::created(user),
            Err(err) => handle_error(err),
        }
    }

    async fn try_sign_up(&self, params: Input) -> AppResult<UserIdentity> {
        let input = self
            .gateway
            .run::<SignUp>(Action::new().params(params))
            .await?
            .require()?;
        let db = self.gateway.database();

        // Other processes sharing the store are held off by the users singleton index.
        let _guard = self.sign_up_lock.lock().await;
        if db.count(USERS.name).await? > 0 {
            tracing::warn!("Sign-up rejected: an account already exists");
            return Err(AuthError::AlreadyExists.into());
        }

        let user = NewUser {
            name: input.name.trim().to_string(),
            email: input.email.trim().to_lowercase(),
            password: password::hash_password(input.password).await?,
            role: ADMIN_ROLE.to_string(),
        };
        let user = insert_admin(db, &user).await?;
        tracing::info!("Admin user registered successfully: {}", user.email);
        Ok(user.into())
    }

    /// Check credentials. Every failure, including a store error, is `None`.
    pub async fn authenticate(&self, email: &str, password: &str) -> Option<UserIdentity> {
        let email = email.trim().to_lowercase();
        let doc = match self
            .gateway
            .database()
            .find_one_by(USERS.name, "email", &email)
            .await
        {
            Ok(Some(doc)) => doc,
            Ok(None) => {
                tracing::warn!("Login attempt for unknown user: {}", email);
                password::verify_dummy(password.to_string()).await;
                return None;
            }
            Err(e) => {
                tracing::error!("Database error during login: {}", e);
                return None;
            }
        };

        let user: User = match doc.decode() {
            Ok(user) => user,
            Err(e) => {
                tracing::error!("Stored user record is unreadable: {}", e);
                return None;
            }
        };

        if !password::verify_password(password.to_string(), user.password.clone()).await {
            tracing::warn!("Failed login attempt for: {}", email);
            return None;
        }

        Some(user.into())
    }

    pub async fn sign_in(&self, params: impl Into<Input>) -> ActionResponse<SignInData> {
        match self.try_sign_in(params.into()).await {
            Ok(data) => ActionResponse::ok(data),
            Err(err) => handle_error(err),
        }
    }

    async fn try_sign_in(&self, params: Input) -> AppResult<SignInData> {
        let input = self
            .gateway
            .run::<SignIn>(Action::new().params(params))
            .await?
            .require()?;

        let user = self
            .authenticate(&input.email, &input.password)
            .await
            .ok_or(AuthError::InvalidCredentials)?;
        let tokens = self.sessions.issue(&user).await?;

        tracing::info!("Successful login for user: {}", user.email);
        Ok(SignInData { user, tokens })
    }

    /// Decode an access token back into the identity it was issued for.
    pub fn verify(&self, access_token: Option<&str>) -> ActionResponse<UserIdentity> {
        let result = access_token
            .ok_or(AuthError::InvalidToken)
            .and_then(|token| self.sessions.verify_access_token(token))
            .map(UserIdentity::from);
        match result {
            Ok(user) => ActionResponse::ok(user),
            Err(err) => handle_error(err.into()),
        }
    }

    pub async fn refresh(&self, request: RefreshRequest) -> ActionResponse<TokenPair> {
        let result = if request.refresh_token.trim().is_empty() {
            Err(AppError::field("refreshToken", "Refresh token is required"))
        } else {
            self.sessions.refresh(request.refresh_token.trim()).await
        };
        match result {
            Ok(tokens) => ActionResponse::ok(tokens),
            Err(err) => handle_error(err),
        }
    }

    /// Always succeeds; unknown tokens are ignored.
    pub async fn end_session(&self, request: SignOutRequest) -> ActionResponse<()> {
        self.sessions
            .end_session(
                request.refresh_token.as_deref(),
                request.access_token.as_deref(),
            )
            .await;
        ActionResponse::empty()
    }
}
