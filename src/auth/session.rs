//! Access and refresh tokens.
//!
//! Access tokens are short-lived HS256 JWTs carrying the caller identity.
//! Refresh tokens are random strings; only their SHA-256 hash is kept, in
//! memory, so a restart signs everyone out.

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::HeaderMap;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::distr::{Alphanumeric, SampleString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use super::UserIdentity;
use crate::error::{AppError, AppResult, AuthError};

pub const DEFAULT_JWT_SECRET: &str = "default-jwt-secret-change-in-production";

/// Access token expiry in minutes
const ACCESS_TOKEN_EXPIRY_MINUTES: i64 = 15;

/// Refresh token expiry in days
const REFRESH_TOKEN_EXPIRY_DAYS: i64 = 7;

const REFRESH_TOKEN_LENGTH: usize = 64;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub jwt_secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl SessionConfig {
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: secret.into(),
            ..Self::default()
        }
    }

    pub fn uses_default_secret(&self) -> bool {
        self.jwt_secret.is_empty() || self.jwt_secret == DEFAULT_JWT_SECRET
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            jwt_secret: std::env::var("JWT_SECRET")
                .unwrap_or_else(|_| DEFAULT_JWT_SECRET.to_string()),
            access_ttl: Duration::minutes(ACCESS_TOKEN_EXPIRY_MINUTES),
            refresh_ttl: Duration::days(REFRESH_TOKEN_EXPIRY_DAYS),
        }
    }
}

/// JWT Claims structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub name: String,
    pub role: String,
    pub exp: i64,
    pub iat: i64,
}

impl From<Claims> for UserIdentity {
    fn from(claims: Claims) -> Self {
        UserIdentity {
            id: claims.sub,
            name: claims.name,
            email: claims.email,
            role: claims.role,
        }
    }
}

#[derive(Debug, Clone)]
struct RefreshTokenData {
    identity: UserIdentity,
    expires_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

fn generate_refresh_token() -> String {
    Alphanumeric.sample_string(&mut rand::rng(), REFRESH_TOKEN_LENGTH)
}

fn hash_refresh_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Extract bearer token from Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Issues, verifies and revokes tokens. Clones share one refresh-token table.
#[derive(Clone)]
pub struct SessionManager {
    config: Arc<SessionConfig>,
    refresh_tokens: Arc<RwLock<HashMap<String, RefreshTokenData>>>,
}

impl SessionManager {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config: Arc::new(config),
            refresh_tokens: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn create_access_token(&self, user: &UserIdentity) -> AppResult<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role.clone(),
            exp: (now + self.config.access_ttl).timestamp(),
            iat: now.timestamp(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(format!("failed to create access token: {e}")))
    }

    /// Verify and decode access token
    pub fn verify_access_token(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|e| {
            tracing::debug!("Token verification failed: {}", e);
            AuthError::InvalidToken
        })
    }

    /// The identity behind a valid `Authorization: Bearer` header, if any.
    pub fn caller(&self, headers: &HeaderMap) -> Option<UserIdentity> {
        let token = extract_bearer_token(headers)?;
        self.verify_access_token(token).ok().map(UserIdentity::from)
    }

    /// Mint a fresh access token and refresh token for `user`.
    pub async fn issue(&self, user: &UserIdentity) -> AppResult<TokenPair> {
        let access_token = self.create_access_token(user)?;
        let refresh_token = generate_refresh_token();
        let now = Utc::now();

        let mut tokens = self.refresh_tokens.write().await;
        tokens.retain(|_, data| data.expires_at > now.timestamp());
        tokens.insert(
            hash_refresh_token(&refresh_token),
            RefreshTokenData {
                identity: user.clone(),
                expires_at: (now + self.config.refresh_ttl).timestamp(),
            },
        );

        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// Exchange a refresh token for a new pair. The presented token is
    /// consumed whether or not it is still valid.
    pub async fn refresh(&self, refresh_token: &str) -> AppResult<TokenPair> {
        let data = self
            .refresh_tokens
            .write()
            .await
            .remove(&hash_refresh_token(refresh_token));

        let identity = match data {
            Some(data) if data.expires_at > Utc::now().timestamp() => data.identity,
            Some(_) => {
                tracing::debug!("Expired refresh token presented");
                return Err(AuthError::InvalidToken.into());
            }
            None => return Err(AuthError::InvalidToken.into()),
        };

        self.issue(&identity).await
    }

    /// Revoke the given refresh token and every refresh token belonging to
    /// the access token's subject. Unknown or invalid tokens are ignored.
    pub async fn end_session(&self, refresh_token: Option<&str>, access_token: Option<&str>) {
        let subject = access_token
            .and_then(|t| self.verify_access_token(t).ok())
            .map(|claims| claims.sub);

        let mut tokens = self.refresh_tokens.write().await;
        if let Some(token) = refresh_token {
            tokens.remove(&hash_refresh_token(token));
        }
        if let Some(sub) = subject {
            tokens.retain(|_, data| data.identity.id != sub);
        }
    }

    #[cfg(test)]
    async fn active_refresh_tokens(&self) -> usize {
        self.refresh_tokens.read().await.len()
    }
}
