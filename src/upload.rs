//! Signed credentials that let the admin UI upload straight to the image host.
//!
//! The host verifies `signature = hex(HMAC-SHA1(private_key, token + expire))`.

use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use uuid::Uuid;

use crate::action::{Action, ActionGateway, Input};
use crate::auth::UserIdentity;
use crate::error::{handle_error, AppError, AppResult};
use crate::response::ActionResponse;
use crate::validation::UploadRequest;

type HmacSha1 = Hmac<Sha1>;

/// How long issued credentials stay valid, in seconds.
const CREDENTIAL_TTL_SECS: i64 = 30 * 60;

#[derive(Debug, Clone, Default)]
pub struct UploadConfig {
    pub public_key: String,
    pub private_key: String,
}

impl UploadConfig {
    pub fn from_env() -> Self {
        Self {
            public_key: std::env::var("IMAGEKIT_PUBLIC_KEY").unwrap_or_default(),
            private_key: std::env::var("IMAGEKIT_PRIVATE_KEY").unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadCredentials {
    pub token: String,
    pub expire: i64,
    pub signature: String,
    pub public_key: String,
}

fn sign(private_key: &str, token: &str, expire: i64) -> AppResult<String> {
    let mut mac = HmacSha1::new_from_slice(private_key.as_bytes())
        .map_err(|e| AppError::Internal(format!("invalid upload signing key: {e}")))?;
    mac.update(token.as_bytes());
    mac.update(expire.to_string().as_bytes());
    Ok(format!("{:x}", mac.finalize().into_bytes()))
}

#[derive(Clone)]
pub struct UploadService {
    gateway: ActionGateway,
    config: UploadConfig,
}

impl UploadService {
    pub fn new(gateway: ActionGateway, config: UploadConfig) -> Self {
        Self { gateway, config }
    }

    /// Admin only. `params` may describe the file so policy is checked up front.
    pub async fn credentials(
        &self,
        caller: Option<&UserIdentity>,
        params: impl Into<Input>,
    ) -> ActionResponse<UploadCredentials> {
        match self.try_credentials(caller, params.into()).await {
            Ok(credentials) => ActionResponse::ok(credentials),
            Err(err) => handle_error(err),
        }
    }

    async fn try_credentials(
        &self,
        caller: Option<&UserIdentity>,
        params: Input,
    ) -> AppResult<UploadCredentials> {
        self.gateway
            .run::<UploadRequest>(Action::new().params(params).authorize(caller))
            .await?;

        if self.config.private_key.is_empty() {
            return Err(AppError::Internal(
                "IMAGEKIT_PRIVATE_KEY is not configured".to_string(),
            ));
        }

        let token = Uuid::new_v4().to_string();
        let expire = Utc::now().timestamp() + CREDENTIAL_TTL_SECS;
        let signature = sign(&self.config.private_key, &token, expire)?;

        Ok(UploadCredentials {
            token,
            expire,
            signature,
            public_key: self.config.public_key.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use axum::http::StatusCode;
    use serde_json::json;

    fn admin() -> UserIdentity {
        UserIdentity {
            id: "1".into(),
            name: "Admin".into(),
            email: "admin@example.com".into(),
            role: "admin".into(),
        }
    }

    fn service(private_key: &str) -> UploadService {
        UploadService::new(
            ActionGateway::new(Database::in_memory()),
            UploadConfig {
                public_key: "public_test".into(),
                private_key: private_key.into(),
            },
        )
    }

    #[test]
    fn test_sign_covers_token_and_expiry() {
        let signature = sign("key", "token", 1700000000).unwrap();
        assert_eq!(signature.len(), 40);
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(signature, sign("key", "token", 1700000000).unwrap());
        assert_ne!(signature, sign("key", "token", 1700000001).unwrap());
        assert_ne!(signature, sign("other", "token", 1700000000).unwrap());
    }

    #[tokio::test]
    async fn test_credentials_for_admin() {
        let caller = admin();
        let before = Utc::now().timestamp();
        let creds = service("private_test")
            .credentials(Some(&caller), json!({}))
            .await
            .data
            .unwrap();

        assert!(Uuid::parse_str(&creds.token).is_ok());
        assert_eq!(creds.public_key, "public_test");
        assert!(creds.expire >= before + CREDENTIAL_TTL_SECS);
        assert_eq!(
            creds.signature,
            sign("private_test", &creds.token, creds.expire).unwrap()
        );
    }

    #[tokio::test]
    async fn test_credentials_require_admin() {
        let resp = service("private_test").credentials(None, json!({})).await;
        assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_policy_violations() {
        let caller = admin();
        let upload = service("private_test");

        let resp = upload
            .credentials(Some(&caller), json!({ "fileType": "application/pdf" }))
            .await;
        assert!(resp.error.unwrap().details.unwrap().contains_key("fileType"));

        let resp = upload
            .credentials(
                Some(&caller),
                json!({ "fileType": "image/png", "fileSize": 11 * 1024 * 1024 }),
            )
            .await;
        assert!(resp.error.unwrap().details.unwrap().contains_key("fileSize"));
    }

    #[tokio::test]
    async fn test_missing_private_key_is_internal_error() {
        let caller = admin();
        let resp = service("").credentials(Some(&caller), json!({})).await;
        assert_eq!(resp.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(resp.error.unwrap().message, "An unexpected error occurred");
    }
}
