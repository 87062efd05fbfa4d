//! The response envelope returned by every query and mutation.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::FieldErrors;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<FieldErrors>,
}

impl ErrorBody {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: None,
        }
    }
}

/// `{ success: true, data }` or `{ success: false, error: { message, details? } }`.
///
/// The HTTP status travels alongside but is never serialized.
#[derive(Debug, Serialize)]
pub struct ActionResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    #[serde(skip)]
    pub status: StatusCode,
}

impl<T> ActionResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            status: StatusCode::OK,
        }
    }

    pub fn created(data: T) -> Self {
        Self {
            status: StatusCode::CREATED,
            ..Self::ok(data)
        }
    }

    /// Success without a payload (deletes, sign-out).
    pub fn empty() -> Self {
        Self {
            success: true,
            data: None,
            error: None,
            status: StatusCode::OK,
        }
    }

    pub fn failure(status: StatusCode, error: ErrorBody) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            status,
        }
    }
}

impl<T: Serialize> IntoResponse for ActionResponse<T> {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_success_omits_data() {
        let json = serde_json::to_value(ActionResponse::<()>::empty()).unwrap();
        assert_eq!(json, serde_json::json!({ "success": true }));
    }

    #[test]
    fn test_failure_shape() {
        let resp: ActionResponse<String> =
            ActionResponse::failure(StatusCode::NOT_FOUND, ErrorBody::message("Project not found"));
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["message"], "Project not found");
        assert!(json["error"].get("details").is_none());
        assert!(json.get("status").is_none());
    }
}
