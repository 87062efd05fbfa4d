//! Payload schemas and the rules they enforce.
//!
//! A schema is any type that deserializes from JSON and derives [`Validate`].
//! [`parse`] runs both steps and folds every failure into [`FieldErrors`].

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use validator::{Validate, ValidateUrl, ValidationError, ValidationErrors};

use crate::db::models::MessageStatus;
use crate::error::FieldErrors;

/// Maximum accepted upload size: 10 MiB.
pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// MIME types the image host accepts from us.
pub const ALLOWED_IMAGE_TYPES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/webp",
    "image/gif",
];

pub trait Schema: DeserializeOwned + Validate + Send {}

impl<T: DeserializeOwned + Validate + Send> Schema for T {}

/// Deserialize `value` into `S` and run its rules.
pub fn parse<S: Schema>(value: Value) -> Result<S, FieldErrors> {
    let parsed: S = serde_json::from_value(value).map_err(|e| {
        let mut errors = FieldErrors::new();
        errors.insert("payload".to_string(), vec![e.to_string()]);
        errors
    })?;

    parsed.validate().map_err(|e| flatten(&e))?;
    Ok(parsed)
}

/// Collapse `validator`'s nested error tree into field -> messages.
pub fn flatten(errors: &ValidationErrors) -> FieldErrors {
    errors
        .field_errors()
        .into_iter()
        .map(|(field, errs)| {
            let messages = errs
                .iter()
                .map(|e| match &e.message {
                    Some(message) => message.to_string(),
                    None => format!("Invalid {field}"),
                })
                .collect();
            (camel_case(&field), messages)
        })
        .collect()
}

fn camel_case(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut upper = false;
    for c in field.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

fn url_or_empty(value: &str) -> Result<(), ValidationError> {
    if value.is_empty() || value.validate_url() {
        return Ok(());
    }
    Err(ValidationError::new("url").with_message("Must be a valid URL".into()))
}

fn message_status(value: &str) -> Result<(), ValidationError> {
    match value {
        "read" | "unread" => Ok(()),
        _ => Err(ValidationError::new("status")
            .with_message("Status must be either \"read\" or \"unread\"".into())),
    }
}

fn allowed_image_type(value: &str) -> Result<(), ValidationError> {
    if ALLOWED_IMAGE_TYPES.contains(&value) {
        return Ok(());
    }
    Err(ValidationError::new("file_type").with_message(
        "Invalid file type. Please upload an image (JPEG, PNG, WebP, or GIF)".into(),
    ))
}

// ============================================================================
// Projects
// ============================================================================

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddProject {
    #[serde(default)]
    #[validate(length(min = 1, message = "Project name is required"))]
    pub name: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "Description is required"))]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "url_or_empty"))]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "url_or_empty"))]
    pub github: Option<String>,
    #[serde(default)]
    pub tech_stack: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub featured: bool,
}

/// Partial project update. Only fields present in the payload are merged.
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProject {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, message = "Project name is required"))]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, message = "Description is required"))]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "url_or_empty"))]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "url_or_empty"))]
    pub github: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tech_stack: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub featured: Option<bool>,
}

// ============================================================================
// Blogs
// ============================================================================

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct AddBlog {
    #[serde(default)]
    #[validate(length(min = 1, message = "Title is required"))]
    pub title: String,
    /// Markdown body.
    #[serde(default)]
    #[validate(length(min = 1, message = "Description is required"))]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct UpdateBlog {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, message = "Title is required"))]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, message = "Description is required"))]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

// ============================================================================
// Contact messages
// ============================================================================

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct AddMessage {
    #[serde(default)]
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[serde(default)]
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "Message is required"))]
    pub message: String,
    /// Always starts unread; clients cannot set it on creation.
    #[serde(skip_deserializing)]
    pub status: MessageStatus,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct UpdateMessage {
    #[serde(default)]
    #[validate(custom(function = "message_status"))]
    pub status: String,
}

// ============================================================================
// Credentials
// ============================================================================

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SignUp {
    #[serde(default)]
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[serde(default)]
    #[validate(email(message = "Please provide a valid email address"))]
    pub email: String,
    #[serde(default)]
    #[validate(length(min = 8, message = "Password must be at least 8 characters long"))]
    pub password: String,
    #[serde(default)]
    #[validate(must_match(other = "password", message = "Passwords do not match"))]
    pub confirm_password: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct SignIn {
    #[serde(default)]
    #[validate(email(message = "Please provide a valid email address"))]
    pub email: String,
    #[serde(default)]
    #[validate(length(min = 6, message = "Password must be at least 6 characters long"))]
    pub password: String,
}

// ============================================================================
// Uploads
// ============================================================================

/// Optional pre-flight description of the file about to be uploaded.
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "allowed_image_type"))]
    pub file_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(max = MAX_UPLOAD_BYTES, message = "File size too large. Maximum size is 10MB"))]
    pub file_size: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_camel_case() {
        assert_eq!(camel_case("confirm_password"), "confirmPassword");
        assert_eq!(camel_case("tech_stack"), "techStack");
        assert_eq!(camel_case("title"), "title");
    }

    #[test]
    fn test_add_project_defaults() {
        let project: AddProject = parse(json!({ "name": "Demo", "description": "x" })).unwrap();
        assert!(!project.featured);
        assert!(project.tech_stack.is_empty());
        assert!(project.url.is_none());
    }

    #[test]
    fn test_add_project_missing_name_is_keyed() {
        let errors = parse::<AddProject>(json!({ "description": "x" })).unwrap_err();
        assert_eq!(errors["name"], vec!["Project name is required".to_string()]);
        assert!(!errors.contains_key("description"));
    }

    #[test]
    fn test_project_url_accepts_empty_or_absolute() {
        assert!(parse::<AddProject>(
            json!({ "name": "a", "description": "b", "url": "", "github": "https://github.com/x/y" })
        )
        .is_ok());

        let errors = parse::<AddProject>(
            json!({ "name": "a", "description": "b", "url": "not a url" }),
        )
        .unwrap_err();
        assert!(errors.contains_key("url"));
    }

    #[test]
    fn test_update_project_rejects_empty_name_only_when_present() {
        assert!(parse::<UpdateProject>(json!({})).is_ok());
        assert!(parse::<UpdateProject>(json!({ "featured": true })).is_ok());
        let errors = parse::<UpdateProject>(json!({ "name": "" })).unwrap_err();
        assert!(errors.contains_key("name"));
    }

    #[test]
    fn test_update_project_serializes_only_supplied_fields() {
        let update: UpdateProject = parse(json!({ "name": "Demo2" })).unwrap();
        assert_eq!(serde_json::to_value(update).unwrap(), json!({ "name": "Demo2" }));
    }

    #[test]
    fn test_wrong_json_type_lands_under_payload() {
        let errors = parse::<AddProject>(
            json!({ "name": "a", "description": "b", "featured": "yes" }),
        )
        .unwrap_err();
        assert!(errors.contains_key("payload"));
    }

    #[test]
    fn test_add_blog_empty_title() {
        let errors = parse::<AddBlog>(json!({ "title": "", "description": "body" })).unwrap_err();
        assert!(errors.contains_key("title"));
    }

    #[test]
    fn test_sign_up_password_mismatch_on_confirmation() {
        let errors = parse::<SignUp>(json!({
            "name": "Admin",
            "email": "admin@example.com",
            "password": "password123",
            "confirmPassword": "password124",
        }))
        .unwrap_err();
        assert_eq!(errors["confirmPassword"], vec!["Passwords do not match".to_string()]);
        assert!(!errors.contains_key("password"));
    }

    #[test]
    fn test_sign_up_short_password() {
        let errors = parse::<SignUp>(json!({
            "name": "Admin",
            "email": "admin@example.com",
            "password": "short",
            "confirmPassword": "short",
        }))
        .unwrap_err();
        assert!(errors.contains_key("password"));
    }

    #[test]
    fn test_sign_in_rules() {
        assert!(parse::<SignIn>(json!({ "email": "a@b.co", "password": "123456" })).is_ok());
        let errors = parse::<SignIn>(json!({ "email": "nope", "password": "12345" })).unwrap_err();
        assert!(errors.contains_key("email"));
        assert!(errors.contains_key("password"));
    }

    #[test]
    fn test_add_message_starts_unread_even_if_client_says_read() {
        let msg: AddMessage = parse(json!({
            "name": "Visitor",
            "email": "visitor@example.com",
            "message": "Hello",
            "status": "read",
        }))
        .unwrap();
        assert_eq!(msg.status, MessageStatus::Unread);
    }

    #[test]
    fn test_update_message_status_values() {
        assert!(parse::<UpdateMessage>(json!({ "status": "read" })).is_ok());
        let errors = parse::<UpdateMessage>(json!({ "status": "archived" })).unwrap_err();
        assert!(errors.contains_key("status"));
    }

    #[test]
    fn test_upload_request_policy() {
        assert!(parse::<UploadRequest>(json!({ "fileType": "image/webp", "fileSize": 1024 })).is_ok());
        let errors = parse::<UploadRequest>(json!({
            "fileType": "application/pdf",
            "fileSize": MAX_UPLOAD_BYTES + 1,
        }))
        .unwrap_err();
        assert!(errors.contains_key("fileType"));
        assert!(errors.contains_key("fileSize"));
    }
}
