/**
 * Routes Module
 * API route handlers
 */

pub mod auth;
pub mod health;
pub mod records;
pub mod upload;

use std::convert::Infallible;

use axum::{
    extract::{FromRequest, Request},
    Json,
};
use serde_json::Value;

use crate::action::Input;

/// A JSON request body handed to the gateway as-is.
///
/// Unlike `Json`, a malformed or missing body never rejects the request. The
/// reason travels with the action, and the gateway reports it as a `payload`
/// validation failure once the caller has been authorized.
#[derive(Debug)]
pub struct Payload(pub Input);

impl<S> FromRequest<S> for Payload
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<Value>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Payload(Input::Json(value))),
            Err(rejection) => {
                tracing::debug!("Rejected request body: {}", rejection.body_text());
                Ok(Payload(Input::Malformed(rejection.body_text())))
            }
        }
    }
}
