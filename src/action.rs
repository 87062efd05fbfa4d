//! Action gateway: the funnel every repository and auth operation passes through.
//!
//! Order is fixed: authorize, validate, confirm the database handle is usable.

use serde_json::Value;

use crate::auth::UserIdentity;
use crate::db::Database;
use crate::error::{AppError, AppResult};
use crate::validation::{self, Schema};

/// Params as they arrived: a JSON value, or why the request input could not be read.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Json(Value),
    Malformed(String),
}

impl From<Value> for Input {
    fn from(value: Value) -> Self {
        Input::Json(value)
    }
}

impl Input {
    /// Unreadable input becomes a validation failure under `payload`.
    fn into_value(self) -> AppResult<Value> {
        match self {
            Input::Json(value) => Ok(value),
            Input::Malformed(reason) => Err(AppError::field("payload", reason)),
        }
    }
}

/// One request to the gateway.
#[derive(Debug, Default)]
pub struct Action<'a> {
    params: Option<Input>,
    authorize: bool,
    caller: Option<&'a UserIdentity>,
}

impl<'a> Action<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn params(mut self, params: impl Into<Input>) -> Self {
        self.params = Some(params.into());
        self
    }

    /// Require an authenticated admin caller.
    pub fn authorize(mut self, caller: Option<&'a UserIdentity>) -> Self {
        self.authorize = true;
        self.caller = caller;
        self
    }
}

/// What the gateway hands back once an action is allowed to proceed.
#[derive(Debug)]
pub struct Validated<T> {
    pub params: Option<T>,
    pub caller: Option<UserIdentity>,
}

impl<T> Validated<T> {
    /// The params, or a validation error if the action carried none.
    pub fn require(self) -> AppResult<T> {
        self.params
            .ok_or_else(|| AppError::field("payload", "Payload is required"))
    }
}

#[derive(Debug, Clone)]
pub struct ActionGateway {
    db: Database,
}

impl ActionGateway {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Authorize, validate params against `S`, and check the connection.
    pub async fn run<S: Schema>(&self, action: Action<'_>) -> AppResult<Validated<S>> {
        let caller = Self::check_caller(&action)?;

        let params = match action.params {
            Some(input) => {
                let value = input.into_value()?;
                Some(validation::parse::<S>(value).map_err(AppError::Validation)?)
            }
            None => None,
        };

        self.db.ensure_connected()?;
        Ok(Validated { params, caller })
    }

    /// Same as [`run`](Self::run) without a schema; params pass through untouched.
    pub async fn run_unvalidated(&self, action: Action<'_>) -> AppResult<Validated<Value>> {
        let caller = Self::check_caller(&action)?;
        let params = action.params.map(Input::into_value).transpose()?;
        self.db.ensure_connected()?;
        Ok(Validated { params, caller })
    }

    fn check_caller(action: &Action<'_>) -> AppResult<Option<UserIdentity>> {
        match action.caller {
            Some(caller) if caller.is_admin() => Ok(Some(caller.clone())),
            _ if action.authorize => {
                tracing::warn!("rejected unauthorized action");
                Err(AppError::Unauthorized)
            }
            other => Ok(other.cloned()),
        }
    }
}
