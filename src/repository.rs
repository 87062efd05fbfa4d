//! Generic CRUD over one document collection.
//!
//! Every write runs inside a store transaction owned by the operation. The
//! transaction is handed to [`finish`], which commits on success and rolls
//! back on failure, so no handle outlives the call.

use std::marker::PhantomData;

use serde::{de::DeserializeOwned, Serialize};
use uuid::Uuid;

use crate::action::{Action, ActionGateway, Input};
use crate::auth::UserIdentity;
use crate::db::models::{Blog, Message, Project, BLOGS, MESSAGES, PROJECTS};
use crate::db::store::{to_body, CollectionSpec, StoreTransaction};
use crate::error::{handle_error, AppError, AppResult};
use crate::response::ActionResponse;
use crate::validation::{
    AddBlog, AddMessage, AddProject, Schema, UpdateBlog, UpdateMessage, UpdateProject,
};

/// A record type served by [`Repository`].
pub trait Entity: DeserializeOwned + Serialize + Send + Sync + 'static {
    const COLLECTION: CollectionSpec;
    /// Human name used in not-found and invalid-id messages.
    const LABEL: &'static str;
    /// Whether reads are open to anonymous callers.
    const PUBLIC_READ: bool = true;
    /// Whether anonymous callers may create records.
    const PUBLIC_CREATE: bool = false;

    type Create: Schema + Serialize;
    type Update: Schema + Serialize;
}

impl Entity for Project {
    const COLLECTION: CollectionSpec = PROJECTS;
    const LABEL: &'static str = "Project";
    type Create = AddProject;
    type Update = UpdateProject;
}

impl Entity for Blog {
    const COLLECTION: CollectionSpec = BLOGS;
    const LABEL: &'static str = "Blog";
    type Create = AddBlog;
    type Update = UpdateBlog;
}

impl Entity for Message {
    const COLLECTION: CollectionSpec = MESSAGES;
    const LABEL: &'static str = "Message";
    const PUBLIC_READ: bool = false;
    const PUBLIC_CREATE: bool = true;
    type Create = AddMessage;
    type Update = UpdateMessage;
}

/// Commit when `outcome` succeeded, roll back otherwise. Consumes the transaction.
pub(crate) async fn finish<T>(
    tx: Box<dyn StoreTransaction>,
    outcome: AppResult<T>,
) -> AppResult<T> {
    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!(error = %rollback_err, "transaction rollback failed");
            }
            Err(err)
        }
    }
}

pub struct Repository<E> {
    gateway: ActionGateway,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Repository<E> {
    pub fn new(gateway: ActionGateway) -> Self {
        Self {
            gateway,
            _entity: PhantomData,
        }
    }

    fn collection(&self) -> &'static str {
        E::COLLECTION.name
    }

    fn parse_id(raw: &str) -> AppResult<Uuid> {
        Uuid::parse_str(raw.trim()).map_err(|_| {
            AppError::field("id", format!("Invalid {} ID", E::LABEL.to_lowercase()))
        })
    }

    fn read_action<'a>(caller: Option<&'a UserIdentity>) -> Action<'a> {
        if E::PUBLIC_READ {
            Action::new()
        } else {
            Action::new().authorize(caller)
        }
    }

    fn create_action(caller: Option<&UserIdentity>, params: Input) -> Action<'_> {
        let action = Action::new().params(params);
        if E::PUBLIC_CREATE {
            action
        } else {
            action.authorize(caller)
        }
    }

    pub async fn create(
        &self,
        caller: Option<&UserIdentity>,
        params: impl Into<Input>,
    ) -> ActionResponse<E> {
        match self.try_create(caller, params.into()).await {
            Ok(entity) => ActionResponse::created(entity),
            Err(err) => handle_error(err),
        }
    }

    async fn try_create(&self, caller: Option<&UserIdentity>, params: Input) -> AppResult<E> {
        let payload = self
            .gateway
            .run::<E::Create>(Self::create_action(caller, params))
            .await?
            .require()?;
        let body = to_body(&payload)?;

        let mut tx = self.gateway.database().begin().await?;
        let outcome = tx.insert(self.collection(), body).await.map_err(AppError::from);
        let doc = finish(tx, outcome).await?;

        tracing::info!(collection = self.collection(), id = %doc.id, "document created");
        Ok(doc.decode()?)
    }

    pub async fn find_all(&self, caller: Option<&UserIdentity>) -> ActionResponse<Vec<E>> {
        match self.try_find_all(caller).await {
            Ok(items) => ActionResponse::ok(items),
            Err(err) => handle_error(err),
        }
    }

    async fn try_find_all(&self, caller: Option<&UserIdentity>) -> AppResult<Vec<E>> {
        self.gateway.run_unvalidated(Self::read_action(caller)).await?;

        let docs = self.gateway.database().find_all(self.collection()).await?;
        docs.into_iter()
            .map(|doc| doc.decode().map_err(AppError::from))
            .collect()
    }

    pub async fn find_one(&self, caller: Option<&UserIdentity>, id: &str) -> ActionResponse<E> {
        match self.try_find_one(caller, id).await {
            Ok(entity) => ActionResponse::ok(entity),
            Err(err) => handle_error(err),
        }
    }

    async fn try_find_one(&self, caller: Option<&UserIdentity>, id: &str) -> AppResult<E> {
        self.gateway.run_unvalidated(Self::read_action(caller)).await?;
        let id = Self::parse_id(id)?;

        let doc = self
            .gateway
            .database()
            .find_by_id(self.collection(), id)
            .await?
            .ok_or(AppError::NotFound(E::LABEL))?;
        Ok(doc.decode()?)
    }

    pub async fn update(
        &self,
        caller: Option<&UserIdentity>,
        id: &str,
        params: impl Into<Input>,
    ) -> ActionResponse<E> {
        match self.try_update(caller, id, params.into()).await {
            Ok(entity) => ActionResponse::ok(entity),
            Err(err) => handle_error(err),
        }
    }

    async fn try_update(
        &self,
        caller: Option<&UserIdentity>,
        id: &str,
        params: Input,
    ) -> AppResult<E> {
        let patch = self
            .gateway
            .run::<E::Update>(Action::new().params(params).authorize(caller))
            .await?
            .require()?;
        let id = Self::parse_id(id)?;
        let patch = to_body(&patch)?;

        let mut tx = self.gateway.database().begin().await?;
        let outcome = match tx.merge(self.collection(), id, patch).await {
            Ok(Some(doc)) => Ok(doc),
            Ok(None) => Err(AppError::NotFound(E::LABEL)),
            Err(e) => Err(e.into()),
        };
        let doc = finish(tx, outcome).await?;

        tracing::info!(collection = self.collection(), id = %doc.id, "document updated");
        Ok(doc.decode()?)
    }

    pub async fn delete(&self, caller: Option<&UserIdentity>, id: &str) -> ActionResponse<()> {
        match self.try_delete(caller, id).await {
            Ok(()) => ActionResponse::empty(),
            Err(err) => handle_error(err),
        }
    }

    async fn try_delete(&self, caller: Option<&UserIdentity>, id: &str) -> AppResult<()> {
        self.gateway
            .run_unvalidated(Action::new().authorize(caller))
            .await?;
        let id = Self::parse_id(id)?;

        let mut tx = self.gateway.database().begin().await?;
        let outcome = match tx.delete(self.collection(), id).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(AppError::NotFound(E::LABEL)),
            Err(e) => Err(e.into()),
        };
        finish(tx, outcome).await?;

        tracing::info!(collection = self.collection(), %id, "document deleted");
        Ok(())
    }
}
