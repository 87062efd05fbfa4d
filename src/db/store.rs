//! The document store seam shared by the Postgres and in-memory backends.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::StoreError;

/// A stored document: client fields plus system-assigned id and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: Uuid,
    pub body: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Flatten into the wire shape: body fields plus `_id`, `createdAt`, `updatedAt`.
    pub fn into_value(self) -> Value {
        let mut map = self.body;
        map.insert("_id".to_string(), Value::String(self.id.to_string()));
        map.insert(
            "createdAt".to_string(),
            Value::String(self.created_at.to_rfc3339()),
        );
        map.insert(
            "updatedAt".to_string(),
            Value::String(self.updated_at.to_rfc3339()),
        );
        Value::Object(map)
    }

    pub fn decode<T: DeserializeOwned>(self) -> Result<T, StoreError> {
        Ok(serde_json::from_value(self.into_value())?)
    }
}

/// Fields a client may never set; the store owns them.
pub const SYSTEM_FIELDS: &[&str] = &["_id", "id", "createdAt", "updatedAt"];

/// Serialize a payload into a document body, dropping system-managed fields.
pub fn to_body<T: serde::Serialize>(payload: &T) -> Result<Map<String, Value>, StoreError> {
    let mut body = match serde_json::to_value(payload)? {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    };
    for field in SYSTEM_FIELDS {
        body.remove(*field);
    }
    Ok(body)
}

/// Static description of a collection: its name and unique body fields.
#[derive(Debug, Clone, Copy)]
pub struct CollectionSpec {
    pub name: &'static str,
    pub unique: &'static [&'static str],
    /// At most one document may ever be stored.
    pub singleton: bool,
}

#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Short backend name for logs and health output.
    fn backend(&self) -> &'static str;

    fn is_open(&self) -> bool;

    /// Create the collection and its unique indexes if they do not exist.
    async fn ensure_collection(&self, spec: &CollectionSpec) -> Result<(), StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;

    /// All documents, newest first.
    async fn find_all(&self, collection: &str) -> Result<Vec<Document>, StoreError>;

    async fn find_by_id(&self, collection: &str, id: Uuid) -> Result<Option<Document>, StoreError>;

    /// First document whose string field `field` equals `value`.
    async fn find_one_by(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Option<Document>, StoreError>;

    async fn count(&self, collection: &str) -> Result<u64, StoreError>;

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError>;

    async fn close(&self);
}

/// A unit of atomic work. Dropping it without [`commit`](Self::commit)
/// discards everything it staged.
#[async_trait]
pub trait StoreTransaction: Send {
    async fn insert(
        &mut self,
        collection: &str,
        body: Map<String, Value>,
    ) -> Result<Document, StoreError>;

    /// Merge `patch` over the stored body. `None` when `id` does not exist.
    async fn merge(
        &mut self,
        collection: &str,
        id: Uuid,
        patch: Map<String, Value>,
    ) -> Result<Option<Document>, StoreError>;

    /// `false` when nothing was deleted.
    async fn delete(&mut self, collection: &str, id: Uuid) -> Result<bool, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
