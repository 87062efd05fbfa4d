//! In-process document store used when no `DATABASE_URL` is configured and in tests.
//!
//! Transactions stage their writes locally and apply them in one step under
//! the write lock at commit, so readers never observe a half-applied unit.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::store::{CollectionSpec, Document, DocumentStore, StoreTransaction};
use crate::error::StoreError;

#[derive(Debug, Default)]
struct Collection {
    unique: Vec<&'static str>,
    singleton: bool,
    /// Document plus its insertion sequence, used to break `created_at` ties.
    docs: HashMap<Uuid, (u64, Document)>,
}

impl Collection {
    fn check_unique(&self, name: &str, doc: &Document) -> Result<(), StoreError> {
        if self.singleton && self.docs.keys().any(|id| *id != doc.id) {
            return Err(StoreError::Duplicate {
                collection: name.to_string(),
                field: "singleton".to_string(),
            });
        }
        for field in &self.unique {
            let Some(value) = doc.body.get(*field) else {
                continue;
            };
            let clash = self
                .docs
                .values()
                .any(|(_, other)| other.id != doc.id && other.body.get(*field) == Some(value));
            if clash {
                return Err(StoreError::Duplicate {
                    collection: name.to_string(),
                    field: field.to_string(),
                });
            }
        }
        Ok(())
    }
}

type Collections = Arc<RwLock<HashMap<String, Collection>>>;

#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: Collections,
    sequence: Arc<AtomicU64>,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    async fn ensure_collection(&self, spec: &CollectionSpec) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        let collection = collections.entry(spec.name.to_string()).or_default();
        collection.unique = spec.unique.to_vec();
        collection.singleton = spec.singleton;
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        if self.is_open() {
            Ok(())
        } else {
            Err(StoreError::Closed)
        }
    }

    async fn find_all(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        let collections = self.collections.read().await;
        let coll = collections
            .get(collection)
            .ok_or_else(|| StoreError::UnknownCollection(collection.to_string()))?;

        let mut docs: Vec<&(u64, Document)> = coll.docs.values().collect();
        docs.sort_by(|(seq_a, a), (seq_b, b)| {
            b.created_at.cmp(&a.created_at).then(seq_b.cmp(seq_a))
        });
        Ok(docs.into_iter().map(|(_, doc)| doc.clone()).collect())
    }

    async fn find_by_id(&self, collection: &str, id: Uuid) -> Result<Option<Document>, StoreError> {
        let collections = self.collections.read().await;
        let coll = collections
            .get(collection)
            .ok_or_else(|| StoreError::UnknownCollection(collection.to_string()))?;
        Ok(coll.docs.get(&id).map(|(_, doc)| doc.clone()))
    }

    async fn find_one_by(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Option<Document>, StoreError> {
        let collections = self.collections.read().await;
        let coll = collections
            .get(collection)
            .ok_or_else(|| StoreError::UnknownCollection(collection.to_string()))?;
        Ok(coll
            .docs
            .values()
            .find(|(_, doc)| doc.body.get(field).and_then(Value::as_str) == Some(value))
            .map(|(_, doc)| doc.clone()))
    }

    async fn count(&self, collection: &str) -> Result<u64, StoreError> {
        let collections = self.collections.read().await;
        let coll = collections
            .get(collection)
            .ok_or_else(|| StoreError::UnknownCollection(collection.to_string()))?;
        Ok(coll.docs.len() as u64)
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        if !self.is_open() {
            return Err(StoreError::Closed);
        }
        Ok(Box::new(MemoryTransaction {
            collections: Arc::clone(&self.collections),
            sequence: Arc::clone(&self.sequence),
            staged: Vec::new(),
            overlay: HashMap::new(),
        }))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

#[derive(Debug)]
enum Staged {
    Insert(String, Document),
    Merge(String, Document, Map<String, Value>),
    Delete(String, Uuid),
}

pub struct MemoryTransaction {
    collections: Collections,
    sequence: Arc<AtomicU64>,
    staged: Vec<Staged>,
    /// This transaction's view of documents it touched; `None` = deleted.
    overlay: HashMap<(String, Uuid), Option<Document>>,
}

impl MemoryTransaction {
    async fn current(&self, collection: &str, id: Uuid) -> Result<Option<Document>, StoreError> {
        if let Some(doc) = self.overlay.get(&(collection.to_string(), id)) {
            return Ok(doc.clone());
        }
        let collections = self.collections.read().await;
        let coll = collections
            .get(collection)
            .ok_or_else(|| StoreError::UnknownCollection(collection.to_string()))?;
        Ok(coll.docs.get(&id).map(|(_, doc)| doc.clone()))
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn insert(
        &mut self,
        collection: &str,
        body: Map<String, Value>,
    ) -> Result<Document, StoreError> {
        let now = Utc::now();
        let doc = Document {
            id: Uuid::new_v4(),
            body,
            created_at: now,
            updated_at: now,
        };

        {
            let collections = self.collections.read().await;
            let coll = collections
                .get(collection)
                .ok_or_else(|| StoreError::UnknownCollection(collection.to_string()))?;
            coll.check_unique(collection, &doc)?;
        }

        self.overlay
            .insert((collection.to_string(), doc.id), Some(doc.clone()));
        self.staged.push(Staged::Insert(collection.to_string(), doc.clone()));
        Ok(doc)
    }

    async fn merge(
        &mut self,
        collection: &str,
        id: Uuid,
        patch: Map<String, Value>,
    ) -> Result<Option<Document>, StoreError> {
        let Some(mut doc) = self.current(collection, id).await? else {
            return Ok(None);
        };
        doc.body.extend(patch.clone());
        doc.updated_at = Utc::now();

        self.overlay
            .insert((collection.to_string(), id), Some(doc.clone()));
        self.staged
            .push(Staged::Merge(collection.to_string(), doc.clone(), patch));
        Ok(Some(doc))
    }

    async fn delete(&mut self, collection: &str, id: Uuid) -> Result<bool, StoreError> {
        if self.current(collection, id).await?.is_none() {
            return Ok(false);
        }
        self.overlay.insert((collection.to_string(), id), None);
        self.staged.push(Staged::Delete(collection.to_string(), id));
        Ok(true)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTransaction {
            collections,
            sequence,
            staged,
            ..
        } = *self;
        let mut collections = collections.write().await;

        // Validate everything before touching anything so a failed commit applies nothing.
        for op in &staged {
            if let Staged::Insert(name, doc) = op {
                let coll = collections
                    .get(name)
                    .ok_or_else(|| StoreError::UnknownCollection(name.clone()))?;
                coll.check_unique(name, doc)?;
            }
        }

        for op in staged {
            match op {
                Staged::Insert(name, doc) => {
                    let seq = sequence.fetch_add(1, Ordering::Relaxed);
                    if let Some(coll) = collections.get_mut(&name) {
                        coll.docs.insert(doc.id, (seq, doc));
                    }
                }
                Staged::Merge(name, staged_doc, patch) => {
                    // Last write wins; a document deleted concurrently stays deleted.
                    if let Some((_, stored)) = collections
                        .get_mut(&name)
                        .and_then(|coll| coll.docs.get_mut(&staged_doc.id))
                    {
                        stored.body.extend(patch);
                        stored.updated_at = staged_doc.updated_at;
                    }
                }
                Staged::Delete(name, id) => {
                    if let Some(coll) = collections.get_mut(&name) {
                        coll.docs.remove(&id);
                    }
                }
            }
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
