//! PostgreSQL backend: one table per collection, documents stored as JSONB.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::{postgres::PgPoolOptions, types::Json, FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::store::{CollectionSpec, Document, DocumentStore, StoreTransaction};
use super::DbConfig;
use crate::error::StoreError;

#[derive(Debug, FromRow)]
struct DocumentRow {
    id: Uuid,
    doc: Json<Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<DocumentRow> for Document {
    fn from(row: DocumentRow) -> Self {
        let body = match row.doc.0 {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Document {
            id: row.id,
            body,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Collection names are interpolated into SQL, so only `[a-z_]` is allowed.
fn table(collection: &str) -> Result<&str, StoreError> {
    if !collection.is_empty() && collection.chars().all(|c| c.is_ascii_lowercase() || c == '_') {
        Ok(collection)
    } else {
        Err(StoreError::UnknownCollection(collection.to_string()))
    }
}

/// Translate a unique-index violation (`23505` on `uq_<collection>_<field>`).
fn map_write_error(collection: &str, err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            let prefix = format!("uq_{collection}_");
            let field = db_err
                .constraint()
                .and_then(|c| c.strip_prefix(&prefix))
                .unwrap_or("unknown")
                .to_string();
            return StoreError::Duplicate {
                collection: collection.to_string(),
                field,
            };
        }
    }
    StoreError::Database(err)
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(config: &DbConfig) -> Result<Self, StoreError> {
        tracing::info!("Initializing database connection pool...");
        tracing::debug!(
            "Database URL: {}",
            config.url.replace(
                |c: char| !c.is_ascii_alphanumeric() && c != ':' && c != '/' && c != '@' && c != '.',
                "*"
            )
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(std::time::Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(std::time::Duration::from_secs(config.idle_timeout_secs))
            .max_lifetime(std::time::Duration::from_secs(1800))
            .test_before_acquire(true)
            .connect(&config.url)
            .await?;

        sqlx::query("SELECT 1").fetch_one(&pool).await?;

        tracing::info!("Database connection pool initialized successfully");
        Ok(Self { pool })
    }
}

#[async_trait]
impl DocumentStore for PgStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    fn is_open(&self) -> bool {
        !self.pool.is_closed()
    }

    async fn ensure_collection(&self, spec: &CollectionSpec) -> Result<(), StoreError> {
        let name = table(spec.name)?;

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {name} (
                id UUID PRIMARY KEY,
                doc JSONB NOT NULL DEFAULT '{{}}'::jsonb,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{name}_created_at ON {name}(created_at DESC)"
        ))
        .execute(&self.pool)
        .await?;

        for field in spec.unique {
            let field = table(field)?;
            sqlx::query(&format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS uq_{name}_{field} ON {name} ((doc->>'{field}'))"
            ))
            .execute(&self.pool)
            .await?;
        }

        if spec.singleton {
            // Every row indexes the same key, so a second row violates it.
            sqlx::query(&format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS uq_{name}_singleton ON {name} ((true))"
            ))
            .execute(&self.pool)
            .await?;
        }

        tracing::debug!(collection = name, "collection ready");
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }

    async fn find_all(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        let name = table(collection)?;
        let rows = sqlx::query_as::<_, DocumentRow>(&format!(
            "SELECT id, doc, created_at, updated_at FROM {name} ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Document::from).collect())
    }

    async fn find_by_id(&self, collection: &str, id: Uuid) -> Result<Option<Document>, StoreError> {
        let name = table(collection)?;
        let row = sqlx::query_as::<_, DocumentRow>(&format!(
            "SELECT id, doc, created_at, updated_at FROM {name} WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Document::from))
    }

    async fn find_one_by(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Option<Document>, StoreError> {
        let name = table(collection)?;
        let row = sqlx::query_as::<_, DocumentRow>(&format!(
            "SELECT id, doc, created_at, updated_at FROM {name} WHERE doc->>$1 = $2 LIMIT 1"
        ))
        .bind(field)
        .bind(value)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Document::from))
    }

    async fn count(&self, collection: &str) -> Result<u64, StoreError> {
        let name = table(collection)?;
        let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {name}"))
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTransaction { tx }))
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Wraps a `sqlx` transaction, which rolls back on drop if never committed.
pub struct PgTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PgTransaction {
    async fn insert(
        &mut self,
        collection: &str,
        body: Map<String, Value>,
    ) -> Result<Document, StoreError> {
        let name = table(collection)?;
        let row = sqlx::query_as::<_, DocumentRow>(&format!(
            r#"
            INSERT INTO {name} (id, doc, created_at, updated_at)
            VALUES ($1, $2, now(), now())
            RETURNING id, doc, created_at, updated_at
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(Json(Value::Object(body)))
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_write_error(name, e))?;
        Ok(row.into())
    }

    async fn merge(
        &mut self,
        collection: &str,
        id: Uuid,
        patch: Map<String, Value>,
    ) -> Result<Option<Document>, StoreError> {
        let name = table(collection)?;
        let row = sqlx::query_as::<_, DocumentRow>(&format!(
            r#"
            UPDATE {name}
            SET doc = doc || $2, updated_at = now()
            WHERE id = $1
            RETURNING id, doc, created_at, updated_at
            "#
        ))
        .bind(id)
        .bind(Json(Value::Object(patch)))
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_write_error(name, e))?;
        Ok(row.map(Document::from))
    }

    async fn delete(&mut self, collection: &str, id: Uuid) -> Result<bool, StoreError> {
        let name = table(collection)?;
        let result = sqlx::query(&format!("DELETE FROM {name} WHERE id = $1"))
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
