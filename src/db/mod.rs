pub mod memory;
pub mod models;
pub mod postgres;
pub mod store;

use std::ops::Deref;
use std::sync::Arc;

use memory::MemoryStore;
use postgres::PgStore;
use store::DocumentStore;

use crate::error::StoreError;

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost/portfolio".to_string()),
            max_connections: std::env::var("DB_POOL_MAX")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            min_connections: std::env::var("DB_POOL_MIN")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
            connect_timeout_secs: std::env::var("DB_CONNECT_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            idle_timeout_secs: std::env::var("DB_IDLE_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(300),
        }
    }
}

/// The process-wide database handle. Built once at startup and cloned into
/// whatever needs it; clones share the same underlying pool or store.
#[derive(Clone)]
pub struct Database {
    store: Arc<dyn DocumentStore>,
}

impl Database {
    pub fn new(store: impl DocumentStore) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryStore::new())
    }

    pub async fn connect(config: Option<DbConfig>) -> Result<Self, StoreError> {
        let config = config.unwrap_or_default();
        Ok(Self::new(PgStore::connect(&config).await?))
    }

    /// Create every collection and its indexes if missing.
    pub async fn bootstrap(&self) -> Result<(), StoreError> {
        tracing::info!(backend = self.store.backend(), "Preparing collections...");
        for spec in &models::ALL_COLLECTIONS {
            self.store.ensure_collection(spec).await?;
        }
        tracing::info!("Collections ready");
        Ok(())
    }

    pub async fn health_check(&self) -> Result<std::time::Duration, StoreError> {
        let start = std::time::Instant::now();
        self.store.ping().await?;
        Ok(start.elapsed())
    }

    pub fn ensure_connected(&self) -> Result<(), StoreError> {
        if self.store.is_open() {
            Ok(())
        } else {
            Err(StoreError::Closed)
        }
    }
}

impl Deref for Database {
    type Target = dyn DocumentStore;

    fn deref(&self) -> &Self::Target {
        self.store.as_ref()
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("backend", &self.store.backend())
            .finish()
    }
}
