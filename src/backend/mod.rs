use crate::error::AppResult;
use async_trait::async_trait;

pub mod database;

/// Supported database backend types
#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseType {
    SQLite,
}

/// Lifecycle of a storage backend
///
/// Resource persistors run on a connection or transaction borrowed from the
/// backend; the backend itself only owns the pool and the schema.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Connect and initialize the storage backend
    async fn connect(config: &database::DatabaseBackendConfig) -> AppResult<Self>
    where
        Self: Sized;

    /// Check if the storage backend is healthy and accessible
    async fn health_check(&self) -> AppResult<()>;

    /// Create the PBX tables and seed the lookup tables
    async fn init_schema(&self) -> AppResult<()>;

    /// Clean up resources when storage is no longer needed
    async fn cleanup(&self) -> AppResult<()> {
        Ok(())
    }
}

pub use database::SqliteBackend;
