use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{ConnectOptions, Sqlite, SqlitePool, Transaction};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use super::config::DatabaseBackendConfig;
use crate::backend::Backend;
use crate::error::{AppError, AppResult};

/// SQLite database backend
///
/// In-memory databases live as long as their connection, so the pool keeps
/// exactly one connection and never recycles it.
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get the connection pool reference
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Start a transaction; dropping it without commit rolls back
    pub async fn begin(&self) -> AppResult<Transaction<'static, Sqlite>> {
        self.pool
            .begin()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))
    }

    pub async fn drop_schema(&self) -> AppResult<()> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| AppError::Database(format!("Failed to acquire connection: {}", e)))?;
        super::schema::drop_schema(&mut conn).await
    }
}

#[async_trait]
impl Backend for SqliteBackend {
    async fn connect(config: &DatabaseBackendConfig) -> AppResult<Self> {
        config
            .validate()
            .map_err(|e| AppError::Internal(format!("Invalid backend config: {}", e)))?;

        let mut options = SqliteConnectOptions::from_str(&config.sqlite_url())
            .map_err(|e| AppError::Configuration(format!("Invalid SQLite URL: {}", e)))?
            .foreign_keys(true)
            .create_if_missing(true)
            .disable_statement_logging();
        if let Some(mode) = config.get_option("journal_mode") {
            let mode = SqliteJournalMode::from_str(mode)
                .map_err(|e| AppError::Configuration(format!("Invalid journal mode: {}", e)))?;
            options = options.journal_mode(mode);
        }

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout));
        if config.is_memory_database() {
            pool_options = pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to SQLite: {}", e)))?;

        info!(url = %config.connection_url, "connected to SQLite");
        Ok(Self::new(pool))
    }

    async fn health_check(&self) -> AppResult<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Health check failed: {}", e)))?;

        Ok(())
    }

    async fn init_schema(&self) -> AppResult<()> {
        let mut tx = self.begin().await?;
        super::schema::init_schema(&mut tx).await?;
        tx.commit()
            .await
            .map_err(|e| AppError::Database(format!("Failed to commit schema: {}", e)))?;
        debug!("schema initialised");
        Ok(())
    }

    async fn cleanup(&self) -> AppResult<()> {
        self.pool.close().await;
        Ok(())
    }
}
