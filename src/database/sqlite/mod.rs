use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{debug, info};

use crate::database::RecordStore;


pub mod models;
pub mod queries;

pub use models::{
    EmbeddingCounts, EntityKind, KnowledgeRecord, NewRecord, RecordContent, RecordEmbedding,
};
pub use queries::RecordQueries;

pub type DbPool = Pool<Sqlite>;

#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    #[inline]
    pub async fn new<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .context("Failed to create database connection pool")?;

        let database = Self { pool };
        database.run_migrations().await?;

        Ok(database)
    }

    #[inline]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    #[inline]
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("src/database/sqlite/migrations")
            .run(&self.pool)
            .await
            .context("Failed to run schema migration")?;

        debug!("Database migrations completed successfully");
        Ok(())
    }

    #[inline]
    pub async fn initialize_from_config_dir(config_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        Self::new(config_dir.join("records.db")).await
    }

    // Record operations
    #[inline]
    pub async fn insert_record(&self, record: NewRecord) -> Result<KnowledgeRecord> {
        RecordQueries::create(&self.pool, record).await
    }

    #[inline]
    pub async fn clear_embedding(&self, kind: EntityKind, id: &str) -> Result<bool> {
        RecordQueries::clear_embedding(&self.pool, kind, id).await
    }

    #[inline]
    pub async fn embedding_counts(
        &self,
        kind: EntityKind,
        business_unit_id: &str,
    ) -> Result<EmbeddingCounts> {
        RecordQueries::count_by_status(&self.pool, kind, business_unit_id).await
    }
}

#[async_trait]
impl RecordStore for Database {
    async fn scan_unembedded(
        &self,
        kind: EntityKind,
        business_unit_id: &str,
    ) -> Result<Vec<KnowledgeRecord>> {
        RecordQueries::list_unembedded(&self.pool, kind, business_unit_id).await
    }

    async fn get_record(&self, kind: EntityKind, id: &str) -> Result<Option<KnowledgeRecord>> {
        RecordQueries::get_by_id(&self.pool, kind, id).await
    }

    async fn store_embedding(
        &self,
        kind: EntityKind,
        id: &str,
        embedding: &RecordEmbedding,
    ) -> Result<()> {
        if !RecordQueries::update_embedding(&self.pool, kind, id, embedding).await? {
            bail!("{} record {} no longer exists", kind, id);
        }
        Ok(())
    }

    async fn list_embedded(
        &self,
        kind: EntityKind,
        business_unit_id: &str,
        model: &str,
    ) -> Result<Vec<KnowledgeRecord>> {
        RecordQueries::list_embedded(&self.pool, kind, business_unit_id, model).await
    }
}
