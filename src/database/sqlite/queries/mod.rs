
use super::models::*;
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

/// Predicate matching records with no usable vector (absent or zero-length)
const MISSING_EMBEDDING: &str = "(embedding IS NULL OR length(embedding) = 0)";

pub struct RecordQueries;

impl RecordQueries {
    fn select_sql(kind: EntityKind) -> String {
        let (heading, body, extra) = kind.text_columns();
        format!(
            "SELECT id, business_unit_id, category, {} AS heading, {} AS body, {} AS extra, \
             embedding, embedding_model, embedded_at, created_at FROM {}",
            heading,
            body,
            extra.unwrap_or("NULL"),
            kind.table_name()
        )
    }

    #[inline]
    pub async fn create(pool: &SqlitePool, new_record: NewRecord) -> Result<KnowledgeRecord> {
        let kind = new_record.content.kind();
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let (heading_column, body_column, extra_column) = kind.text_columns();
        let (heading, body, extra) = new_record.content.column_values();

        let mut columns = vec!["id", "business_unit_id", "category", heading_column, body_column];
        if let Some(extra_column) = extra_column {
            columns.push(extra_column);
        }
        columns.push("created_at");
        let placeholders = vec!["?"; columns.len()].join(", ");

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            kind.table_name(),
            columns.join(", "),
            placeholders
        );

        let mut query = sqlx::query(&sql)
            .bind(&id)
            .bind(&new_record.business_unit_id)
            .bind(&new_record.category)
            .bind(heading)
            .bind(body);
        if extra_column.is_some() {
            query = query.bind(extra);
        }

        query
            .bind(now)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to create {} record", kind))?;

        debug!("Created {} record {}", kind, id);

        Self::get_by_id(pool, kind, &id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created record"))
    }

    #[inline]
    pub async fn get_by_id(
        pool: &SqlitePool,
        kind: EntityKind,
        id: &str,
    ) -> Result<Option<KnowledgeRecord>> {
        let sql = format!("{} WHERE id = ?", Self::select_sql(kind));

        let row = sqlx::query_as::<_, RecordRow>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await
            .with_context(|| format!("Failed to get {} record by id", kind))?;

        row.map(|row| row.into_record(kind)).transpose()
    }

    /// Records of a tenant that still need an embedding, oldest first
    #[inline]
    pub async fn list_unembedded(
        pool: &SqlitePool,
        kind: EntityKind,
        business_unit_id: &str,
    ) -> Result<Vec<KnowledgeRecord>> {
        let sql = format!(
            "{} WHERE business_unit_id = ? AND {} ORDER BY created_at ASC, rowid ASC",
            Self::select_sql(kind),
            MISSING_EMBEDDING
        );

        let rows = sqlx::query_as::<_, RecordRow>(&sql)
            .bind(business_unit_id)
            .fetch_all(pool)
            .await
            .with_context(|| format!("Failed to list unembedded {} records", kind))?;

        rows.into_iter().map(|row| row.into_record(kind)).collect()
    }

    /// Records of a tenant embedded with `model`
    #[inline]
    pub async fn list_embedded(
        pool: &SqlitePool,
        kind: EntityKind,
        business_unit_id: &str,
        model: &str,
    ) -> Result<Vec<KnowledgeRecord>> {
        let sql = format!(
            "{} WHERE business_unit_id = ? AND embedding_model = ? AND length(embedding) > 0 \
             ORDER BY created_at ASC, rowid ASC",
            Self::select_sql(kind)
        );

        let rows = sqlx::query_as::<_, RecordRow>(&sql)
            .bind(business_unit_id)
            .bind(model)
            .fetch_all(pool)
            .await
            .with_context(|| format!("Failed to list embedded {} records", kind))?;

        rows.into_iter().map(|row| row.into_record(kind)).collect()
    }

    /// Write vector, model and timestamp in one statement. Returns whether a row matched.
    #[inline]
    pub async fn update_embedding(
        pool: &SqlitePool,
        kind: EntityKind,
        id: &str,
        embedding: &RecordEmbedding,
    ) -> Result<bool> {
        let sql = format!(
            "UPDATE {} SET embedding = ?, embedding_model = ?, embedded_at = ? WHERE id = ?",
            kind.table_name()
        );

        let result = sqlx::query(&sql)
            .bind(vector_to_blob(&embedding.vector))
            .bind(&embedding.model)
            .bind(embedding.embedded_at)
            .bind(id)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to update embedding of {} record {}", kind, id))?;

        Ok(result.rows_affected() > 0)
    }

    /// Remove all embedding metadata so the record becomes a backfill candidate again
    #[inline]
    pub async fn clear_embedding(pool: &SqlitePool, kind: EntityKind, id: &str) -> Result<bool> {
        let sql = format!(
            "UPDATE {} SET embedding = NULL, embedding_model = NULL, embedded_at = NULL WHERE id = ?",
            kind.table_name()
        );

        let result = sqlx::query(&sql)
            .bind(id)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to clear embedding of {} record {}", kind, id))?;

        Ok(result.rows_affected() > 0)
    }

    #[inline]
    pub async fn count_by_status(
        pool: &SqlitePool,
        kind: EntityKind,
        business_unit_id: &str,
    ) -> Result<EmbeddingCounts> {
        let sql = format!(
            "SELECT COALESCE(SUM(CASE WHEN {} THEN 0 ELSE 1 END), 0) AS embedded, \
                    COALESCE(SUM(CASE WHEN {} THEN 1 ELSE 0 END), 0) AS pending \
             FROM {} WHERE business_unit_id = ?",
            MISSING_EMBEDDING,
            MISSING_EMBEDDING,
            kind.table_name()
        );

        let (embedded, pending): (i64, i64) = sqlx::query_as(&sql)
            .bind(business_unit_id)
            .fetch_one(pool)
            .await
            .with_context(|| format!("Failed to count {} records", kind))?;

        Ok(EmbeddingCounts { embedded, pending })
    }
}
