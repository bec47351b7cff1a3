// Database module
// The record store boundary and its SQLite implementation

pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

pub use sqlite::*;

/// Access to knowledge records, per entity table.
///
/// Implementations must offer read-your-writes consistency: a record written with
/// [`RecordStore::store_embedding`] is visible to the next [`RecordStore::get_record`].
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Records of `business_unit_id` whose embedding is absent or empty
    async fn scan_unembedded(
        &self,
        kind: EntityKind,
        business_unit_id: &str,
    ) -> Result<Vec<KnowledgeRecord>>;

    async fn get_record(&self, kind: EntityKind, id: &str) -> Result<Option<KnowledgeRecord>>;

    /// Set `embedding`, `embedding_model` and `embedded_at` on one record; nothing else changes
    async fn store_embedding(
        &self,
        kind: EntityKind,
        id: &str,
        embedding: &RecordEmbedding,
    ) -> Result<()>;

    /// Records of `business_unit_id` carrying a non-empty vector produced by `model`
    async fn list_embedded(
        &self,
        kind: EntityKind,
        business_unit_id: &str,
        model: &str,
    ) -> Result<Vec<KnowledgeRecord>>;
}
