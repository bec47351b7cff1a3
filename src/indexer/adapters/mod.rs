// Entity adapters
// Per record type: which fields feed the embedding and where the vector is written back


use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::database::{EntityKind, KnowledgeRecord, RecordContent, RecordEmbedding, RecordStore};
use crate::embeddings::combine_fields;

/// Longest label, in characters, used to identify a record in logs
const LABEL_MAX_CHARS: usize = 50;

/// Fields that make up the embedded text of a record, in embedding order
#[inline]
pub fn fields_to_embed(record: &KnowledgeRecord) -> Vec<Option<&str>> {
    let category = record.category.as_deref();

    match &record.content {
        RecordContent::KnowledgeBase { topic, content } => {
            vec![category, topic.as_deref(), Some(content)]
        }
        RecordContent::Faq {
            question, answer, ..
        } => vec![category, Some(question), Some(answer)],
        RecordContent::CannedMessage { title, message } => {
            vec![category, title.as_deref(), Some(message)]
        }
        RecordContent::Guideline { title, content } => {
            vec![category, Some(title), Some(content)]
        }
        RecordContent::TrainingData { question, answer } => {
            vec![category, Some(question), Some(answer)]
        }
    }
}

/// Combined text sent to the embedding provider for `record`
#[inline]
pub fn build_embed_text(record: &KnowledgeRecord) -> String {
    combine_fields(&fields_to_embed(record))
}

/// Write a freshly computed vector back onto its record.
///
/// Only `embedding`, `embedding_model` and `embedded_at` change.
#[inline]
pub async fn persist(
    store: &dyn RecordStore,
    kind: EntityKind,
    id: &str,
    vector: Vec<f32>,
    model: &str,
    embedded_at: DateTime<Utc>,
) -> Result<()> {
    let embedding = RecordEmbedding {
        vector,
        model: model.to_string(),
        embedded_at,
    };

    store
        .store_embedding(kind, id, &embedding)
        .await
        .with_context(|| format!("Failed to persist embedding for {} record {}", kind, id))
}

/// Short human label for a record: its topic, title or question, else its id
#[inline]
pub fn display_label(record: &KnowledgeRecord) -> String {
    let heading = match &record.content {
        RecordContent::KnowledgeBase { topic, .. } => topic.as_deref(),
        RecordContent::Guideline { title, .. } => Some(title.as_str()),
        RecordContent::CannedMessage { title, .. } => title.as_deref(),
        RecordContent::Faq { question, .. } | RecordContent::TrainingData { question, .. } => {
            Some(question.as_str())
        }
    };

    heading
        .map(str::trim)
        .filter(|heading| !heading.is_empty())
        .map_or_else(
            || record.id.clone(),
            |heading| heading.chars().take(LABEL_MAX_CHARS).collect(),
        )
}
