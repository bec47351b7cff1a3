#[cfg(test)]
mod tests;

use anyhow::{Result, anyhow, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

/// The five tables holding embeddable knowledge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    KnowledgeBase,
    Guideline,
    TrainingData,
    Faq,
    CannedMessage,
}

impl EntityKind {
    /// Order in which a backfill visits the tables. Fixed so logs are reproducible.
    pub const BACKFILL_ORDER: [EntityKind; 5] = [
        EntityKind::KnowledgeBase,
        EntityKind::Guideline,
        EntityKind::TrainingData,
        EntityKind::Faq,
        EntityKind::CannedMessage,
    ];

    #[inline]
    pub fn table_name(self) -> &'static str {
        match self {
            EntityKind::KnowledgeBase => "knowledge_base",
            EntityKind::Guideline => "guidelines",
            EntityKind::TrainingData => "training_data",
            EntityKind::Faq => "faq_library",
            EntityKind::CannedMessage => "canned_messages",
        }
    }

    /// Human readable plural used in reports
    #[inline]
    pub fn label(self) -> &'static str {
        match self {
            EntityKind::KnowledgeBase => "Knowledge Base",
            EntityKind::Guideline => "Guidelines",
            EntityKind::TrainingData => "Training Data",
            EntityKind::Faq => "FAQs",
            EntityKind::CannedMessage => "Canned Messages",
        }
    }

    /// Columns backing the (optional heading, body, optional extra) text slots
    pub(crate) fn text_columns(self) -> (&'static str, &'static str, Option<&'static str>) {
        match self {
            EntityKind::KnowledgeBase => ("topic", "content", None),
            EntityKind::Guideline => ("title", "content", None),
            EntityKind::TrainingData => ("question", "answer", None),
            EntityKind::Faq => ("question", "answer", Some("short_answer")),
            EntityKind::CannedMessage => ("title", "message", None),
        }
    }

    fn slug(self) -> &'static str {
        match self {
            EntityKind::KnowledgeBase => "knowledge",
            EntityKind::Guideline => "guideline",
            EntityKind::TrainingData => "training",
            EntityKind::Faq => "faq",
            EntityKind::CannedMessage => "canned",
        }
    }
}

impl fmt::Display for EntityKind {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "knowledge" | "knowledge_base" | "kb" => Ok(EntityKind::KnowledgeBase),
            "guideline" | "guidelines" => Ok(EntityKind::Guideline),
            "training" | "training_data" => Ok(EntityKind::TrainingData),
            "faq" | "faqs" | "faq_library" => Ok(EntityKind::Faq),
            "canned" | "canned_message" | "canned_messages" => Ok(EntityKind::CannedMessage),
            other => Err(format!(
                "unknown record kind '{}' (expected knowledge, guideline, training, faq or canned)",
                other
            )),
        }
    }
}

/// Type-specific text of a knowledge record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordContent {
    KnowledgeBase {
        topic: Option<String>,
        content: String,
    },
    Guideline {
        title: String,
        content: String,
    },
    TrainingData {
        question: String,
        answer: String,
    },
    Faq {
        question: String,
        answer: String,
        /// Shown to shoppers as-is; not part of the embedded text
        short_answer: Option<String>,
    },
    CannedMessage {
        title: Option<String>,
        message: String,
    },
}

impl RecordContent {
    #[inline]
    pub fn kind(&self) -> EntityKind {
        match self {
            RecordContent::KnowledgeBase { .. } => EntityKind::KnowledgeBase,
            RecordContent::Guideline { .. } => EntityKind::Guideline,
            RecordContent::TrainingData { .. } => EntityKind::TrainingData,
            RecordContent::Faq { .. } => EntityKind::Faq,
            RecordContent::CannedMessage { .. } => EntityKind::CannedMessage,
        }
    }

    /// Values for the columns named by [`EntityKind::text_columns`]
    pub(crate) fn column_values(&self) -> (Option<&str>, &str, Option<&str>) {
        match self {
            RecordContent::KnowledgeBase { topic, content } => (topic.as_deref(), content, None),
            RecordContent::Guideline { title, content } => (Some(title), content, None),
            RecordContent::TrainingData { question, answer } => (Some(question), answer, None),
            RecordContent::Faq {
                question,
                answer,
                short_answer,
            } => (Some(question), answer, short_answer.as_deref()),
            RecordContent::CannedMessage { title, message } => (title.as_deref(), message, None),
        }
    }
}

/// A vector together with the model that produced it and when.
///
/// The three values are only ever written and cleared together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordEmbedding {
    pub vector: Vec<f32>,
    pub model: String,
    pub embedded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeRecord {
    pub id: String,
    pub business_unit_id: String,
    pub category: Option<String>,
    pub content: RecordContent,
    pub embedding: Option<RecordEmbedding>,
    pub created_at: DateTime<Utc>,
}

impl KnowledgeRecord {
    #[inline]
    pub fn kind(&self) -> EntityKind {
        self.content.kind()
    }

    /// A record counts as embedded only when it carries a non-empty vector
    #[inline]
    pub fn is_embedded(&self) -> bool {
        self.embedding
            .as_ref()
            .is_some_and(|embedding| !embedding.vector.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRecord {
    pub business_unit_id: String,
    pub category: Option<String>,
    pub content: RecordContent,
}

/// Embedded vs. still-pending record counts for one table and tenant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingCounts {
    pub embedded: i64,
    pub pending: i64,
}

impl EmbeddingCounts {
    #[inline]
    pub fn total(&self) -> i64 {
        self.embedded + self.pending
    }
}

/// Row shape shared by every table; the text slots are aliased per table
#[derive(Debug, Clone, FromRow)]
pub(crate) struct RecordRow {
    pub id: String,
    pub business_unit_id: String,
    pub category: Option<String>,
    pub heading: Option<String>,
    pub body: String,
    pub extra: Option<String>,
    pub embedding: Option<Vec<u8>>,
    pub embedding_model: Option<String>,
    pub embedded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl RecordRow {
    pub(crate) fn into_record(self, kind: EntityKind) -> Result<KnowledgeRecord> {
        let id = self.id;
        let required_heading = |heading: Option<String>, column: &str| {
            heading.ok_or_else(|| anyhow!("{} record {} has no {}", kind, id, column))
        };

        let content = match kind {
            EntityKind::KnowledgeBase => RecordContent::KnowledgeBase {
                topic: self.heading,
                content: self.body,
            },
            EntityKind::Guideline => RecordContent::Guideline {
                title: required_heading(self.heading, "title")?,
                content: self.body,
            },
            EntityKind::TrainingData => RecordContent::TrainingData {
                question: required_heading(self.heading, "question")?,
                answer: self.body,
            },
            EntityKind::Faq => RecordContent::Faq {
                question: required_heading(self.heading, "question")?,
                answer: self.body,
                short_answer: self.extra,
            },
            EntityKind::CannedMessage => RecordContent::CannedMessage {
                title: self.heading,
                message: self.body,
            },
        };

        let embedding = match (self.embedding, self.embedding_model, self.embedded_at) {
            (Some(blob), Some(model), Some(embedded_at)) => Some(RecordEmbedding {
                vector: vector_from_blob(&blob)?,
                model,
                embedded_at,
            }),
            (None, None, None) => None,
            _ => bail!("{} record {} has partial embedding metadata", kind, id),
        };

        Ok(KnowledgeRecord {
            id,
            business_unit_id: self.business_unit_id,
            category: self.category,
            content,
            embedding,
            created_at: self.created_at,
        })
    }
}

/// Encode a vector as little-endian `f32` bytes
#[inline]
pub fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|value| value.to_le_bytes()).collect()
}

/// Decode a little-endian `f32` blob
#[inline]
pub fn vector_from_blob(blob: &[u8]) -> Result<Vec<f32>> {
    if blob.len() % 4 != 0 {
        bail!("Embedding blob length {} is not a multiple of 4", blob.len());
    }

    Ok(blob
        .chunks_exact(4)
        .map(|bytes| f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
        .collect())
}
