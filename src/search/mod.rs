// Semantic search over embedded knowledge records


use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::debug;

use crate::config::SearchConfig;
use crate::database::{EntityKind, KnowledgeRecord, RecordStore};
use crate::embeddings::{Embedder, cosine_similarity};
use crate::indexer::build_embed_text;

pub const DEFAULT_SEARCH_LIMIT: usize = 10;
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchOptions {
    /// Maximum number of results returned
    pub limit: usize,
    /// Minimum cosine similarity a record needs to be returned
    pub threshold: f32,
    /// Also return records whose text contains the query, whatever their similarity
    pub hybrid: bool,
}

impl Default for SearchOptions {
    #[inline]
    fn default() -> Self {
        Self {
            limit: DEFAULT_SEARCH_LIMIT,
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
            hybrid: false,
        }
    }
}

impl From<&SearchConfig> for SearchOptions {
    #[inline]
    fn from(config: &SearchConfig) -> Self {
        Self {
            limit: config.default_limit,
            threshold: config.default_threshold,
            hybrid: false,
        }
    }
}

/// Why a record made it into the results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    /// Similarity reached the threshold
    Vector,
    /// Only the query text matched, in hybrid mode
    Keyword,
}

impl fmt::Display for MatchType {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vector => write!(f, "vector"),
            Self::Keyword => write!(f, "keyword"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub record: KnowledgeRecord,
    pub similarity: f32,
    pub match_type: MatchType,
}

/// Ranks stored records against a query embedded with the same model
pub struct SemanticSearch {
    store: Arc<dyn RecordStore>,
    embedder: Arc<dyn Embedder>,
}

impl SemanticSearch {
    #[inline]
    pub fn new(store: Arc<dyn RecordStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self { store, embedder }
    }

    /// Most similar records of one kind for `business_unit_id`, best match first
    #[inline]
    pub async fn search(
        &self,
        business_unit_id: &str,
        kind: EntityKind,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SearchResult>> {
        let query_vector = self.embed_query(query).await?;
        let mut results = self
            .score_kind(business_unit_id, kind, query, &query_vector, options)
            .await?;
        rank(&mut results, options.limit);
        Ok(results)
    }

    /// Like [`SemanticSearch::search`] across every kind, merged into a single ranking
    #[inline]
    pub async fn search_all_kinds(
        &self,
        business_unit_id: &str,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SearchResult>> {
        let query_vector = self.embed_query(query).await?;

        let mut results = Vec::new();
        for kind in EntityKind::BACKFILL_ORDER {
            results.extend(
                self.score_kind(business_unit_id, kind, query, &query_vector, options)
                    .await?,
            );
        }
        rank(&mut results, options.limit);
        Ok(results)
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let embedder = Arc::clone(&self.embedder);
        let query = query.to_string();
        let vector = tokio::task::spawn_blocking(move || embedder.embed_one(&query))
            .await
            .context("Embedding task panicked")?
            .context("Failed to embed search query")?;
        Ok(vector)
    }

    async fn score_kind(
        &self,
        business_unit_id: &str,
        kind: EntityKind,
        query: &str,
        query_vector: &[f32],
        options: &SearchOptions,
    ) -> Result<Vec<SearchResult>> {
        let candidates = self
            .store
            .list_embedded(kind, business_unit_id, self.embedder.model())
            .await?;
        debug!("Scoring {} embedded {} records", candidates.len(), kind);

        let keyword = options
            .hybrid
            .then(|| query.trim().to_lowercase())
            .filter(|keyword| !keyword.is_empty());

        let mut results = Vec::new();
        for record in candidates {
            let Some(embedding) = record.embedding.as_ref() else {
                continue;
            };
            let similarity = cosine_similarity(query_vector, &embedding.vector)
                .with_context(|| format!("Failed to score {} record {}", kind, record.id))?;

            let match_type = if similarity >= options.threshold {
                MatchType::Vector
            } else if keyword
                .as_deref()
                .is_some_and(|keyword| contains_keyword(&record, keyword))
            {
                MatchType::Keyword
            } else {
                continue;
            };

            results.push(SearchResult {
                record,
                similarity,
                match_type,
            });
        }

        Ok(results)
    }
}

fn contains_keyword(record: &KnowledgeRecord, keyword: &str) -> bool {
    build_embed_text(record).to_lowercase().contains(keyword)
}

fn rank(results: &mut Vec<SearchResult>, limit: usize) {
    results.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
    });
    results.truncate(limit);
}
