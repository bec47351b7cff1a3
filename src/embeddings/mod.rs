// Embeddings module
// Text preparation, the remote embedding provider, and vector similarity

pub mod openai;
pub mod similarity;
pub mod text;

use thiserror::Error;

pub use openai::{DEFAULT_EMBEDDING_DIMENSION, DEFAULT_EMBEDDING_MODEL, Embedder, EmbeddingClient};
pub use similarity::{SimilarityError, cosine_similarity, similarity_from_distance};
pub use text::{
    DEFAULT_MAX_TOKENS, combine_fields, estimate_cost, estimate_token_count, normalize,
    truncate_to_token_limit,
};

/// Failures while turning text into an embedding vector
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EmbeddingError {
    /// Normalization left nothing to embed; the record should be skipped, not retried
    #[error("Text cannot be empty")]
    EmptyInput,
    /// The remote provider call failed (transport, auth, rate limit, malformed response)
    #[error("Embedding provider error: {0}")]
    Provider(String),
}
