#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::EmbeddingError;
use super::text::{DEFAULT_MAX_TOKENS, normalize, truncate_to_token_limit};
use crate::config::{Config, ConfigError, ProviderConfig};

pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 1536;

/// Provider limit on inputs per request. Callers chunk larger batches themselves.
pub const MAX_BATCH_INPUTS: usize = 2048;

/// Cap on the size of a provider response body
const MAX_RESPONSE_BYTES: u64 = 256 * 1024 * 1024;

/// Something that turns text into embedding vectors of a single model
pub trait Embedder: Send + Sync {
    /// Model identifier recorded next to every vector this embedder produces
    fn model(&self) -> &str;

    fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// One vector per input, in input order
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// Client for an OpenAI-compatible `/embeddings` endpoint.
///
/// Constructed once per process with its credentials and passed explicitly to
/// whatever needs it. Calls are never retried here.
#[derive(Clone)]
pub struct EmbeddingClient {
    endpoint: Url,
    model: String,
    dimension: usize,
    api_key: String,
    max_tokens: usize,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: EmbedInput<'a>,
    encoding_format: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum EmbedInput<'a> {
    Single(&'a str),
    Batch(&'a [String]),
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbeddingData>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl EmbeddingClient {
    #[inline]
    pub fn new(provider: &ProviderConfig, api_key: String) -> Result<Self, ConfigError> {
        provider.validate()?;
        let endpoint = provider.embeddings_url()?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(provider.timeout_seconds)))
            .http_status_as_error(false)
            .build()
            .into();

        Ok(Self {
            endpoint,
            model: provider.model.clone(),
            dimension: provider.embedding_dimension as usize,
            api_key,
            max_tokens: DEFAULT_MAX_TOKENS,
            agent,
        })
    }

    /// Build a client from the full configuration, reading the API key from the environment
    #[inline]
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config
            .provider
            .api_key()
            .context("Embedding provider credentials are missing")?;

        let client = Self::new(&config.provider, api_key)
            .context("Failed to initialize embedding client")?
            .with_max_tokens(config.backfill.max_tokens);

        Ok(client)
    }

    #[inline]
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn prepare(&self, text: &str) -> Result<String, EmbeddingError> {
        let cleaned = normalize(text)?;
        Ok(truncate_to_token_limit(&cleaned, self.max_tokens).into_owned())
    }

    fn request_embeddings(
        &self,
        input: EmbedInput<'_>,
        expected: usize,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let request = EmbedRequest {
            model: &self.model,
            input,
            encoding_format: "float",
        };

        let request_json = serde_json::to_string(&request).map_err(|e| {
            EmbeddingError::Provider(format!("Failed to serialize embedding request: {}", e))
        })?;

        debug!(
            "POST {} ({} input(s), model {})",
            self.endpoint, expected, self.model
        );

        let mut response = self
            .agent
            .post(self.endpoint.as_str())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .send(&request_json)
            .map_err(|e| {
                warn!("Transport error calling embedding provider: {}", e);
                EmbeddingError::Provider(format!("Request failed: {}", e))
            })?;

        let status = response.status();
        let response_text = response
            .body_mut()
            .with_config()
            .limit(MAX_RESPONSE_BYTES)
            .read_to_string()
            .map_err(|e| {
                EmbeddingError::Provider(format!("Failed to read provider response: {}", e))
            })?;

        if !status.is_success() {
            let message = provider_message(status.as_u16(), &response_text);
            warn!("Embedding provider rejected request: {}", message);
            return Err(EmbeddingError::Provider(message));
        }

        let embed_response: EmbedResponse = serde_json::from_str(&response_text).map_err(|e| {
            EmbeddingError::Provider(format!("Failed to parse embedding response: {}", e))
        })?;

        if let Some(usage) = &embed_response.usage {
            debug!("Provider reported {} tokens used", usage.total_tokens);
        }

        self.ordered_vectors(embed_response.data, expected)
    }

    /// Order items by their `index` and check count, dimension and finiteness
    fn ordered_vectors(
        &self,
        mut data: Vec<EmbeddingData>,
        expected: usize,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if data.len() != expected {
            return Err(EmbeddingError::Provider(format!(
                "Mismatch between request and response counts: {} vs {}",
                expected,
                data.len()
            )));
        }

        data.sort_by_key(|item| item.index);
        if data.iter().enumerate().any(|(i, item)| item.index != i) {
            return Err(EmbeddingError::Provider(
                "Provider returned duplicate or out-of-range indices".to_string(),
            ));
        }

        data.into_iter()
            .map(|item| {
                if item.embedding.len() != self.dimension {
                    return Err(EmbeddingError::Provider(format!(
                        "Unexpected embedding dimension {} (expected {})",
                        item.embedding.len(),
                        self.dimension
                    )));
                }
                if item.embedding.iter().any(|value| !value.is_finite()) {
                    return Err(EmbeddingError::Provider(format!(
                        "Embedding {} contains NaN or infinite values",
                        item.index
                    )));
                }
                Ok(item.embedding)
            })
            .collect()
    }
}

impl Embedder for EmbeddingClient {
    #[inline]
    fn model(&self) -> &str {
        &self.model
    }

    /// Normalize, truncate and embed a single text
    #[inline]
    fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let prepared = self.prepare(text)?;
        debug!(
            "Generating embedding for text (length: {})",
            prepared.len()
        );

        self.request_embeddings(EmbedInput::Single(&prepared), 1)?
            .pop()
            .ok_or_else(|| EmbeddingError::Provider("Provider returned no embedding".to_string()))
    }

    #[inline]
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        if texts.len() > MAX_BATCH_INPUTS {
            warn!(
                "Batch of {} inputs exceeds the provider limit of {}",
                texts.len(),
                MAX_BATCH_INPUTS
            );
        }

        let prepared = texts
            .iter()
            .map(|text| self.prepare(text))
            .collect::<Result<Vec<_>, _>>()?;

        debug!("Generating embeddings for {} texts", prepared.len());
        self.request_embeddings(EmbedInput::Batch(&prepared), prepared.len())
    }
}

impl fmt::Debug for EmbeddingClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddingClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("model", &self.model)
            .field("dimension", &self.dimension)
            .field("max_tokens", &self.max_tokens)
            .finish_non_exhaustive()
    }
}

fn provider_message(status: u16, body: &str) -> String {
    serde_json::from_str::<ErrorResponse>(body).map_or_else(
        |_| format!("HTTP {}", status),
        |parsed| format!("HTTP {}: {}", status, parsed.error.message),
    )
}
