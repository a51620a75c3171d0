//! `Embedder`: calls an OpenAI-embeddings-compatible endpoint to turn page
//! and sample text into vectors. Mirrors the request/response shape of the
//! teacher's vision OCR backend (`foia-analysis::ocr::gemini`) — a
//! `reqwest::Client`, a typed request/response pair, bearer auth — applied
//! to the embeddings endpoint instead of the chat-completions one.

use async_trait::async_trait;
use ingest_core::capabilities::{AnalyzerError, Embedder};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Calls a remote embeddings endpoint. Holds no model in process — the
/// "module-level cache for models" the specification's design notes call
/// out becomes this single lazily-constructed capability object, handed to
/// the pipeline and `DuplicateDetector` once at startup.
pub struct HttpEmbedder {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    dimension: usize,
}

impl HttpEmbedder {
    pub fn new(endpoint: String, api_key: String, model: String, dimension: usize) -> Self {
        Self { client: reqwest::Client::new(), endpoint, api_key, model, dimension }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AnalyzerError> {
        // Embedding endpoints commonly cap input size; truncate rather than
        // fail the stage over an oversized page of text.
        const MAX_CHARS: usize = 32_000;
        let truncated: String = text.chars().take(MAX_CHARS).collect();

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest { model: &self.model, input: &truncated })
            .send()
            .await
            .map_err(|e| AnalyzerError::Other(e.into()))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AnalyzerError::Unavailable("embedding endpoint rate-limited the request".to_string()));
        }
        if !response.status().is_success() {
            return Err(AnalyzerError::Unavailable(format!("embedding endpoint returned {}", response.status())));
        }

        let mut parsed: EmbeddingResponse = response.json().await.map_err(|e| AnalyzerError::Other(e.into()))?;
        let Some(first) = parsed.data.pop() else {
            return Err(AnalyzerError::Unavailable("embedding endpoint returned no vectors".to_string()));
        };
        if first.embedding.len() != self.dimension {
            warn!(expected = self.dimension, got = first.embedding.len(), "embedding endpoint returned an unexpected dimension");
        }
        Ok(first.embedding)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructs_with_expected_dimension() {
        let embedder = HttpEmbedder::new("https://example.invalid/v1/embeddings".to_string(), "key".to_string(), "text-embedding-3-small".to_string(), 1536);
        assert_eq!(embedder.dimension(), 1536);
        assert_eq!(embedder.model_name(), "text-embedding-3-small");
    }
}
