//! `MetadataExtractor`: prompts a chat-completions-compatible LLM endpoint
//! for structured bibliographic fields, using the teacher's JSON-over-HTTP
//! request/response shape (`foia-analysis::ocr::gemini`) rather than a
//! bespoke client.

use async_trait::async_trait;
use ingest_core::capabilities::{AnalyzerError, MetadataExtractor, MetadataOutput};
use serde::{Deserialize, Serialize};

/// Connection details for the metadata-extraction LLM endpoint. Kept
/// distinct from [`HttpEmbedder`](crate::embedding::HttpEmbedder)'s fields
/// since the two capabilities are wired up, timed out, and possibly pointed
/// at different providers independently.
#[derive(Debug, Clone)]
pub struct MetadataApiConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    response_format: ResponseFormat<'a>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// The JSON object we ask the model to return, mapped 1:1 onto
/// [`MetadataOutput`].
#[derive(Debug, Default, Deserialize)]
struct ExtractedFields {
    title: Option<String>,
    #[serde(default)]
    authors: Vec<String>,
    journal: Option<String>,
    year: Option<i32>,
    doi: Option<String>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    #[serde(default)]
    keywords: Vec<String>,
}

const SYSTEM_PROMPT: &str = "You extract bibliographic metadata from academic papers. Given the paper's text, respond with a single JSON object with keys: title, authors (array of strings), journal, year (integer or null), doi, abstract, keywords (array of strings). Use null for any field you cannot determine with confidence. Do not include any text outside the JSON object.";

/// Calls the configured LLM endpoint with a truncated prefix of the paper's
/// extracted text and parses its JSON response. Non-JSON or malformed
/// responses surface as [`AnalyzerError::Unavailable`], which the pipeline
/// treats as a non-fatal degrade to the rule-based fallback.
pub struct LlmMetadataExtractor {
    client: reqwest::Client,
    config: MetadataApiConfig,
}

impl LlmMetadataExtractor {
    pub fn new(config: MetadataApiConfig) -> Self {
        Self { client: reqwest::Client::new(), config }
    }
}

#[async_trait]
impl MetadataExtractor for LlmMetadataExtractor {
    async fn extract(&self, _pdf_path: &std::path::Path, extracted_text: &str) -> Result<MetadataOutput, AnalyzerError> {
        const MAX_CHARS: usize = 12_000;
        let prefix: String = extracted_text.chars().take(MAX_CHARS).collect();
        if prefix.trim().is_empty() {
            return Err(AnalyzerError::Unavailable("no extracted text to mine for metadata".to_string()));
        }

        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage { role: "system", content: SYSTEM_PROMPT.to_string() },
                ChatMessage { role: "user", content: prefix },
            ],
            temperature: 0.0,
            response_format: ResponseFormat { kind: "json_object" },
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AnalyzerError::Other(e.into()))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AnalyzerError::Unavailable("metadata LLM endpoint rate-limited the request".to_string()));
        }
        if !response.status().is_success() {
            return Err(AnalyzerError::Unavailable(format!("metadata LLM endpoint returned {}", response.status())));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| AnalyzerError::Other(e.into()))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AnalyzerError::Unavailable("metadata LLM endpoint returned no choices".to_string()))?;

        let fields: ExtractedFields = serde_json::from_str(&content)
            .map_err(|e| AnalyzerError::Unavailable(format!("metadata LLM response was not valid JSON: {e}")))?;

        Ok(MetadataOutput {
            title: fields.title,
            authors: fields.authors,
            journal: fields.journal,
            year: fields.year,
            doi: fields.doi,
            abstract_text: fields.abstract_text,
            keywords: fields.keywords,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracted_fields_parse_from_minimal_json() {
        let json = r#"{"title": "A Paper", "authors": ["A. Author"], "journal": null, "year": 2023, "doi": null, "abstract": null, "keywords": []}"#;
        let fields: ExtractedFields = serde_json::from_str(json).unwrap();
        assert_eq!(fields.title.as_deref(), Some("A Paper"));
        assert_eq!(fields.year, Some(2023));
    }
}
