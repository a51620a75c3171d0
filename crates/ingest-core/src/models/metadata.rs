use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::metadata;

/// How a [`Metadata`] record's fields were obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    StructuredLlm,
    SimpleLlm,
    RuleBased,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StructuredLlm => "structured_llm",
            Self::SimpleLlm => "simple_llm",
            Self::RuleBased => "rule_based",
        }
    }
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = metadata)]
pub struct Metadata {
    pub id: i32,
    pub doc_id: String,
    pub title: Option<String>,
    /// JSON-encoded `Vec<String>`.
    pub authors: String,
    pub journal: Option<String>,
    pub year: Option<i32>,
    pub doi: Option<String>,
    pub abstract_text: Option<String>,
    /// JSON-encoded `Vec<String>`.
    pub keywords: String,
    pub extraction_method: String,
}

impl Metadata {
    pub fn authors_vec(&self) -> Vec<String> {
        serde_json::from_str(&self.authors).unwrap_or_default()
    }

    pub fn keywords_vec(&self) -> Vec<String> {
        serde_json::from_str(&self.keywords).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = metadata)]
pub struct NewMetadata {
    pub doc_id: String,
    pub title: Option<String>,
    pub authors: String,
    pub journal: Option<String>,
    pub year: Option<i32>,
    pub doi: Option<String>,
    pub abstract_text: Option<String>,
    pub keywords: String,
    pub extraction_method: String,
}

impl NewMetadata {
    pub fn new(doc_id: impl Into<String>, method: ExtractionMethod) -> Self {
        Self {
            doc_id: doc_id.into(),
            title: None,
            authors: "[]".to_string(),
            journal: None,
            year: None,
            doi: None,
            abstract_text: None,
            keywords: "[]".to_string(),
            extraction_method: method.as_str().to_string(),
        }
    }

    pub fn with_authors(mut self, authors: &[String]) -> Self {
        self.authors = serde_json::to_string(authors).unwrap_or_else(|_| "[]".to_string());
        self
    }

    pub fn with_keywords(mut self, keywords: &[String]) -> Self {
        self.keywords = serde_json::to_string(keywords).unwrap_or_else(|_| "[]".to_string());
        self
    }

    /// Whether this record recovered at least one meaningful field — used by
    /// the rule-based extractor fallback to decide whether persisting is
    /// worthwhile.
    pub fn has_any_field(&self) -> bool {
        self.title.is_some()
            || self.authors != "[]"
            || self.journal.is_some()
            || self.year.is_some()
            || self.doi.is_some()
    }
}
