//! Capability traits the Pipeline (and DuplicateDetector, for embeddings)
//! invoke. Concrete implementations live in the `ingest-analysis` crate;
//! this crate only defines the seam, per the specification's "Analyzers"
//! design note — the pipeline is agnostic to implementation and must run
//! with any subset of these wired up.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("capability unavailable: {0}")]
    Unavailable(String),
    #[error("capability timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct OcrOutput {
    pub ocr_pdf_path: Option<std::path::PathBuf>,
    pub extracted_text: String,
    pub detected_language: Option<String>,
    pub page_count: u32,
    pub first_page_image_path: Option<std::path::PathBuf>,
    pub ocr_performed: bool,
}

#[async_trait]
pub trait Ocr: Send + Sync {
    async fn run(&self, pdf_path: &std::path::Path) -> Result<OcrOutput, AnalyzerError>;
}

#[derive(Debug, Clone)]
pub struct QualityOutput {
    pub label: crate::models::OcrQualityLabel,
    pub detail: HashMap<String, f64>,
}

#[async_trait]
pub trait QualityAssessor: Send + Sync {
    async fn assess(&self, first_page_image: &std::path::Path) -> Result<QualityOutput, AnalyzerError>;
}

#[derive(Debug, Clone)]
pub struct LayoutOutput {
    pub page_count: u32,
    pub element_types: HashMap<String, i64>,
    pub pages: Value,
}

#[async_trait]
pub trait LayoutAnalyzer: Send + Sync {
    async fn analyze(&self, pdf_path: &std::path::Path) -> Result<LayoutOutput, AnalyzerError>;
}

#[derive(Debug, Clone, Default)]
pub struct MetadataOutput {
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub journal: Option<String>,
    pub year: Option<i32>,
    pub doi: Option<String>,
    pub abstract_text: Option<String>,
    pub keywords: Vec<String>,
}

#[async_trait]
pub trait MetadataExtractor: Send + Sync {
    async fn extract(&self, pdf_path: &std::path::Path, extracted_text: &str) -> Result<MetadataOutput, AnalyzerError>;
}

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AnalyzerError>;
    fn model_name(&self) -> &str;
    fn dimension(&self) -> usize;
}

/// Bundle of optional capability implementations the Pipeline consults.
/// Each field is independently optional so the pipeline can run with any
/// subset wired up — a missing analyzer behaves identically to one that
/// returns [`AnalyzerError::Unavailable`]. Concrete implementations live in
/// the `ingest-analysis` crate; this crate only owns the seam.
#[derive(Clone, Default)]
pub struct Analyzers {
    pub ocr: Option<std::sync::Arc<dyn Ocr>>,
    pub quality: Option<std::sync::Arc<dyn QualityAssessor>>,
    pub layout: Option<std::sync::Arc<dyn LayoutAnalyzer>>,
    pub metadata: Option<std::sync::Arc<dyn MetadataExtractor>>,
    pub embedder: Option<std::sync::Arc<dyn Embedder>>,
}
