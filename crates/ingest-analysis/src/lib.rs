//! ingest-analysis - concrete, individually optional implementations of the
//! `ingest_core::capabilities` traits.
//!
//! Each module provides one capability and is independently wireable into
//! `ingest_core::capabilities::Analyzers` — none depend on one another.

pub mod embedding;
pub mod layout;
pub mod metadata;
pub mod ocr;
pub mod quality;

pub use embedding::HttpEmbedder;
pub use layout::LopdfLayoutAnalyzer;
pub use metadata::{LlmMetadataExtractor, MetadataApiConfig};
pub use ocr::{PdfTextOcr, VisionApiOcr};
pub use quality::HeuristicQualityAssessor;
