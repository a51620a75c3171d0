pub mod detection_log;
pub mod hashes;
pub mod job;
pub mod layout;
pub mod metadata;
pub mod page_embedding;
pub mod paper;

pub use detection_log::{DetectionLayer, DetectionLog, DetectionResult, NewDetectionLog};
pub use hashes::{ContentHash, FileHash, NewContentHash, NewFileHash, NewSampleEmbeddingHash, SampleEmbeddingHash};
pub use job::{Job, JobStatus, NewJob};
pub use layout::{LayoutAnalysis, NewLayoutAnalysis};
pub use metadata::{ExtractionMethod, Metadata, NewMetadata};
pub use page_embedding::{NewPageEmbedding, PageEmbedding};
pub use paper::{NewPaper, OcrQualityLabel, Paper};
