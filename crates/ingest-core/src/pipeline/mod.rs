//! Pipeline (C5): the nine-stage path from a validated upload to a
//! persisted, embedded, analyzed [`Paper`](crate::models::Paper). The
//! central hard part of this crate — see Design Notes §9 for the
//! cyclic-risk between this module and `dedup`, resolved here by computing
//! the sample-embedding vector once in step 5 and threading it through to
//! step 8 rather than letting `DuplicateDetector` re-invoke the embedder.

mod error;
mod result;
mod rule_based_metadata;

pub use error::PipelineError;
pub use result::{PipelineResult, StepOutcome, StepStatus};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::capabilities::{AnalyzerError, Analyzers};
use crate::config::IngestConfig;
use crate::dedup::DuplicateDetector;
use crate::dedup::extract::first_last_middle_pages;
use crate::jobs::store::JobStore;
use crate::jobs::{JobExecutor, JobPayload};
use crate::models::{ExtractionMethod, NewLayoutAnalysis, NewMetadata, NewPageEmbedding, NewPaper, OcrQualityLabel};
use crate::monitor::{JobResultMetrics, PerformanceMonitor};
use crate::repository::PaperRepository;
use crate::vector_store::VectorStore;

/// Progress milestones, in stage order. The job's `progress_percent` is set
/// to the milestone value once the corresponding stage completes (or is
/// skipped) — never on failure of a non-critical stage, since the pipeline
/// keeps moving.
mod progress {
    pub const DUPLICATE_DETECTION: i32 = 5;
    pub const SAVE_PAPER: i32 = 10;
    pub const OCR: i32 = 20;
    pub const OCR_QUALITY: i32 = 35;
    pub const EMBEDDINGS: i32 = 50;
    pub const LAYOUT: i32 = 65;
    pub const METADATA: i32 = 80;
    pub const HASH_SAVE: i32 = 90;
    pub const FINALIZE: i32 = 100;
}

/// Per-run accumulator threaded through the nine stages. Exists so that
/// `run` reads as a straight line of stages rather than a pile of mutable
/// locals.
struct RunContext {
    doc_id: String,
    stages: Vec<StepOutcome>,
    warnings: Vec<String>,
    extracted_text: String,
    page_count: u32,
    first_page_image_path: Option<PathBuf>,
    page_vectors: Vec<(i32, Vec<f32>)>,
    sample_vector: Option<Vec<f32>>,
    sample_text: String,
    embedding_duplicate_of: Option<(String, f32)>,
    ocr_quality_score: Option<f64>,
    bytes_read: Option<u64>,
    bytes_written: Option<u64>,
}

impl RunContext {
    fn new(doc_id: String) -> Self {
        Self {
            doc_id,
            stages: Vec::new(),
            warnings: Vec::new(),
            extracted_text: String::new(),
            page_count: 0,
            first_page_image_path: None,
            page_vectors: Vec::new(),
            sample_vector: None,
            sample_text: String::new(),
            embedding_duplicate_of: None,
            ocr_quality_score: None,
            bytes_read: None,
            bytes_written: None,
        }
    }

    /// Snapshot of the measurements gathered so far, handed to
    /// [`PerformanceMonitor::complete_job`] regardless of which stage the
    /// run stopped at.
    fn to_metrics(&self) -> JobResultMetrics {
        JobResultMetrics {
            page_count: if self.page_count > 0 { Some(self.page_count) } else { None },
            ocr_quality_score: self.ocr_quality_score,
            embedding_dimension: self.page_vectors.first().map(|(_, v)| v.len()),
            bytes_read: self.bytes_read,
            bytes_written: self.bytes_written,
        }
    }
}

/// Orchestrates the nine stages against a wired-up set of collaborators.
/// Runs with any subset of `analyzers` present — a missing capability
/// degrades its stage to `Skipped`, never aborts the run.
pub struct Pipeline {
    config: Arc<IngestConfig>,
    papers: PaperRepository,
    job_store: JobStore,
    detector: Arc<DuplicateDetector>,
    vector_store: Arc<dyn VectorStore>,
    analyzers: Analyzers,
    monitor: Option<Arc<PerformanceMonitor>>,
}

impl Pipeline {
    pub fn new(
        config: Arc<IngestConfig>,
        papers: PaperRepository,
        job_store: JobStore,
        detector: Arc<DuplicateDetector>,
        vector_store: Arc<dyn VectorStore>,
        analyzers: Analyzers,
    ) -> Self {
        Self { config, papers, job_store, detector, vector_store, analyzers, monitor: None }
    }

    /// Wire in a [`PerformanceMonitor`] so each run's step transitions and
    /// outcome are reflected in its job metrics. Optional: the pipeline runs
    /// identically without one.
    pub fn with_monitor(mut self, monitor: Arc<PerformanceMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    async fn note_step(&self, job_id: &str, step: &str) {
        if let Some(monitor) = &self.monitor {
            monitor.update_job_step(job_id, step).await;
        }
    }

    async fn with_timeout<T>(&self, fut: impl std::future::Future<Output = Result<T, AnalyzerError>>) -> Result<T, AnalyzerError> {
        let timeout = Duration::from_secs(self.config.analyzer_timeout_secs);
        match tokio::time::timeout(timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(AnalyzerError::Timeout(timeout)),
        }
    }

    /// Run the full pipeline for one uploaded file. `upload_path` must
    /// already exist and have passed FileValidator; this method owns moving
    /// it into permanent storage and cleaning up its temp directory.
    pub async fn run(&self, job_id: &str, upload_path: &Path, filename: &str) -> (PipelineResult, JobResultMetrics) {
        let run_started = Instant::now();
        let doc_id = Uuid::new_v4().to_string();
        let mut ctx = RunContext::new(doc_id.clone());
        ctx.bytes_read = tokio::fs::metadata(upload_path).await.ok().map(|m| m.len());

        // --- Step 1: duplicate_detection (cascade) ---
        self.note_step(job_id, "duplicate_detection").await;
        let cascade = self.detector.check(upload_path, filename).await;
        if let Err(e) = self.job_store.step(job_id, "duplicate_detection", progress::DUPLICATE_DETECTION, false).await {
            warn!(job_id, error = %e, "failed to record duplicate_detection progress");
        }
        if cascade.is_duplicate() {
            self.cleanup_temp(upload_path).await;
            let existing = cascade.matched_doc_id.clone().expect("checked is_duplicate");
            info!(job_id, existing_doc_id = %existing, layer = cascade.layer.as_str(), "duplicate detected, skipping ingest");
            return (PipelineResult::from_cascade(existing, cascade.layer, cascade.elapsed), ctx.to_metrics());
        }
        ctx.stages.push(StepOutcome::completed("duplicate_detection"));

        // --- Step 2: save_paper (critical) ---
        self.note_step(job_id, "save_paper").await;
        let stored_path = match self.save_paper(upload_path, filename, &doc_id).await {
            Ok(path) => path,
            Err(e) => {
                error!(job_id, doc_id, error = %e, "save_paper failed, aborting pipeline");
                let _ = self.job_store.step(job_id, "save_paper", progress::SAVE_PAPER, true).await;
                ctx.stages.push(StepOutcome::failed("save_paper", e.to_string()));
                let metrics = ctx.to_metrics();
                return (PipelineResult::Failed { doc_id: Some(doc_id), reason: format!("save_paper: {e}"), stages_done: ctx.stages }, metrics);
            }
        };
        ctx.bytes_written = tokio::fs::metadata(&stored_path).await.ok().map(|m| m.len());
        if let Err(e) = self.job_store.step(job_id, "save_paper", progress::SAVE_PAPER, false).await {
            warn!(job_id, error = %e, "failed to record save_paper progress");
        }
        ctx.stages.push(StepOutcome::completed("save_paper"));

        // --- Step 3: ocr ---
        self.note_step(job_id, "ocr").await;
        match self.run_ocr(&stored_path).await {
            Ok(Some(output)) => {
                ctx.extracted_text = output.extracted_text;
                ctx.page_count = output.page_count;
                ctx.first_page_image_path = output.first_page_image_path;
                if let Err(e) = self.papers.update_extracted_text(&doc_id, &ctx.extracted_text) {
                    ctx.warnings.push(format!("failed to persist extracted text: {e}"));
                }
                ctx.stages.push(StepOutcome::completed("ocr"));
            }
            Ok(None) => {
                ctx.stages.push(StepOutcome::skipped("ocr", "no OCR capability configured"));
            }
            Err(AnalyzerError::Unavailable(msg)) => {
                ctx.warnings.push(format!("ocr degraded: {msg}"));
                ctx.stages.push(StepOutcome::failed("ocr", msg));
            }
            Err(AnalyzerError::Timeout(d)) => {
                let msg = format!("timed out after {d:?}");
                ctx.warnings.push(format!("ocr degraded: {msg}"));
                ctx.stages.push(StepOutcome::failed("ocr", msg));
            }
            Err(e @ AnalyzerError::Other(_)) => {
                // A hard failure out of the OCR capability itself (not a
                // documented unavailable/timeout outcome) is treated as
                // critical, mirroring the save_paper fatality.
                error!(job_id, doc_id, error = %e, "ocr raised a hard error, aborting pipeline");
                let _ = self.job_store.step(job_id, "ocr", progress::OCR, true).await;
                ctx.stages.push(StepOutcome::failed("ocr", e.to_string()));
                let metrics = ctx.to_metrics();
                return (PipelineResult::Failed { doc_id: Some(doc_id), reason: format!("ocr: {e}"), stages_done: ctx.stages }, metrics);
            }
        }
        if let Err(e) = self.job_store.step(job_id, "ocr", progress::OCR, ctx.stages.last().map(|s| s.is_failed()).unwrap_or(false)).await {
            warn!(job_id, error = %e, "failed to record ocr progress");
        }

        // --- Step 4: ocr_quality ---
        self.note_step(job_id, "ocr_quality").await;
        if self.config.ocr_quality_enabled() {
            match &ctx.first_page_image_path {
                Some(image_path) => match self.run_quality(image_path).await {
                    Ok(output) => {
                        ctx.ocr_quality_score = output.detail.get("overall_score").copied();
                        if let Err(e) = self.papers.update_ocr_quality(&doc_id, output.label.as_str(), true) {
                            ctx.warnings.push(format!("failed to persist ocr quality: {e}"));
                        }
                        ctx.stages.push(StepOutcome::completed("ocr_quality"));
                    }
                    Err(e) => {
                        ctx.warnings.push(format!("ocr_quality degraded: {e}"));
                        let _ = self.papers.update_ocr_quality(&doc_id, OcrQualityLabel::Unknown.as_str(), false);
                        ctx.stages.push(StepOutcome::failed("ocr_quality", e.to_string()));
                    }
                },
                None => ctx.stages.push(StepOutcome::skipped("ocr_quality", "no first-page image available")),
            }
        } else {
            ctx.stages.push(StepOutcome::skipped("ocr_quality", "disabled by configuration"));
        }
        let _ = self.job_store.step(job_id, "ocr_quality", progress::OCR_QUALITY, ctx.stages.last().map(|s| s.is_failed()).unwrap_or(false)).await;

        // --- Step 5: embeddings (per-page, then document + sample vectors) ---
        self.note_step(job_id, "embeddings").await;
        self.run_embeddings(&doc_id, &mut ctx).await;
        let _ = self.job_store.step(job_id, "embeddings", progress::EMBEDDINGS, ctx.stages.last().map(|s| s.is_failed()).unwrap_or(false)).await;
        if let Some((existing_doc_id, similarity)) = ctx.embedding_duplicate_of.clone() {
            self.cleanup_temp(upload_path).await;
            info!(job_id, doc_id, existing_doc_id = %existing_doc_id, similarity, "embedding-similarity duplicate detected, short-circuiting pipeline");
            let metrics = ctx.to_metrics();
            return (
                PipelineResult::Duplicate {
                    existing_doc_id,
                    layer: "Level_3_Embedding_Similarity".to_string(),
                    elapsed_ms: run_started.elapsed().as_millis() as u64,
                },
                metrics,
            );
        }

        // --- Step 6: layout ---
        self.note_step(job_id, "layout").await;
        match self.run_layout(&stored_path).await {
            Ok(Some(output)) => {
                let layout = NewLayoutAnalysis::new(&doc_id, output.page_count as i32, &output.element_types, &output.pages);
                if let Err(e) = self.papers.insert_layout(&layout) {
                    ctx.warnings.push(format!("failed to persist layout analysis: {e}"));
                } else if let Err(e) = self.papers.mark_layout_completed(&doc_id) {
                    ctx.warnings.push(format!("failed to mark layout completed: {e}"));
                }
                ctx.stages.push(StepOutcome::completed("layout"));
            }
            Ok(None) => ctx.stages.push(StepOutcome::skipped("layout", "disabled or no layout capability configured")),
            Err(e) => {
                ctx.warnings.push(format!("layout degraded: {e}"));
                ctx.stages.push(StepOutcome::failed("layout", e.to_string()));
            }
        }
        let _ = self.job_store.step(job_id, "layout", progress::LAYOUT, ctx.stages.last().map(|s| s.is_failed()).unwrap_or(false)).await;

        // --- Step 7: metadata (LLM capability, falling back to rule-based) ---
        self.note_step(job_id, "metadata").await;
        self.run_metadata(&doc_id, &stored_path, &ctx.extracted_text, &mut ctx).await;
        let _ = self.job_store.step(job_id, "metadata", progress::METADATA, ctx.stages.last().map(|s| s.is_failed()).unwrap_or(false)).await;

        // --- Step 8: hash_save, reusing the step-5 sample vector ---
        self.note_step(job_id, "hash_save").await;
        let sample_pair = ctx.sample_vector.as_ref().map(|v| (ctx.sample_text.as_str(), v.as_slice()));
        match self.detector.record(&stored_path, filename, &doc_id, sample_pair).await {
            Ok(_) => ctx.stages.push(StepOutcome::completed("hash_save")),
            Err(e) => {
                ctx.warnings.push(format!("hash_save degraded: {e}"));
                ctx.stages.push(StepOutcome::failed("hash_save", e.to_string()));
            }
        }
        let _ = self.job_store.step(job_id, "hash_save", progress::HASH_SAVE, ctx.stages.last().map(|s| s.is_failed()).unwrap_or(false)).await;

        // --- Step 9: finalize ---
        self.note_step(job_id, "finalize").await;
        if let Some(parent) = upload_path.parent() {
            if let Err(e) = tokio::fs::remove_dir_all(parent).await {
                ctx.warnings.push(format!("failed to clean up temp directory: {e}"));
            }
        }
        ctx.stages.push(StepOutcome::completed("finalize"));
        let _ = self.job_store.step(job_id, "finalize", progress::FINALIZE, false).await;

        let metrics = ctx.to_metrics();
        (PipelineResult::Completed { doc_id, stages: ctx.stages, warnings: ctx.warnings }, metrics)
    }

    async fn save_paper(&self, upload_path: &Path, filename: &str, doc_id: &str) -> Result<PathBuf, PipelineError> {
        tokio::fs::create_dir_all(self.config.pdfs_dir()).await?;
        let extension = Path::new(filename).extension().and_then(|e| e.to_str()).unwrap_or("pdf");
        let stored_path = self.config.pdfs_dir().join(format!("{doc_id}.{extension}"));
        tokio::fs::copy(upload_path, &stored_path).await?;

        let new_paper = NewPaper::new(doc_id, filename, stored_path.to_string_lossy().to_string());
        self.papers.insert(&new_paper)?;
        Ok(stored_path)
    }

    async fn cleanup_temp(&self, upload_path: &Path) {
        if let Some(parent) = upload_path.parent() {
            if let Err(e) = tokio::fs::remove_dir_all(parent).await {
                warn!(error = %e, path = %parent.display(), "failed to clean up temp directory after duplicate skip");
            }
        }
    }

    async fn run_ocr(&self, stored_path: &Path) -> Result<Option<crate::capabilities::OcrOutput>, AnalyzerError> {
        let Some(ocr) = self.analyzers.ocr.clone() else {
            return Ok(None);
        };
        let path = stored_path.to_path_buf();
        self.with_timeout(async move { ocr.run(&path).await }).await.map(Some)
    }

    async fn run_quality(&self, image_path: &Path) -> Result<crate::capabilities::QualityOutput, AnalyzerError> {
        let Some(quality) = self.analyzers.quality.clone() else {
            return Err(AnalyzerError::Unavailable("no quality assessor configured".to_string()));
        };
        let path = image_path.to_path_buf();
        self.with_timeout(async move { quality.assess(&path).await }).await
    }

    async fn run_layout(&self, stored_path: &Path) -> Result<Option<crate::capabilities::LayoutOutput>, AnalyzerError> {
        if !self.config.layout_enabled() {
            return Ok(None);
        }
        let Some(layout) = self.analyzers.layout.clone() else {
            return Ok(None);
        };
        let path = stored_path.to_path_buf();
        self.with_timeout(async move { layout.analyze(&path).await }).await.map(Some)
    }

    /// Per-page embeddings, the document vector (their arithmetic mean),
    /// and the `first_last_middle` sample vector the L2 cascade layer needs
    /// — all derived from a single pass over the embedder, so step 8 never
    /// has to invoke it again.
    async fn run_embeddings(&self, doc_id: &str, ctx: &mut RunContext) {
        let Some(embedder) = self.analyzers.embedder.clone() else {
            ctx.stages.push(StepOutcome::skipped("embeddings", "no embedding capability configured"));
            return;
        };
        if ctx.extracted_text.is_empty() {
            ctx.stages.push(StepOutcome::skipped("embeddings", "no extracted text available"));
            return;
        }

        let page_texts: Vec<&str> = ctx.extracted_text.split('\x0c').collect();
        let page_count = if ctx.page_count > 0 { ctx.page_count as usize } else { page_texts.len() };

        let mut rows = Vec::new();
        for page_number in 1..=page_count {
            let text = page_texts.get(page_number - 1).copied().unwrap_or("");
            if text.trim().is_empty() {
                continue;
            }
            match self.with_timeout(async { embedder.embed(text).await }).await {
                Ok(vector) => {
                    rows.push(NewPageEmbedding::new(doc_id, page_number as i32, text, &vector));
                    ctx.page_vectors.push((page_number as i32, vector));
                }
                Err(e) => {
                    ctx.warnings.push(format!("embedding failed for page {page_number}: {e}"));
                }
            }
        }

        if rows.is_empty() {
            ctx.stages.push(StepOutcome::skipped("embeddings", "no page produced a usable embedding"));
            return;
        }

        if let Err(e) = self.papers.insert_page_embeddings(&rows) {
            ctx.warnings.push(format!("failed to persist page embeddings: {e}"));
        }

        let dimension = ctx.page_vectors[0].1.len();
        let mut doc_vector = vec![0.0_f32; dimension];
        for (_, v) in &ctx.page_vectors {
            for (i, component) in v.iter().enumerate() {
                doc_vector[i] += component;
            }
        }
        for component in &mut doc_vector {
            *component /= ctx.page_vectors.len() as f32;
        }

        let sample_pages = first_last_middle_pages(page_count as u32);
        ctx.sample_text = sample_pages
            .iter()
            .filter_map(|p| page_texts.get((*p - 1) as usize))
            .collect::<Vec<_>>()
            .join("");
        let sample_rows: Vec<&Vec<f32>> = sample_pages
            .iter()
            .filter_map(|p| ctx.page_vectors.iter().find(|(n, _)| *n == *p as i32).map(|(_, v)| v))
            .collect();
        if !sample_rows.is_empty() {
            let mut sample_vector = vec![0.0_f32; dimension];
            for v in &sample_rows {
                for (i, component) in v.iter().enumerate() {
                    sample_vector[i] += component;
                }
            }
            for component in &mut sample_vector {
                *component /= sample_rows.len() as f32;
            }
            ctx.sample_vector = Some(sample_vector);
        }

        let content_id = format!("{:x}", Sha256::digest(crate::models::page_embedding::vector_to_le_bytes(&doc_vector)));
        let existing_by_content = self.papers.by_content_id(&content_id).ok().flatten();
        let nearest = self.vector_store.nearest(&doc_vector).await.ok().flatten();
        let similarity_hit = nearest.as_ref().and_then(|(existing_doc, similarity)| {
            if existing_doc != doc_id && *similarity >= self.config.similarity_duplicate_threshold {
                Some((existing_doc.clone(), *similarity))
            } else {
                None
            }
        });

        if let Some(existing) = existing_by_content {
            ctx.embedding_duplicate_of = Some((existing.doc_id, 1.0));
            ctx.stages.push(StepOutcome::skipped("embeddings", "content-id match against an existing document"));
            return;
        }
        if let Some((existing_doc, similarity)) = similarity_hit {
            ctx.embedding_duplicate_of = Some((existing_doc, similarity));
            ctx.stages.push(StepOutcome::skipped("embeddings", "cosine-similarity match against an existing document"));
            return;
        }

        if let Err(e) = self.vector_store.upsert(doc_id, &doc_vector).await {
            ctx.warnings.push(format!("failed to index document vector: {e}"));
        }
        if let Err(e) = self.papers.update_content_id(doc_id, &content_id) {
            ctx.warnings.push(format!("failed to persist content id: {e}"));
        }
        ctx.stages.push(StepOutcome::completed("embeddings"));
    }

    async fn run_metadata(&self, doc_id: &str, stored_path: &Path, extracted_text: &str, ctx: &mut RunContext) {
        if !self.config.metadata_llm_enabled() {
            self.run_rule_based_metadata(doc_id, extracted_text, ctx);
            return;
        }
        let Some(extractor) = self.analyzers.metadata.clone() else {
            self.run_rule_based_metadata(doc_id, extracted_text, ctx);
            return;
        };
        let path = stored_path.to_path_buf();
        let text = extracted_text.to_string();
        match self.with_timeout(async move { extractor.extract(&path, &text).await }).await {
            Ok(output) => {
                let new_metadata = NewMetadata::new(doc_id, ExtractionMethod::StructuredLlm)
                    .with_authors(&output.authors)
                    .with_keywords(&output.keywords);
                let new_metadata = NewMetadata { title: output.title, journal: output.journal, year: output.year, doi: output.doi, abstract_text: output.abstract_text, ..new_metadata };
                if let Err(e) = self.papers.insert_metadata(&new_metadata) {
                    ctx.warnings.push(format!("failed to persist metadata: {e}"));
                } else if let Err(e) = self.papers.mark_metadata_completed(doc_id, true) {
                    ctx.warnings.push(format!("failed to mark metadata completed: {e}"));
                }
                ctx.stages.push(StepOutcome::completed("metadata"));
            }
            Err(e) => {
                ctx.warnings.push(format!("metadata LLM extraction degraded, falling back to rule-based: {e}"));
                let _ = self.papers.mark_metadata_completed(doc_id, false);
                self.run_rule_based_metadata(doc_id, extracted_text, ctx);
            }
        }
    }

    fn run_rule_based_metadata(&self, doc_id: &str, extracted_text: &str, ctx: &mut RunContext) {
        if extracted_text.trim().is_empty() {
            ctx.stages.push(StepOutcome::skipped("metadata", "no extracted text to mine"));
            return;
        }
        let output = rule_based_metadata::rule_based_extract(extracted_text);
        let new_metadata = NewMetadata::new(doc_id, ExtractionMethod::RuleBased).with_authors(&output.authors).with_keywords(&output.keywords);
        let new_metadata = NewMetadata { title: output.title, journal: output.journal, year: output.year, doi: output.doi, abstract_text: output.abstract_text, ..new_metadata };
        if !new_metadata.has_any_field() {
            ctx.stages.push(StepOutcome::skipped("metadata", "rule-based extraction found no fields"));
            return;
        }
        if let Err(e) = self.papers.insert_metadata(&new_metadata) {
            ctx.warnings.push(format!("failed to persist metadata: {e}"));
        }
        ctx.stages.push(StepOutcome::completed("metadata"));
    }
}

#[async_trait]
impl JobExecutor for Pipeline {
    async fn execute(&self, job_id: &str, payload: JobPayload) {
        if let Err(e) = self.job_store.start(job_id).await {
            error!(job_id, error = %e, "failed to transition job to processing");
            return;
        }

        if let Some(monitor) = &self.monitor {
            let file_size_mb = tokio::fs::metadata(&payload.source_path)
                .await
                .ok()
                .map(|m| m.len() as f64 / (1024.0 * 1024.0));
            monitor.start_job_tracking(job_id, &payload.filename, file_size_mb).await;
        }

        let started = Instant::now();
        let (result, result_metrics) = self.run(job_id, &payload.source_path, &payload.filename).await;
        let elapsed = started.elapsed();

        if let Some(monitor) = &self.monitor {
            let (success, error_message) = match &result {
                PipelineResult::Duplicate { .. } => (true, None),
                PipelineResult::Completed { .. } => (true, None),
                PipelineResult::Failed { reason, .. } => (false, Some(reason.clone())),
            };
            monitor.complete_job(job_id, success, error_message, Some(result_metrics)).await;
        }

        let summary = match &result {
            PipelineResult::Duplicate { existing_doc_id, layer, elapsed_ms } => serde_json::json!({
                "duplicate_detection": {
                    "is_duplicate": true,
                    "matched_doc_id": existing_doc_id,
                    "layer": layer,
                    "elapsed_ms": elapsed_ms,
                }
            }),
            PipelineResult::Completed { stages, warnings, .. } => serde_json::json!({
                "stages": stages,
                "warnings": warnings,
                "elapsed_ms": elapsed.as_millis() as u64,
            }),
            PipelineResult::Failed { stages_done, reason, .. } => serde_json::json!({
                "stages": stages_done,
                "reason": reason,
            }),
        };

        match result {
            PipelineResult::Duplicate { existing_doc_id, .. } => {
                if let Err(e) = self.job_store.finish_ok(job_id, &existing_doc_id, &summary).await {
                    error!(job_id, error = %e, "failed to finalize duplicate job");
                }
            }
            PipelineResult::Completed { doc_id, .. } => {
                if let Err(e) = self.job_store.finish_ok(job_id, &doc_id, &summary).await {
                    error!(job_id, error = %e, "failed to finalize completed job");
                }
            }
            PipelineResult::Failed { reason, .. } => {
                if let Err(e) = self.job_store.finish_err(job_id, &reason).await {
                    error!(job_id, error = %e, "failed to finalize failed job");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{OcrOutput, QualityOutput};
    use crate::dedup::DuplicateDetector;
    use crate::repository::{DetectionLogRepository, HashRepository, JobRepository};
    use crate::vector_store::InMemoryVectorStore;
    use tempfile::TempDir;

    fn minimal_pdf() -> Vec<u8> {
        let mut doc = lopdf::Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(lopdf::dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
        });
        doc.objects.insert(
            pages_id,
            lopdf::Object::Dictionary(lopdf::dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(lopdf::dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    fn minimal_pdf_with_pages(page_count: usize) -> Vec<u8> {
        let mut doc = lopdf::Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let page_ids: Vec<lopdf::Object> = (0..page_count)
            .map(|_| {
                doc.add_object(lopdf::dictionary! {
                    "Type" => "Page",
                    "Parent" => pages_id,
                })
                .into()
            })
            .collect();
        doc.objects.insert(
            pages_id,
            lopdf::Object::Dictionary(lopdf::dictionary! {
                "Type" => "Pages",
                "Kids" => page_ids,
                "Count" => page_count as i64,
            }),
        );
        let catalog_id = doc.add_object(lopdf::dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    struct FakeOcr {
        text: &'static str,
        page_count: u32,
    }

    #[async_trait]
    impl crate::capabilities::Ocr for FakeOcr {
        async fn run(&self, _pdf_path: &Path) -> Result<OcrOutput, AnalyzerError> {
            Ok(OcrOutput {
                ocr_pdf_path: None,
                extracted_text: self.text.to_string(),
                detected_language: Some("en".to_string()),
                page_count: self.page_count,
                first_page_image_path: None,
                ocr_performed: true,
            })
        }
    }

    struct FakeEmbedder;

    #[async_trait]
    impl crate::capabilities::Embedder for FakeEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, AnalyzerError> {
            let len = text.len() as f32;
            Ok(vec![len, len / 2.0, 1.0, -len / 3.0])
        }
        fn model_name(&self) -> &str {
            "fake-embedder-v1"
        }
        fn dimension(&self) -> usize {
            4
        }
    }

    struct FailingQuality;

    #[async_trait]
    impl crate::capabilities::QualityAssessor for FailingQuality {
        async fn assess(&self, _first_page_image: &Path) -> Result<QualityOutput, AnalyzerError> {
            Err(AnalyzerError::Unavailable("no model loaded".to_string()))
        }
    }

    struct Harness {
        pipeline: Pipeline,
        job_store: JobStore,
        _dir: TempDir,
        _data_dir: TempDir,
    }

    fn harness(analyzers: Analyzers) -> Harness {
        let (pool, dir) = crate::db::test_pool();
        let data_dir = TempDir::new().unwrap();
        let config = Arc::new(IngestConfig { data_dir: data_dir.path().to_path_buf(), ..IngestConfig::default() });

        let papers = PaperRepository::new(pool.clone());
        let hashes = HashRepository::new(pool.clone());
        let detection_logs = DetectionLogRepository::new(pool.clone());
        let job_store = JobStore::new(JobRepository::new(pool));

        let detector = Arc::new(DuplicateDetector::new(hashes, detection_logs, analyzers.embedder.clone()));
        let vector_store: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());

        let pipeline = Pipeline::new(config, papers, job_store.clone(), detector, vector_store, analyzers);
        Harness { pipeline, job_store, _dir: dir, _data_dir: data_dir }
    }

    async fn upload(dir: &TempDir, name: &str, bytes: &[u8]) -> PathBuf {
        let sub = dir.path().join(uuid::Uuid::new_v4().to_string());
        tokio::fs::create_dir_all(&sub).await.unwrap();
        let path = sub.join(name);
        tokio::fs::write(&path, bytes).await.unwrap();
        path
    }

    #[tokio::test]
    async fn completes_with_no_analyzers_configured_degrading_every_optional_stage() {
        let h = harness(Analyzers::default());
        let uploads = TempDir::new().unwrap();
        let path = upload(&uploads, "paper.pdf", &minimal_pdf()).await;

        let (result, _metrics) = h.pipeline.run("job1", &path, "paper.pdf").await;
        match result {
            PipelineResult::Completed { stages, .. } => {
                let by_name = |name: &str| stages.iter().find(|s| s.name == name).unwrap();
                assert!(matches!(by_name("duplicate_detection").status, StepStatus::Completed));
                assert!(matches!(by_name("save_paper").status, StepStatus::Completed));
                assert!(matches!(by_name("ocr").status, StepStatus::Skipped { .. }));
                assert!(matches!(by_name("embeddings").status, StepStatus::Skipped { .. }));
                assert!(matches!(by_name("finalize").status, StepStatus::Completed));
            }
            other => panic!("expected Completed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn second_identical_upload_is_detected_as_a_duplicate() {
        let h = harness(Analyzers::default());
        let uploads = TempDir::new().unwrap();
        let bytes = minimal_pdf();

        let path1 = upload(&uploads, "paper.pdf", &bytes).await;
        let (first, _metrics) = h.pipeline.run("job1", &path1, "paper.pdf").await;
        let doc_id = match first {
            PipelineResult::Completed { doc_id, .. } => doc_id,
            other => panic!("expected Completed, got {other:?}"),
        };

        let path2 = upload(&uploads, "paper-copy.pdf", &bytes).await;
        let (second, _metrics) = h.pipeline.run("job2", &path2, "paper-copy.pdf").await;
        match second {
            PipelineResult::Duplicate { existing_doc_id, .. } => assert_eq!(existing_doc_id, doc_id),
            other => panic!("expected Duplicate, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn embedding_similarity_duplicate_short_circuits_before_layout_and_metadata() {
        let analyzers = Analyzers {
            ocr: Some(Arc::new(FakeOcr { text: "alpha beta gamma delta", page_count: 1 })),
            quality: None,
            layout: None,
            metadata: None,
            embedder: Some(Arc::new(FakeEmbedder)),
        };
        let h = harness(analyzers);
        let uploads = TempDir::new().unwrap();

        let path1 = upload(&uploads, "paper.pdf", &minimal_pdf()).await;
        let (first, _metrics) = h.pipeline.run("job1", &path1, "paper.pdf").await;
        let first_doc_id = match first {
            PipelineResult::Completed { doc_id, .. } => doc_id,
            other => panic!("expected Completed, got {other:?}"),
        };

        // A structurally different file (different page count, so the L1
        // content-hash cascade does not catch it) but the OCR analyzer is
        // faked to yield identical text, so step 5 matches on the embedding
        // instead.
        let path2 = upload(&uploads, "paper-restyled.pdf", &minimal_pdf_with_pages(2)).await;
        let (second, metrics) = h.pipeline.run("job2", &path2, "paper-restyled.pdf").await;
        match second {
            PipelineResult::Duplicate { existing_doc_id, layer, .. } => {
                assert_eq!(existing_doc_id, first_doc_id);
                assert_eq!(layer, "Level_3_Embedding_Similarity");
            }
            other => panic!("expected Duplicate, got {other:?}"),
        }
        assert!(metrics.bytes_read.is_some());
    }

    #[tokio::test]
    async fn ocr_and_embedder_drive_per_page_vectors_and_hash_save() {
        let analyzers = Analyzers {
            ocr: Some(Arc::new(FakeOcr { text: "alpha beta\x0cgamma delta\x0cepsilon zeta", page_count: 3 })),
            quality: None,
            layout: None,
            metadata: None,
            embedder: Some(Arc::new(FakeEmbedder)),
        };
        let h = harness(analyzers);
        let uploads = TempDir::new().unwrap();
        let path = upload(&uploads, "paper.pdf", &minimal_pdf()).await;

        let (result, metrics) = h.pipeline.run("job1", &path, "paper.pdf").await;
        match result {
            PipelineResult::Completed { doc_id, stages, .. } => {
                let by_name = |name: &str| stages.iter().find(|s| s.name == name).unwrap();
                assert!(matches!(by_name("embeddings").status, StepStatus::Completed));
                assert!(matches!(by_name("hash_save").status, StepStatus::Completed));

                let rows = h.pipeline.papers.page_embeddings_for(&doc_id).unwrap();
                assert_eq!(rows.len(), 3);
            }
            other => panic!("expected Completed, got {other:?}"),
        }
        assert_eq!(metrics.page_count, Some(3));
        assert_eq!(metrics.embedding_dimension, Some(4));
    }

    #[tokio::test]
    async fn degraded_quality_assessor_fails_its_stage_without_failing_the_job() {
        let analyzers = Analyzers {
            ocr: Some(Arc::new(FakeOcr { text: "only page", page_count: 1 })),
            quality: Some(Arc::new(FailingQuality)),
            layout: None,
            metadata: None,
            embedder: None,
        };
        // FakeOcr never produces a first-page image, so ocr_quality is
        // skipped rather than failed regardless of the assessor — exercise
        // the assessor failure path directly instead.
        let h = harness(analyzers);
        let quality_result = h.pipeline.run_quality(Path::new("/nonexistent.png")).await;
        assert!(matches!(quality_result, Err(AnalyzerError::Unavailable(_))));
    }

    #[tokio::test]
    async fn job_executor_persists_completed_status_and_result_summary() {
        let h = harness(Analyzers::default());
        let uploads = TempDir::new().unwrap();
        let path = upload(&uploads, "paper.pdf", &minimal_pdf()).await;

        h.job_store.create("job1", "paper.pdf", &path.to_string_lossy()).await.unwrap();
        let payload = JobPayload { filename: "paper.pdf".to_string(), source_path: path, client_id: None };
        h.pipeline.execute("job1", payload).await;

        let job = h.job_store.get("job1").await.unwrap().unwrap();
        assert_eq!(job.status(), crate::models::JobStatus::Completed);
        assert!(job.paper_id.is_some());
        let summary = job.result_summary_value().unwrap();
        assert!(summary.get("stages").is_some());
    }
}
