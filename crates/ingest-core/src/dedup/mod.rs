//! DuplicateDetector (C2): a three-layer cascade (file digest, content
//! digest, sample-embedding digest), cheapest layer first.

pub mod extract;
mod error;

pub use error::DuplicateDetectorError;

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::capabilities::Embedder;
use crate::models::{
    DetectionLayer, DetectionResult, NewContentHash, NewDetectionLog, NewFileHash, NewSampleEmbeddingHash,
};
use crate::models::page_embedding::vector_to_le_bytes;
use crate::repository::{DetectionLogRepository, HashRepository};

const L2_STRATEGY: &str = "first_last_middle";
const L2_SAMPLE_BYTES_PER_PAGE: usize = 1024;
const L2_SAMPLE_MAX_BYTES: usize = 4096;

/// Outcome of running the cascade on one candidate upload.
#[derive(Debug, Clone)]
pub struct CascadeResult {
    pub matched_doc_id: Option<String>,
    pub layer: DetectionLayer,
    pub elapsed: Duration,
    pub l0_elapsed: Option<Duration>,
    pub l1_elapsed: Option<Duration>,
    pub l2_elapsed: Option<Duration>,
}

impl CascadeResult {
    pub fn is_duplicate(&self) -> bool {
        self.matched_doc_id.is_some()
    }
}

pub struct DuplicateDetector {
    hashes: HashRepository,
    detection_logs: DetectionLogRepository,
    embedder: Option<Arc<dyn Embedder>>,
}

impl DuplicateDetector {
    pub fn new(hashes: HashRepository, detection_logs: DetectionLogRepository, embedder: Option<Arc<dyn Embedder>>) -> Self {
        Self { hashes, detection_logs, embedder }
    }

    /// Run the full cascade against `file_path`. Always writes exactly one
    /// `DetectionLog` row, regardless of outcome.
    pub async fn check(&self, file_path: &Path, filename: &str) -> CascadeResult {
        let start = Instant::now();
        let file_size = tokio::fs::metadata(file_path).await.map(|m| m.len()).unwrap_or(0);
        let mut log = NewDetectionLog::new(filename, file_size as i64);

        let mut l0_elapsed = None;
        let mut l1_elapsed = None;
        let mut l2_elapsed = None;
        let mut matched: Option<(String, DetectionLayer)> = None;
        let mut had_error = false;

        // L0: file hash.
        let l0_start = Instant::now();
        match self.check_l0(file_path).await {
            Ok(Some(doc_id)) => matched = Some((doc_id, DetectionLayer::L0FileHash)),
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "L0 file-hash check failed, proceeding to L1");
                had_error = true;
            }
        }
        l0_elapsed = Some(l0_start.elapsed());

        // L1: content hash.
        if matched.is_none() {
            let l1_start = Instant::now();
            match self.check_l1(file_path).await {
                Ok(Some(doc_id)) => matched = Some((doc_id, DetectionLayer::L1ContentHash)),
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "L1 content-hash check failed, proceeding to L2");
                    had_error = true;
                }
            }
            l1_elapsed = Some(l1_start.elapsed());
        }

        // L2: sample-embedding hash.
        if matched.is_none() {
            let l2_start = Instant::now();
            match self.check_l2(file_path).await {
                Ok(Some(doc_id)) => matched = Some((doc_id, DetectionLayer::L2SampleEmbedding)),
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "L2 sample-embedding check failed");
                    had_error = true;
                }
            }
            l2_elapsed = Some(l2_start.elapsed());
        }

        let elapsed = start.elapsed();

        let (result_layer, result_kind, time_saved) = match &matched {
            Some((_, layer)) => {
                let saved = estimate_time_saved(file_size, elapsed);
                (*layer, DetectionResult::DuplicateFound, Some(saved))
            }
            None if had_error && l0_elapsed.is_some() && l1_elapsed.is_none() && l2_elapsed.is_none() => {
                // every layer failed before any produced a definitive miss
                (DetectionLayer::Error, DetectionResult::Error, None)
            }
            None => (DetectionLayer::None, DetectionResult::NoDuplicate, None),
        };

        log.result = result_kind.as_str().to_string();
        log.layer = result_layer.as_str().to_string();
        log.matched_doc_id = matched.as_ref().map(|(id, _)| id.clone());
        log.total_time_ms = elapsed.as_millis() as i64;
        log.l0_time_ms = l0_elapsed.map(|d| d.as_millis() as i64);
        log.l1_time_ms = l1_elapsed.map(|d| d.as_millis() as i64);
        log.l2_time_ms = l2_elapsed.map(|d| d.as_millis() as i64);
        log.estimated_time_saved_secs = time_saved;
        if let Err(e) = self.detection_logs.insert(&log) {
            warn!(error = %e, "failed to persist detection log");
        }

        CascadeResult {
            matched_doc_id: matched.map(|(id, _)| id),
            layer: result_layer,
            elapsed,
            l0_elapsed,
            l1_elapsed,
            l2_elapsed,
        }
    }

    async fn check_l0(&self, file_path: &Path) -> Result<Option<String>, DuplicateDetectorError> {
        let bytes = tokio::fs::read(file_path).await.map_err(|e| anyhow::anyhow!(e))?;
        let digest = format!("{:x}", md5::compute(&bytes));
        Ok(self.hashes.find_file_hash(&digest)?.map(|h| h.doc_id))
    }

    async fn check_l1(&self, file_path: &Path) -> Result<Option<String>, DuplicateDetectorError> {
        let path = file_path.to_path_buf();
        let (canonical, _info) = tokio::task::spawn_blocking(move || -> Result<_, anyhow::Error> {
            let info = extract::read_pdf_info(&path)?;
            let text = extract::extract_first_pages_text(&path, 3, 5000);
            let canonical = extract::canonical_string(&info, &text);
            Ok((canonical, info))
        })
        .await
        .map_err(|e| anyhow::anyhow!(e))??;

        let digest = format!("{:x}", Sha256::digest(canonical.as_bytes()));
        Ok(self.hashes.find_content_hash(&digest)?.map(|h| h.doc_id))
    }

    async fn check_l2(&self, file_path: &Path) -> Result<Option<String>, DuplicateDetectorError> {
        let Some(embedder) = &self.embedder else {
            return Ok(None);
        };
        let path = file_path.to_path_buf();
        let sample_text = tokio::task::spawn_blocking(move || sample_text_for(&path))
            .await
            .map_err(|e| anyhow::anyhow!(e))?;
        if sample_text.is_empty() {
            return Ok(None);
        }
        let vector = embedder.embed(&sample_text).await.map_err(|e| anyhow::anyhow!(e))?;
        let digest = sha256_of_vector(&vector);
        Ok(self.hashes.find_sample_embedding_hash(&digest, L2_STRATEGY)?.map(|h| h.doc_id))
    }

    /// Persist L0/L1/L2 hashes for a newly-ingested `doc_id`. `sample_vector`
    /// must be an already-computed embedding of the same `first_last_middle`
    /// sample text (e.g. derived from page embeddings the pipeline already
    /// produced) — this method never re-invokes the embedding analyzer.
    pub async fn record(
        &self,
        file_path: &Path,
        filename: &str,
        doc_id: &str,
        sample_vector: Option<(&str, &[f32])>,
    ) -> Result<[bool; 3], DuplicateDetectorError> {
        let bytes = tokio::fs::read(file_path).await.map_err(|e| anyhow::anyhow!(e))?;
        let mut ok = [false; 3];

        let md5_digest = format!("{:x}", md5::compute(&bytes));
        self.hashes.insert_file_hash(&NewFileHash::new(md5_digest, bytes.len() as i64, filename, doc_id))?;
        ok[0] = true;

        let path = file_path.to_path_buf();
        let info = tokio::task::spawn_blocking(move || extract::read_pdf_info(&path))
            .await
            .map_err(|e| anyhow::anyhow!(e))?
            .map_err(|e| anyhow::anyhow!(e))?;
        let path2 = file_path.to_path_buf();
        let text = tokio::task::spawn_blocking(move || extract::extract_first_pages_text(&path2, 3, 5000))
            .await
            .map_err(|e| anyhow::anyhow!(e))?;
        let canonical = extract::canonical_string(&info, &text);
        let content_digest = format!("{:x}", Sha256::digest(canonical.as_bytes()));
        self.hashes.insert_content_hash(&NewContentHash::new(
            content_digest,
            info.title.clone(),
            info.author.clone(),
            info.creator.clone(),
            text,
            info.page_count as i32,
            doc_id,
        ))?;
        ok[1] = true;

        if let Some((sample_text, vector)) = sample_vector {
            let digest = sha256_of_vector(vector);
            self.hashes.insert_sample_embedding_hash(&NewSampleEmbeddingHash::new(
                digest,
                L2_STRATEGY,
                sample_text,
                vector_to_le_bytes(vector),
                vector.len() as i32,
                self.embedder.as_ref().map(|e| e.model_name().to_string()).unwrap_or_default(),
                doc_id,
            ))?;
            ok[2] = true;
        }

        Ok(ok)
    }

    // --- Maintenance operations ---

    /// Count hash-cascade rows that point at a doc_id with no corresponding
    /// paper, without deleting anything — the read-only counterpart to
    /// [`Self::cleanup_orphaned`] for callers that only need to report on
    /// drift rather than correct it.
    pub fn count_orphaned(&self, paper_exists: impl Fn(&str) -> bool) -> Result<u64, DuplicateDetectorError> {
        let mut count = 0u64;
        for (_, doc_id) in self.hashes.all_file_hash_doc_ids()? {
            if !paper_exists(&doc_id) {
                count += 1;
            }
        }
        for (_, doc_id) in self.hashes.all_content_hash_doc_ids()? {
            if !paper_exists(&doc_id) {
                count += 1;
            }
        }
        for (_, _, doc_id) in self.hashes.all_sample_embedding_hash_doc_ids()? {
            if !paper_exists(&doc_id) {
                count += 1;
            }
        }
        Ok(count)
    }

    pub fn cleanup_orphaned(&self, paper_exists: impl Fn(&str) -> bool) -> Result<u64, DuplicateDetectorError> {
        let mut removed = 0u64;
        for (md5, doc_id) in self.hashes.all_file_hash_doc_ids()? {
            if !paper_exists(&doc_id) {
                removed += self.hashes.delete_file_hash(&md5)? as u64;
            }
        }
        for (digest, doc_id) in self.hashes.all_content_hash_doc_ids()? {
            if !paper_exists(&doc_id) {
                removed += self.hashes.delete_content_hash(&digest)? as u64;
            }
        }
        for (digest, strategy, doc_id) in self.hashes.all_sample_embedding_hash_doc_ids()? {
            if !paper_exists(&doc_id) {
                removed += self.hashes.delete_sample_embedding_hash(&digest, &strategy)? as u64;
            }
        }
        Ok(removed)
    }

    pub fn cleanup_logs(&self, older_than_days: i64) -> Result<usize, DuplicateDetectorError> {
        let cutoff = (Utc::now() - chrono::Duration::days(older_than_days)).to_rfc3339();
        Ok(self.detection_logs.delete_older_than(&cutoff)?)
    }

    /// For each paper with more than one hash row in a given layer, keep the
    /// newest by `created_at` and delete the rest. Per-layer: L0/L1 group by
    /// `doc_id` alone; L2 groups by `(doc_id, strategy)` since a paper could
    /// in principle carry sample-embedding hashes under more than one
    /// strategy in the future.
    pub fn cleanup_duplicates(&self) -> Result<u64, DuplicateDetectorError> {
        let mut removed = 0u64;

        let mut by_doc: std::collections::HashMap<String, Vec<(String, String)>> = std::collections::HashMap::new();
        for (md5, doc_id, created_at) in self.hashes.all_file_hash_rows()? {
            by_doc.entry(doc_id).or_default().push((md5, created_at));
        }
        for (_doc_id, mut rows) in by_doc {
            if rows.len() <= 1 {
                continue;
            }
            rows.sort_by(|a, b| a.1.cmp(&b.1));
            for (md5, _) in rows.into_iter().rev().skip(1) {
                removed += self.hashes.delete_file_hash(&md5)? as u64;
            }
        }

        let mut by_doc: std::collections::HashMap<String, Vec<(String, String)>> = std::collections::HashMap::new();
        for (digest, doc_id, created_at) in self.hashes.all_content_hash_rows()? {
            by_doc.entry(doc_id).or_default().push((digest, created_at));
        }
        for (_doc_id, mut rows) in by_doc {
            if rows.len() <= 1 {
                continue;
            }
            rows.sort_by(|a, b| a.1.cmp(&b.1));
            for (digest, _) in rows.into_iter().rev().skip(1) {
                removed += self.hashes.delete_content_hash(&digest)? as u64;
            }
        }

        let mut by_doc_strategy: std::collections::HashMap<(String, String), Vec<(String, String)>> = std::collections::HashMap::new();
        for (digest, strategy, doc_id, created_at) in self.hashes.all_sample_embedding_hash_rows()? {
            by_doc_strategy.entry((doc_id, strategy)).or_default().push((digest, created_at));
        }
        for ((_doc_id, strategy), mut rows) in by_doc_strategy {
            if rows.len() <= 1 {
                continue;
            }
            rows.sort_by(|a, b| a.1.cmp(&b.1));
            for (digest, _) in rows.into_iter().rev().skip(1) {
                removed += self.hashes.delete_sample_embedding_hash(&digest, &strategy)? as u64;
            }
        }

        Ok(removed)
    }

    /// Delete hash rows belonging to papers older than `older_than_days`
    /// that are not the `matched_doc_id` of any detection within the same
    /// window — per spec §4.2, these are hashes no longer doing useful
    /// duplicate-prevention work.
    pub fn cleanup_unused(&self, papers: &crate::repository::PaperRepository, older_than_days: i64) -> Result<u64, DuplicateDetectorError> {
        let cutoff = (Utc::now() - chrono::Duration::days(older_than_days)).to_rfc3339();
        let old_papers: std::collections::HashSet<String> = papers.doc_ids_created_before(&cutoff)?.into_iter().collect();
        let recently_matched: std::collections::HashSet<String> = self.detection_logs.matched_doc_ids_since(&cutoff)?.into_iter().collect();

        let unused = |doc_id: &str| old_papers.contains(doc_id) && !recently_matched.contains(doc_id);

        let mut removed = 0u64;
        for (md5, doc_id) in self.hashes.all_file_hash_doc_ids()? {
            if unused(&doc_id) {
                removed += self.hashes.delete_file_hash(&md5)? as u64;
            }
        }
        for (digest, doc_id) in self.hashes.all_content_hash_doc_ids()? {
            if unused(&doc_id) {
                removed += self.hashes.delete_content_hash(&digest)? as u64;
            }
        }
        for (digest, strategy, doc_id) in self.hashes.all_sample_embedding_hash_doc_ids()? {
            if unused(&doc_id) {
                removed += self.hashes.delete_sample_embedding_hash(&digest, &strategy)? as u64;
            }
        }
        Ok(removed)
    }

    pub fn stats(&self) -> Result<DuplicateStats, DuplicateDetectorError> {
        Ok(DuplicateStats {
            file_hashes_count: self.hashes.file_hashes_count()?,
            content_hashes_count: self.hashes.content_hashes_count()?,
            sample_embedding_hashes_count: self.hashes.sample_embedding_hashes_count()?,
            total_time_saved_minutes: self.detection_logs.total_time_saved_secs()? / 60.0,
            duplicates_found: self.detection_logs.count_by_result(DetectionResult::DuplicateFound.as_str())?,
            no_duplicate: self.detection_logs.count_by_result(DetectionResult::NoDuplicate.as_str())?,
        })
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct DuplicateStats {
    pub file_hashes_count: i64,
    pub content_hashes_count: i64,
    pub sample_embedding_hashes_count: i64,
    pub total_time_saved_minutes: f64,
    pub duplicates_found: i64,
    pub no_duplicate: i64,
}

/// `max(0, 60 + file_size_MiB * 20 - elapsed)` seconds, per spec §4.2.
fn estimate_time_saved(file_size_bytes: u64, elapsed: Duration) -> f64 {
    let mib = file_size_bytes as f64 / (1024.0 * 1024.0);
    let estimate = 60.0 + mib * 20.0 - elapsed.as_secs_f64();
    estimate.max(0.0)
}

fn sha256_of_vector(vector: &[f32]) -> String {
    format!("{:x}", Sha256::digest(vector_to_le_bytes(vector)))
}

fn sample_text_for(path: &Path) -> String {
    let info = match extract::read_pdf_info(path) {
        Ok(info) => info,
        Err(_) => return String::new(),
    };
    let pages = extract::first_last_middle_pages(info.page_count);
    if pages.is_empty() {
        return String::new();
    }
    let full_text = pdf_extract::extract_text(path).unwrap_or_default();
    let page_texts: Vec<&str> = full_text.split('\x0c').collect();

    let mut sample = String::new();
    for page in pages {
        if let Some(text) = page_texts.get((page - 1) as usize) {
            let truncated: String = text.chars().take(L2_SAMPLE_BYTES_PER_PAGE).collect();
            sample.push_str(&truncated);
        }
    }
    sample.chars().take(L2_SAMPLE_MAX_BYTES).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewPaper;
    use crate::repository::PaperRepository;

    #[test]
    fn time_saved_never_negative() {
        assert!(estimate_time_saved(1, Duration::from_secs(10_000)) >= 0.0);
    }

    #[test]
    fn time_saved_scales_with_size() {
        let small = estimate_time_saved(1024 * 1024, Duration::from_secs(1));
        let large = estimate_time_saved(50 * 1024 * 1024, Duration::from_secs(1));
        assert!(large > small);
    }

    fn detector(pool: crate::db::SqlitePool) -> DuplicateDetector {
        DuplicateDetector::new(HashRepository::new(pool.clone()), DetectionLogRepository::new(pool), None)
    }

    #[test]
    fn cleanup_duplicates_keeps_only_the_newest_row_per_paper() {
        let (pool, _dir) = crate::db::test_pool();
        let hashes = HashRepository::new(pool.clone());
        hashes.insert_file_hash(&NewFileHash::new("md5-old", 10, "a.pdf", "doc1")).unwrap();
        hashes.insert_file_hash(&NewFileHash::new("md5-new", 10, "a.pdf", "doc1")).unwrap();

        let d = detector(pool);
        let removed = d.cleanup_duplicates().unwrap();
        assert_eq!(removed, 1);
        assert_eq!(d.hashes.file_hashes_count().unwrap(), 1);
    }

    #[test]
    fn cleanup_unused_removes_hashes_of_old_unmatched_papers_only() {
        let (pool, _dir) = crate::db::test_pool();
        let papers = PaperRepository::new(pool.clone());
        let hashes = HashRepository::new(pool.clone());

        papers.insert(&NewPaper::new("old_unmatched", "a.pdf", "/tmp/a.pdf")).unwrap();
        papers.insert(&NewPaper::new("old_matched", "b.pdf", "/tmp/b.pdf")).unwrap();
        hashes.insert_file_hash(&NewFileHash::new("md5-a", 1, "a.pdf", "old_unmatched")).unwrap();
        hashes.insert_file_hash(&NewFileHash::new("md5-b", 1, "b.pdf", "old_matched")).unwrap();

        // Backdate both papers past the cutoff directly, since NewPaper::new
        // always stamps `now`.
        {
            use diesel::prelude::*;
            let mut conn = pool.get().unwrap();
            let ancient = (Utc::now() - chrono::Duration::days(400)).to_rfc3339();
            diesel::update(crate::schema::papers::table)
                .set(crate::schema::papers::created_at.eq(&ancient))
                .execute(&mut conn)
                .unwrap();
        }

        let detection_logs = DetectionLogRepository::new(pool.clone());
        let mut log = NewDetectionLog::new("b.pdf", 1);
        log.result = DetectionResult::DuplicateFound.as_str().to_string();
        log.layer = DetectionLayer::L0FileHash.as_str().to_string();
        log.matched_doc_id = Some("old_matched".to_string());
        detection_logs.insert(&log).unwrap();

        let d = DuplicateDetector::new(hashes, detection_logs, None);
        let removed = d.cleanup_unused(&papers, 30).unwrap();
        assert_eq!(removed, 1);
        assert!(d.hashes.find_file_hash("md5-a").unwrap().is_none());
        assert!(d.hashes.find_file_hash("md5-b").unwrap().is_some());
    }
}
