//! JobStore (C3): persists job records and progress, and enforces the job
//! state machine (`queued -> processing -> {completed, failed, cancelled}`).
//!
//! Reads are served from an in-process `RwLock<HashMap<...>>` cache kept in
//! sync with every write, mirroring the teacher's `rate_limit::memory`
//! read-through pattern — so status polls under load don't round-trip the
//! database.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::models::{Job, JobStatus, NewJob};
use crate::repository::JobRepository;

#[derive(Debug, Error)]
pub enum JobStoreError {
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("job not found: {0}")]
    NotFound(String),
    #[error("invalid transition from {from:?} to {attempted}")]
    InvalidTransition { from: JobStatus, attempted: &'static str },
}

#[derive(Clone)]
pub struct JobStore {
    repo: JobRepository,
    cache: Arc<RwLock<HashMap<String, Job>>>,
}

impl JobStore {
    pub fn new(repo: JobRepository) -> Self {
        Self { repo, cache: Arc::new(RwLock::new(HashMap::new())) }
    }

    /// Create a new job in `queued` state, progress 0.
    pub async fn create(&self, job_id: &str, filename: &str, source_path: &str) -> Result<Job, JobStoreError> {
        let new_job = NewJob::new(job_id, filename, source_path);
        let job = self.repo.insert(&new_job)?;
        self.cache.write().await.insert(job.job_id.clone(), job.clone());
        Ok(job)
    }

    pub async fn get(&self, job_id: &str) -> Result<Option<Job>, JobStoreError> {
        if let Some(job) = self.cache.read().await.get(job_id) {
            return Ok(Some(job.clone()));
        }
        let job = self.repo.by_job_id(job_id)?;
        if let Some(job) = &job {
            self.cache.write().await.insert(job.job_id.clone(), job.clone());
        }
        Ok(job)
    }

    async fn mutate(&self, job_id: &str, f: impl FnOnce(&mut Job)) -> Result<Job, JobStoreError> {
        let mut job = self.get(job_id).await?.ok_or_else(|| JobStoreError::NotFound(job_id.to_string()))?;
        f(&mut job);
        self.repo.save(&job)?;
        self.cache.write().await.insert(job.job_id.clone(), job.clone());
        Ok(job)
    }

    /// `queued -> processing`.
    pub async fn start(&self, job_id: &str) -> Result<Job, JobStoreError> {
        let current = self.get(job_id).await?.ok_or_else(|| JobStoreError::NotFound(job_id.to_string()))?;
        if current.status() != JobStatus::Queued {
            return Err(JobStoreError::InvalidTransition { from: current.status(), attempted: "processing" });
        }
        self.mutate(job_id, |job| {
            job.status = JobStatus::Processing.as_str().to_string();
            job.started_at = Some(Utc::now().to_rfc3339());
        })
        .await
    }

    /// Record progress on a `processing` job: current step name, percent
    /// complete, and whether the step succeeded or failed.
    pub async fn step(&self, job_id: &str, step_name: &str, progress_percent: i32, failed: bool) -> Result<Job, JobStoreError> {
        self.mutate(job_id, |job| {
            job.current_step = Some(step_name.to_string());
            job.progress_percent = progress_percent;
            let mut list = if failed { job.steps_failed_vec() } else { job.steps_completed_vec() };
            list.push(step_name.to_string());
            let encoded = serde_json::to_string(&list).unwrap_or_else(|_| "[]".to_string());
            if failed {
                job.steps_failed = encoded;
            } else {
                job.steps_completed = encoded;
            }
        })
        .await
    }

    /// `processing -> completed`.
    pub async fn finish_ok(&self, job_id: &str, paper_id: &str, result_summary: &serde_json::Value) -> Result<Job, JobStoreError> {
        self.mutate(job_id, |job| {
            job.status = JobStatus::Completed.as_str().to_string();
            job.paper_id = Some(paper_id.to_string());
            job.result_summary = Some(result_summary.to_string());
            job.progress_percent = 100;
            job.completed_at = Some(Utc::now().to_rfc3339());
        })
        .await
    }

    /// `processing -> failed`.
    pub async fn finish_err(&self, job_id: &str, error_message: &str) -> Result<Job, JobStoreError> {
        self.mutate(job_id, |job| {
            job.status = JobStatus::Failed.as_str().to_string();
            job.error_message = Some(error_message.to_string());
            job.completed_at = Some(Utc::now().to_rfc3339());
        })
        .await
    }

    /// `queued -> cancelled`. Running jobs cannot be cancelled through this
    /// call — the caller (JobQueue) only invokes it for jobs it was able to
    /// remove from the pending queue.
    pub async fn cancel(&self, job_id: &str) -> Result<Job, JobStoreError> {
        let current = self.get(job_id).await?.ok_or_else(|| JobStoreError::NotFound(job_id.to_string()))?;
        if current.status() != JobStatus::Queued {
            return Err(JobStoreError::InvalidTransition { from: current.status(), attempted: "cancelled" });
        }
        self.mutate(job_id, |job| {
            job.status = JobStatus::Cancelled.as_str().to_string();
            job.completed_at = Some(Utc::now().to_rfc3339());
        })
        .await
    }

    /// Administrative cleanup: delete job rows older than `days_old`,
    /// evicting them from the cache too.
    pub async fn cleanup_older_than(&self, days_old: i64) -> Result<usize, JobStoreError> {
        let cutoff = (Utc::now() - chrono::Duration::days(days_old)).to_rfc3339();
        let deleted = self.repo.delete_older_than(&cutoff)?;
        self.cache.write().await.retain(|_, job| job.created_at >= cutoff);
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn test_store() -> (JobStore, tempfile::TempDir) {
        let (pool, dir) = db::test_pool();
        (JobStore::new(JobRepository::new(pool)), dir)
    }

    #[tokio::test]
    async fn state_machine_happy_path() {
        let (store, _dir) = test_store();
        store.create("job1", "f.pdf", "/tmp/f.pdf").await.unwrap();
        let job = store.start("job1").await.unwrap();
        assert_eq!(job.status(), JobStatus::Processing);
        assert!(job.started_at.is_some());

        store.step("job1", "duplicate_detection", 5, false).await.unwrap();
        let job = store.finish_ok("job1", "doc1", &serde_json::json!({"ok": true})).await.unwrap();
        assert_eq!(job.status(), JobStatus::Completed);
        assert_eq!(job.paper_id.as_deref(), Some("doc1"));
        assert_eq!(job.progress_percent, 100);
    }

    #[tokio::test]
    async fn cancel_only_allowed_while_queued() {
        let (store, _dir) = test_store();
        store.create("job1", "f.pdf", "/tmp/f.pdf").await.unwrap();
        store.start("job1").await.unwrap();
        let err = store.cancel("job1").await.unwrap_err();
        assert!(matches!(err, JobStoreError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn cancel_transitions_queued_job() {
        let (store, _dir) = test_store();
        store.create("job2", "f.pdf", "/tmp/f.pdf").await.unwrap();
        let job = store.cancel("job2").await.unwrap();
        assert_eq!(job.status(), JobStatus::Cancelled);
    }
}
