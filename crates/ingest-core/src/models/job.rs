use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::jobs;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "processing" => Self::Processing,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "cancelled" => Self::Cancelled,
            _ => Self::Queued,
        }
    }
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = jobs)]
pub struct Job {
    pub id: i32,
    pub job_id: String,
    pub filename: String,
    pub source_path: String,
    pub status: String,
    pub current_step: Option<String>,
    pub progress_percent: i32,
    /// JSON-encoded `Vec<String>`.
    pub steps_completed: String,
    /// JSON-encoded `Vec<String>`.
    pub steps_failed: String,
    pub error_message: Option<String>,
    /// JSON-encoded free-form summary.
    pub result_summary: Option<String>,
    pub paper_id: Option<String>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

impl Job {
    pub fn status(&self) -> JobStatus {
        JobStatus::from_str(&self.status)
    }

    pub fn steps_completed_vec(&self) -> Vec<String> {
        serde_json::from_str(&self.steps_completed).unwrap_or_default()
    }

    pub fn steps_failed_vec(&self) -> Vec<String> {
        serde_json::from_str(&self.steps_failed).unwrap_or_default()
    }

    pub fn result_summary_value(&self) -> Option<serde_json::Value> {
        self.result_summary
            .as_ref()
            .and_then(|s| serde_json::from_str(s).ok())
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = jobs)]
pub struct NewJob {
    pub job_id: String,
    pub filename: String,
    pub source_path: String,
    pub status: String,
    pub current_step: Option<String>,
    pub progress_percent: i32,
    pub steps_completed: String,
    pub steps_failed: String,
    pub error_message: Option<String>,
    pub result_summary: Option<String>,
    pub paper_id: Option<String>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

impl NewJob {
    pub fn new(job_id: impl Into<String>, filename: impl Into<String>, source_path: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            filename: filename.into(),
            source_path: source_path.into(),
            status: JobStatus::Queued.as_str().to_string(),
            current_step: None,
            progress_percent: 0,
            steps_completed: "[]".to_string(),
            steps_failed: "[]".to_string(),
            error_message: None,
            result_summary: None,
            paper_id: None,
            created_at: Utc::now().to_rfc3339(),
            started_at: None,
            completed_at: None,
        }
    }
}
