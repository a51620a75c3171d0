use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::detection_logs;

/// Which cascade layer produced a detection result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionLayer {
    L0FileHash,
    L1ContentHash,
    L2SampleEmbedding,
    None,
    Error,
}

impl DetectionLayer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::L0FileHash => "Level_0_File_Hash",
            Self::L1ContentHash => "Level_1_Content_Hash",
            Self::L2SampleEmbedding => "Level_2_Sample_Embedding",
            Self::None => "none",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionResult {
    DuplicateFound,
    NoDuplicate,
    Error,
}

impl DetectionResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DuplicateFound => "duplicate_found",
            Self::NoDuplicate => "no_duplicate",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = detection_logs, primary_key(detection_id))]
pub struct DetectionLog {
    pub detection_id: String,
    pub filename: String,
    pub file_size: i64,
    pub result: String,
    pub layer: String,
    pub matched_doc_id: Option<String>,
    pub total_time_ms: i64,
    pub l0_time_ms: Option<i64>,
    pub l1_time_ms: Option<i64>,
    pub l2_time_ms: Option<i64>,
    pub estimated_time_saved_secs: Option<f64>,
    pub error_message: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Insertable, Default)]
#[diesel(table_name = detection_logs)]
pub struct NewDetectionLog {
    pub detection_id: String,
    pub filename: String,
    pub file_size: i64,
    pub result: String,
    pub layer: String,
    pub matched_doc_id: Option<String>,
    pub total_time_ms: i64,
    pub l0_time_ms: Option<i64>,
    pub l1_time_ms: Option<i64>,
    pub l2_time_ms: Option<i64>,
    pub estimated_time_saved_secs: Option<f64>,
    pub error_message: Option<String>,
    pub created_at: String,
}

impl NewDetectionLog {
    pub fn new(filename: impl Into<String>, file_size: i64) -> Self {
        Self {
            detection_id: Uuid::new_v4().to_string(),
            filename: filename.into(),
            file_size,
            result: DetectionResult::NoDuplicate.as_str().to_string(),
            layer: DetectionLayer::None.as_str().to_string(),
            created_at: Utc::now().to_rfc3339(),
            ..Default::default()
        }
    }
}
