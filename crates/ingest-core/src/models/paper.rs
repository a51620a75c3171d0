use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::papers;

/// OCR quality label assigned to a [`Paper`] by the (optional) quality
/// analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrQualityLabel {
    Unknown,
    Poor,
    Fair,
    Good,
    Excellent,
}

impl OcrQualityLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Poor => "poor",
            Self::Fair => "fair",
            Self::Good => "good",
            Self::Excellent => "excellent",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "poor" => Self::Poor,
            "fair" => Self::Fair,
            "good" => Self::Good,
            "excellent" => Self::Excellent,
            _ => Self::Unknown,
        }
    }
}

/// Canonical artifact: a paper ingested into the corpus. A row exists iff
/// its stored PDF exists (enforced by the Pipeline, never by a DB
/// constraint, since the file lives outside the relational store).
#[derive(Debug, Clone, Queryable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = papers)]
pub struct Paper {
    /// Internal auto-incrementing row id; distinct from the stable `doc_id`.
    pub id: i32,
    pub doc_id: String,
    pub filename: String,
    pub stored_path: String,
    pub extracted_text: String,
    pub ocr_quality_label: String,
    pub content_id: Option<String>,
    pub ocr_quality_completed: bool,
    pub layout_completed: bool,
    pub metadata_llm_completed: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Paper {
    pub fn quality_label(&self) -> OcrQualityLabel {
        OcrQualityLabel::from_str(&self.ocr_quality_label)
    }

    pub fn created_at_utc(&self) -> DateTime<Utc> {
        self.created_at
            .parse()
            .unwrap_or_else(|_| Utc::now())
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = papers)]
pub struct NewPaper {
    pub doc_id: String,
    pub filename: String,
    pub stored_path: String,
    pub extracted_text: String,
    pub ocr_quality_label: String,
    pub content_id: Option<String>,
    pub ocr_quality_completed: bool,
    pub layout_completed: bool,
    pub metadata_llm_completed: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl NewPaper {
    pub fn new(doc_id: impl Into<String>, filename: impl Into<String>, stored_path: impl Into<String>) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            doc_id: doc_id.into(),
            filename: filename.into(),
            stored_path: stored_path.into(),
            extracted_text: String::new(),
            ocr_quality_label: OcrQualityLabel::Unknown.as_str().to_string(),
            content_id: None,
            ocr_quality_completed: false,
            layout_completed: false,
            metadata_llm_completed: false,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}
