use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatLevel {
    Safe,
    Medium,
    High,
    Critical,
}

/// Checks performed by [`super::FileValidator::validate`], in canonical
/// order. `checks_performed` on a report is always a prefix of this list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Check {
    RateLimit,
    FilenameHygiene,
    Size,
    Mime,
    Signature,
    Sha256,
    ContentScan,
    PdfStructure,
    PdfSemantic,
}

impl Check {
    /// The canonical, full ordering of checks.
    pub const ORDER: [Check; 9] = [
        Check::RateLimit,
        Check::FilenameHygiene,
        Check::Size,
        Check::Mime,
        Check::Signature,
        Check::Sha256,
        Check::ContentScan,
        Check::PdfStructure,
        Check::PdfSemantic,
    ];
}

/// Result of validating one upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub detected_mime: String,
    pub sha256: String,
    pub threat_level: ThreatLevel,
    pub warnings: Vec<String>,
    pub checks_performed: Vec<Check>,
    pub quarantined: bool,
    pub page_count: Option<u32>,
    pub encrypted: bool,
    pub has_forms: bool,
    pub has_javascript: bool,
    pub has_attachments: bool,
}

/// JSON sidecar written alongside a quarantined file, mirroring the
/// original implementation's `file_security.py` sidecar shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuarantineRecord {
    pub original_filename: String,
    pub quarantined_at: DateTime<Utc>,
    pub report: ValidationReport,
}
