//! Tagged sum types replacing the original implementation's dynamic,
//! deeply-nested result dictionaries (Design Notes §9).

use serde::Serialize;

use crate::models::DetectionLayer;

/// Outcome of a single pipeline stage.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    Skipped { reason: String },
    Failed { cause: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub name: &'static str,
    pub status: StepStatus,
}

impl StepOutcome {
    pub fn completed(name: &'static str) -> Self {
        Self { name, status: StepStatus::Completed }
    }
    pub fn skipped(name: &'static str, reason: impl Into<String>) -> Self {
        Self { name, status: StepStatus::Skipped { reason: reason.into() } }
    }
    pub fn failed(name: &'static str, cause: impl Into<String>) -> Self {
        Self { name, status: StepStatus::Failed { cause: cause.into() } }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, StepStatus::Failed { .. })
    }
}

/// Final shape of one `Pipeline::run` invocation.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineResult {
    /// The duplicate-detection cascade (step 1) or the embedding-similarity
    /// check (step 5) matched an existing document; no new artifacts were
    /// written for the cascade-hit case (step 1). See `DESIGN.md` for the
    /// step-5 redirection policy.
    Duplicate {
        existing_doc_id: String,
        layer: String,
        elapsed_ms: u64,
    },
    Completed {
        doc_id: String,
        stages: Vec<StepOutcome>,
        warnings: Vec<String>,
    },
    Failed {
        doc_id: Option<String>,
        reason: String,
        stages_done: Vec<StepOutcome>,
    },
}

impl PipelineResult {
    pub fn from_cascade(existing_doc_id: String, layer: DetectionLayer, elapsed: std::time::Duration) -> Self {
        Self::Duplicate { existing_doc_id, layer: layer.as_str().to_string(), elapsed_ms: elapsed.as_millis() as u64 }
    }
}
