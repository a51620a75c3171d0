//! Aggregate statistics shape returned by [`super::PerformanceMonitor::stats`].
//! A typed replacement for the original implementation's nested dict —
//! callers get compile-time field names instead of string keys.

use std::collections::HashMap;

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct JobStats {
    pub total_completed: usize,
    pub completed_last_hour: usize,
    pub completed_today: usize,
    pub currently_active: usize,
    pub success_rate_overall: f64,
    pub success_rate_last_hour: f64,
    pub success_rate_today: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DurationStats {
    pub average_duration_seconds: f64,
    pub average_duration_last_hour: f64,
    pub median_duration_seconds: f64,
    pub fastest_job_seconds: Option<f64>,
    pub slowest_job_seconds: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepStats {
    pub average_duration_secs: f64,
    pub min_duration_secs: f64,
    pub max_duration_secs: f64,
    pub success_count: u64,
    pub failure_count: u64,
    pub success_rate: f64,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct ResourceStats {
    pub cpu_current: Option<f64>,
    pub cpu_average_1h: Option<f64>,
    pub cpu_peak_1h: Option<f64>,
    pub memory_current_percent: Option<f64>,
    pub memory_current_used_mb: Option<f64>,
    pub memory_average_percent_1h: Option<f64>,
    pub memory_peak_percent_1h: Option<f64>,
    pub disk_current_percent: Option<f64>,
    pub disk_free_mb: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Unknown,
    Excellent,
    Good,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemHealth {
    pub status: HealthStatus,
    pub overall_score: f64,
    pub cpu_health: f64,
    pub memory_health: f64,
    pub disk_health: f64,
    pub active_jobs: usize,
}

impl SystemHealth {
    pub fn unknown(active_jobs: usize) -> Self {
        Self { status: HealthStatus::Unknown, overall_score: 0.0, cpu_health: 0.0, memory_health: 0.0, disk_health: 0.0, active_jobs }
    }

    /// `status` buckets from `overall_score`, per the specification: >=80
    /// excellent, >=60 good, >=40 warning, else critical.
    pub fn from_health_scores(cpu_health: f64, memory_health: f64, disk_health: f64, active_jobs: usize) -> Self {
        let overall_score = (cpu_health + memory_health + disk_health) / 3.0;
        let status = if overall_score >= 80.0 {
            HealthStatus::Excellent
        } else if overall_score >= 60.0 {
            HealthStatus::Good
        } else if overall_score >= 40.0 {
            HealthStatus::Warning
        } else {
            HealthStatus::Critical
        };
        Self { status, overall_score, cpu_health, memory_health, disk_health, active_jobs }
    }
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct ErrorBreakdown {
    pub total_errors: usize,
    pub error_rate: f64,
    /// Categorized by a substring match over the job's error message:
    /// `timeout`, `network`, `memory`, `permission`, or `other`.
    pub error_types: HashMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActiveJobDetail {
    pub job_id: String,
    pub filename: String,
    pub current_step: String,
    pub runtime_secs: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceStats {
    pub jobs: JobStats,
    pub performance: DurationStats,
    pub steps: HashMap<String, StepStats>,
    pub resources: ResourceStats,
    pub system: SystemHealth,
    pub errors: ErrorBreakdown,
    pub active_jobs_details: Vec<ActiveJobDetail>,
}

pub fn success_rate(successes: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        (successes as f64 / total as f64) * 100.0
    }
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Median of an unsorted slice; does not mutate the caller's copy.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len();
    if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    }
}

/// Error-message substring categorization, mirroring the original
/// implementation's bucket order (first match wins).
pub fn categorize_error(message: &str) -> &'static str {
    let lower = message.to_lowercase();
    if lower.contains("timeout") {
        "timeout"
    } else if lower.contains("connection") || lower.contains("network") {
        "network"
    } else if lower.contains("memory") || lower.contains("oom") {
        "memory"
    } else if lower.contains("permission") || lower.contains("access") {
        "permission"
    } else {
        "other"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_handles_even_and_odd_counts() {
        assert_eq!(median(&[1.0, 2.0, 3.0]), 2.0);
        assert_eq!(median(&[1.0, 2.0, 3.0, 4.0]), 2.5);
        assert_eq!(median(&[]), 0.0);
    }

    #[test]
    fn health_buckets_match_thresholds() {
        assert_eq!(SystemHealth::from_health_scores(90.0, 90.0, 90.0, 0).status, HealthStatus::Excellent);
        assert_eq!(SystemHealth::from_health_scores(65.0, 65.0, 65.0, 0).status, HealthStatus::Good);
        assert_eq!(SystemHealth::from_health_scores(45.0, 45.0, 45.0, 0).status, HealthStatus::Warning);
        assert_eq!(SystemHealth::from_health_scores(10.0, 10.0, 10.0, 0).status, HealthStatus::Critical);
    }

    #[test]
    fn error_categorization_matches_first_substring() {
        assert_eq!(categorize_error("request timed out waiting for OCR"), "timeout");
        assert_eq!(categorize_error("connection refused"), "network");
        assert_eq!(categorize_error("out of memory (oom killer)"), "memory");
        assert_eq!(categorize_error("permission denied"), "permission");
        assert_eq!(categorize_error("unexpected null pointer"), "other");
    }
}
