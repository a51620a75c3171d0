//! PerformanceMonitor (C6): per-job metrics, a rolling sample of system
//! metrics, and aggregate statistics/export.
//!
//! Generalizes the original implementation's singleton-plus-background-
//! thread shape to a struct the caller owns, sampled by a spawned tokio
//! task — the same "spawn a task, stop it with a Notify" idiom the
//! JobQueue worker loop uses.

mod export;
mod stats;

pub use export::ExportFormat;
pub use stats::{
    ActiveJobDetail, DurationStats, ErrorBreakdown, HealthStatus, JobStats, PerformanceStats, ResourceStats, StepStats, SystemHealth,
};

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sysinfo::{Disks, System};
use tokio::sync::{Mutex, Notify, RwLock};
use tracing::{info, warn};

use crate::config::IngestConfig;

/// Additional measurements a completed pipeline run can report; fields left
/// `None` simply don't appear in aggregate stats, mirroring the original
/// implementation's "extract what's present" behavior.
#[derive(Debug, Clone, Default)]
pub struct JobResultMetrics {
    pub page_count: Option<u32>,
    pub ocr_quality_score: Option<f64>,
    pub embedding_dimension: Option<usize>,
    pub bytes_read: Option<u64>,
    pub bytes_written: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobMetrics {
    pub job_id: String,
    pub filename: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_secs: Option<f64>,
    pub success: bool,
    pub error_message: Option<String>,
    pub steps_completed: Vec<String>,
    pub steps_failed: Vec<String>,
    pub step_durations_secs: HashMap<String, f64>,
    pub peak_memory_mb: Option<f64>,
    pub peak_cpu_percent: Option<f64>,
    pub file_size_mb: Option<f64>,
    pub page_count: Option<u32>,
    pub ocr_quality_score: Option<f64>,
    pub embedding_dimension: Option<usize>,
    pub bytes_read: Option<u64>,
    pub bytes_written: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub timestamp: DateTime<Utc>,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub memory_used_mb: f64,
    pub memory_available_mb: f64,
    pub disk_usage_percent: f64,
    pub disk_free_mb: f64,
    pub active_jobs: usize,
    pub load_average_1m: Option<f64>,
}

/// Bookkeeping for an in-flight job kept separate from [`JobMetrics`], so
/// the latter stays a plain data record (mirrors the original's split
/// between `job_metrics` and `active_jobs`).
struct ActiveJobInfo {
    current_step: Option<String>,
    step_started: Instant,
}

struct SystemSampler {
    sys: System,
}

impl SystemSampler {
    fn new() -> Self {
        Self { sys: System::new_all() }
    }

    fn sample(&mut self, active_jobs: usize) -> SystemMetrics {
        self.sys.refresh_cpu_usage();
        self.sys.refresh_memory();

        let total_memory = self.sys.total_memory() as f64;
        let used_memory = self.sys.used_memory() as f64;
        let memory_percent = if total_memory > 0.0 { used_memory / total_memory * 100.0 } else { 0.0 };

        let disks = Disks::new_with_refreshed_list();
        let (disk_usage_percent, disk_free_mb) = disks
            .iter()
            .find(|d| d.mount_point() == std::path::Path::new("/"))
            .or_else(|| disks.iter().next())
            .map(|d| {
                let total = d.total_space() as f64;
                let available = d.available_space() as f64;
                let used_percent = if total > 0.0 { (total - available) / total * 100.0 } else { 0.0 };
                (used_percent, available / (1024.0 * 1024.0))
            })
            .unwrap_or((0.0, 0.0));

        SystemMetrics {
            timestamp: Utc::now(),
            cpu_percent: self.sys.global_cpu_usage() as f64,
            memory_percent,
            memory_used_mb: used_memory / (1024.0 * 1024.0),
            memory_available_mb: self.sys.available_memory() as f64 / (1024.0 * 1024.0),
            disk_usage_percent,
            disk_free_mb,
            active_jobs,
            load_average_1m: Some(System::load_average().one),
        }
    }

    /// Best-effort snapshot of this process's own memory/CPU, used as the
    /// (simplified) "peak" usage recorded against a just-completed job.
    fn current_process_usage(&mut self) -> (Option<f64>, Option<f64>) {
        let Some(pid) = sysinfo::get_current_pid().ok() else {
            return (None, None);
        };
        self.sys.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[pid]), true);
        let Some(process) = self.sys.process(pid) else {
            return (None, None);
        };
        let memory_mb = process.memory() as f64 / (1024.0 * 1024.0);
        let cpu_percent = process.cpu_usage() as f64;
        (Some(memory_mb), Some(cpu_percent))
    }
}

/// Owns all monitoring state. Construct with [`PerformanceMonitor::spawn`]
/// to also start the background system-metrics sampler; `shutdown` stops
/// it.
pub struct PerformanceMonitor {
    job_metrics: RwLock<HashMap<String, JobMetrics>>,
    active_jobs: RwLock<HashMap<String, ActiveJobInfo>>,
    completed_jobs: RwLock<VecDeque<JobMetrics>>,
    system_metrics: RwLock<VecDeque<SystemMetrics>>,
    sampler: Mutex<SystemSampler>,
    max_job_metrics: usize,
    system_metrics_retention: usize,
    sample_interval: Duration,
    stats_cache: RwLock<Option<(Instant, PerformanceStats)>>,
    stats_cache_ttl: Duration,
    shutdown: Notify,
}

impl PerformanceMonitor {
    /// Construct and start the background system-metrics sampling loop.
    pub fn spawn(config: &IngestConfig) -> Arc<Self> {
        let monitor = Arc::new(Self {
            job_metrics: RwLock::new(HashMap::new()),
            active_jobs: RwLock::new(HashMap::new()),
            completed_jobs: RwLock::new(VecDeque::with_capacity(64)),
            system_metrics: RwLock::new(VecDeque::with_capacity(config.system_metrics_retention)),
            sampler: Mutex::new(SystemSampler::new()),
            max_job_metrics: 1000,
            system_metrics_retention: config.system_metrics_retention,
            sample_interval: Duration::from_secs(config.system_metrics_interval_secs.max(1)),
            stats_cache: RwLock::new(None),
            stats_cache_ttl: Duration::from_secs(60),
            shutdown: Notify::new(),
        });
        monitor.clone().spawn_sampling_loop();
        monitor
    }

    fn spawn_sampling_loop(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.sample_interval);
            info!(interval_secs = self.sample_interval.as_secs(), "performance monitor sampling started");
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        self.sample_system().await;
                    }
                    _ = self.shutdown.notified() => {
                        info!("performance monitor sampling stopped");
                        return;
                    }
                }
            }
        });
    }

    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }

    async fn sample_system(&self) {
        let active = self.active_jobs.read().await.len();
        let sample = self.sampler.lock().await.sample(active);
        let mut metrics = self.system_metrics.write().await;
        metrics.push_back(sample);
        while metrics.len() > self.system_metrics_retention {
            metrics.pop_front();
        }
    }

    pub async fn start_job_tracking(&self, job_id: &str, filename: &str, file_size_mb: Option<f64>) {
        let metrics = JobMetrics {
            job_id: job_id.to_string(),
            filename: filename.to_string(),
            start_time: Utc::now(),
            end_time: None,
            duration_secs: None,
            success: true,
            error_message: None,
            steps_completed: Vec::new(),
            steps_failed: Vec::new(),
            step_durations_secs: HashMap::new(),
            peak_memory_mb: None,
            peak_cpu_percent: None,
            file_size_mb,
            page_count: None,
            ocr_quality_score: None,
            embedding_dimension: None,
            bytes_read: None,
            bytes_written: None,
        };
        self.job_metrics.write().await.insert(job_id.to_string(), metrics);
        self.active_jobs.write().await.insert(job_id.to_string(), ActiveJobInfo { current_step: None, step_started: Instant::now() });
    }

    /// Record the duration of the previous step (if any) and move to `step`.
    pub async fn update_job_step(&self, job_id: &str, step: &str) {
        let mut active = self.active_jobs.write().await;
        let Some(info) = active.get_mut(job_id) else {
            return;
        };
        if let Some(prev_step) = info.current_step.take() {
            let duration = info.step_started.elapsed().as_secs_f64();
            if let Some(metrics) = self.job_metrics.write().await.get_mut(job_id) {
                metrics.step_durations_secs.insert(prev_step, duration);
            }
        }
        info.current_step = Some(step.to_string());
        info.step_started = Instant::now();
    }

    pub async fn complete_job(&self, job_id: &str, success: bool, error_message: Option<String>, result: Option<JobResultMetrics>) {
        let Some(mut metrics) = self.job_metrics.write().await.remove(job_id) else {
            warn!(job_id, "complete_job called for a job not under tracking");
            return;
        };
        self.active_jobs.write().await.remove(job_id);

        let now = Utc::now();
        metrics.end_time = Some(now);
        metrics.duration_secs = Some((now - metrics.start_time).num_milliseconds() as f64 / 1000.0);
        metrics.success = success;
        metrics.error_message = error_message;

        if let Some(result) = result {
            metrics.page_count = result.page_count;
            metrics.ocr_quality_score = result.ocr_quality_score;
            metrics.embedding_dimension = result.embedding_dimension;
            metrics.bytes_read = result.bytes_read;
            metrics.bytes_written = result.bytes_written;
        }

        let (peak_memory_mb, peak_cpu_percent) = self.sampler.lock().await.current_process_usage();
        metrics.peak_memory_mb = peak_memory_mb;
        metrics.peak_cpu_percent = peak_cpu_percent;

        info!(job_id, success, duration_secs = metrics.duration_secs, "job completed, metrics recorded");

        let mut completed = self.completed_jobs.write().await;
        completed.push_back(metrics);
        while completed.len() > self.max_job_metrics {
            completed.pop_front();
        }

        *self.stats_cache.write().await = None;
    }

    pub async fn get_performance_stats(&self, force_refresh: bool) -> PerformanceStats {
        if !force_refresh {
            if let Some((cached_at, stats)) = &*self.stats_cache.read().await {
                if cached_at.elapsed() < self.stats_cache_ttl {
                    return stats.clone();
                }
            }
        }
        let stats = self.calculate_performance_stats().await;
        *self.stats_cache.write().await = Some((Instant::now(), stats.clone()));
        stats
    }

    async fn calculate_performance_stats(&self) -> PerformanceStats {
        let now = Utc::now();
        let hour_ago = now - chrono::Duration::hours(1);
        let day_ago = now - chrono::Duration::hours(24);

        let completed: Vec<JobMetrics> = self.completed_jobs.read().await.iter().cloned().collect();
        let recent: Vec<&JobMetrics> = completed.iter().filter(|j| j.start_time > hour_ago).collect();
        let today: Vec<&JobMetrics> = completed.iter().filter(|j| j.start_time > day_ago).collect();
        let active_count = self.active_jobs.read().await.len();

        let jobs = JobStats {
            total_completed: completed.len(),
            completed_last_hour: recent.len(),
            completed_today: today.len(),
            currently_active: active_count,
            success_rate_overall: stats::success_rate(completed.iter().filter(|j| j.success).count(), completed.len()),
            success_rate_last_hour: stats::success_rate(recent.iter().filter(|j| j.success).count(), recent.len()),
            success_rate_today: stats::success_rate(today.iter().filter(|j| j.success).count(), today.len()),
        };

        let all_durations: Vec<f64> = completed.iter().filter_map(|j| j.duration_secs).collect();
        let recent_durations: Vec<f64> = recent.iter().filter_map(|j| j.duration_secs).collect();
        let performance = DurationStats {
            average_duration_seconds: stats::mean(&all_durations),
            average_duration_last_hour: stats::mean(&recent_durations),
            median_duration_seconds: stats::median(&all_durations),
            fastest_job_seconds: all_durations.iter().cloned().fold(None, |acc, d| Some(acc.map_or(d, |m: f64| m.min(d)))),
            slowest_job_seconds: all_durations.iter().cloned().fold(None, |acc, d| Some(acc.map_or(d, |m: f64| m.max(d)))),
        };

        let steps = self.analyze_step_performance(&completed);
        let resources = self.analyze_resource_usage().await;
        let system = self.calculate_system_health(active_count).await;
        let errors = Self::analyze_errors(&today);
        let active_jobs_details = self.active_job_details().await;

        PerformanceStats { jobs, performance, steps, resources, system, errors, active_jobs_details }
    }

    fn analyze_step_performance(&self, jobs: &[JobMetrics]) -> HashMap<String, StepStats> {
        let mut durations: HashMap<String, Vec<f64>> = HashMap::new();
        let mut failures: HashMap<String, u64> = HashMap::new();
        let mut successes: HashMap<String, u64> = HashMap::new();

        for job in jobs {
            for (step, duration) in &job.step_durations_secs {
                durations.entry(step.clone()).or_default().push(*duration);
                *successes.entry(step.clone()).or_insert(0) += 1;
            }
            for step in &job.steps_failed {
                *failures.entry(step.clone()).or_insert(0) += 1;
            }
        }

        durations
            .into_iter()
            .map(|(step, values)| {
                let success_count = *successes.get(&step).unwrap_or(&0);
                let failure_count = *failures.get(&step).unwrap_or(&0);
                let total = success_count + failure_count;
                let stats = StepStats {
                    average_duration_secs: stats::mean(&values),
                    min_duration_secs: values.iter().cloned().fold(f64::INFINITY, f64::min),
                    max_duration_secs: values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
                    success_count,
                    failure_count,
                    success_rate: stats::success_rate(success_count as usize, total as usize),
                };
                (step, stats)
            })
            .collect()
    }

    async fn analyze_resource_usage(&self) -> ResourceStats {
        let metrics = self.system_metrics.read().await;
        let hour_ago = Utc::now() - chrono::Duration::hours(1);
        let recent: Vec<&SystemMetrics> = metrics.iter().filter(|m| m.timestamp > hour_ago).collect();
        let Some(latest) = recent.last() else {
            return ResourceStats::default();
        };

        let cpu_values: Vec<f64> = recent.iter().map(|m| m.cpu_percent).collect();
        let memory_values: Vec<f64> = recent.iter().map(|m| m.memory_percent).collect();

        ResourceStats {
            cpu_current: Some(latest.cpu_percent),
            cpu_average_1h: Some(stats::mean(&cpu_values)),
            cpu_peak_1h: cpu_values.iter().cloned().fold(None, |acc, v| Some(acc.map_or(v, |m: f64| m.max(v)))),
            memory_current_percent: Some(latest.memory_percent),
            memory_current_used_mb: Some(latest.memory_used_mb),
            memory_average_percent_1h: Some(stats::mean(&memory_values)),
            memory_peak_percent_1h: memory_values.iter().cloned().fold(None, |acc, v| Some(acc.map_or(v, |m: f64| m.max(v)))),
            disk_current_percent: Some(latest.disk_usage_percent),
            disk_free_mb: Some(latest.disk_free_mb),
        }
    }

    async fn calculate_system_health(&self, active_jobs: usize) -> SystemHealth {
        let metrics = self.system_metrics.read().await;
        let Some(latest) = metrics.back() else {
            return SystemHealth::unknown(active_jobs);
        };
        let cpu_health = (100.0 - latest.cpu_percent).max(0.0);
        let memory_health = (100.0 - latest.memory_percent).max(0.0);
        let disk_health = (100.0 - latest.disk_usage_percent).max(0.0);
        SystemHealth::from_health_scores(cpu_health, memory_health, disk_health, active_jobs)
    }

    fn analyze_errors(jobs: &[&JobMetrics]) -> ErrorBreakdown {
        let failed: Vec<&&JobMetrics> = jobs.iter().filter(|j| !j.success).collect();
        if failed.is_empty() {
            return ErrorBreakdown::default();
        }
        let mut error_types: HashMap<String, usize> = HashMap::new();
        for job in &failed {
            if let Some(message) = &job.error_message {
                *error_types.entry(stats::categorize_error(message).to_string()).or_insert(0) += 1;
            }
        }
        ErrorBreakdown {
            total_errors: failed.len(),
            error_rate: stats::success_rate(failed.len(), jobs.len()),
            error_types,
        }
    }

    async fn active_job_details(&self) -> Vec<ActiveJobDetail> {
        let job_metrics = self.job_metrics.read().await;
        let active = self.active_jobs.read().await;
        let mut details: Vec<ActiveJobDetail> = active
            .iter()
            .filter_map(|(job_id, info)| {
                let metrics = job_metrics.get(job_id)?;
                Some(ActiveJobDetail {
                    job_id: job_id.clone(),
                    filename: metrics.filename.clone(),
                    current_step: info.current_step.clone().unwrap_or_else(|| "initializing".to_string()),
                    runtime_secs: (Utc::now() - metrics.start_time).num_milliseconds() as f64 / 1000.0,
                })
            })
            .collect();
        details.sort_by(|a, b| a.job_id.cmp(&b.job_id));
        details
    }

    pub async fn export(&self, format: ExportFormat) -> String {
        match format {
            ExportFormat::Json => {
                let completed: Vec<JobMetrics> = self.completed_jobs.read().await.iter().cloned().collect();
                let system: Vec<SystemMetrics> = self.system_metrics.read().await.iter().cloned().collect();
                let performance_stats = self.get_performance_stats(false).await;
                serde_json::json!({
                    "export_timestamp": Utc::now().to_rfc3339(),
                    "completed_jobs": completed,
                    "system_metrics": system,
                    "performance_stats": performance_stats,
                })
                .to_string()
            }
            ExportFormat::Csv => {
                let completed: Vec<JobMetrics> = self.completed_jobs.read().await.iter().cloned().collect();
                export::jobs_to_csv(&completed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> IngestConfig {
        IngestConfig { system_metrics_interval_secs: 3600, ..IngestConfig::default() }
    }

    #[tokio::test]
    async fn completed_job_moves_out_of_active_tracking() {
        let monitor = PerformanceMonitor::spawn(&config());
        monitor.start_job_tracking("job1", "f.pdf", Some(2.0)).await;
        monitor.update_job_step("job1", "ocr").await;
        monitor.update_job_step("job1", "embeddings").await;
        monitor.complete_job("job1", true, None, None).await;

        assert!(monitor.job_metrics.read().await.get("job1").is_none());
        assert!(monitor.active_jobs.read().await.get("job1").is_none());
        assert_eq!(monitor.completed_jobs.read().await.len(), 1);
        monitor.shutdown();
    }

    #[tokio::test]
    async fn performance_stats_reflect_completed_jobs() {
        let monitor = PerformanceMonitor::spawn(&config());
        monitor.start_job_tracking("job1", "f.pdf", None).await;
        monitor.complete_job("job1", true, None, None).await;
        monitor.start_job_tracking("job2", "g.pdf", None).await;
        monitor.complete_job("job2", false, Some("connection reset".to_string()), None).await;

        let stats = monitor.get_performance_stats(true).await;
        assert_eq!(stats.jobs.total_completed, 2);
        assert_eq!(stats.errors.total_errors, 1);
        assert_eq!(stats.errors.error_types.get("network"), Some(&1));
        monitor.shutdown();
    }

    #[tokio::test]
    async fn stats_cache_is_reused_until_forced() {
        let monitor = PerformanceMonitor::spawn(&config());
        let first = monitor.get_performance_stats(false).await;
        monitor.start_job_tracking("job1", "f.pdf", None).await;
        monitor.complete_job("job1", true, None, None).await;
        // stats_cache was invalidated by complete_job, so this is a fresh calculation, not a cache hit.
        let second = monitor.get_performance_stats(false).await;
        assert_eq!(first.jobs.total_completed, 0);
        assert_eq!(second.jobs.total_completed, 1);
        monitor.shutdown();
    }

    #[tokio::test]
    async fn csv_export_contains_one_line_per_completed_job() {
        let monitor = PerformanceMonitor::spawn(&config());
        monitor.start_job_tracking("job1", "f.pdf", None).await;
        monitor.complete_job("job1", true, None, None).await;
        let csv = monitor.export(ExportFormat::Csv).await;
        assert_eq!(csv.lines().count(), 2);
        monitor.shutdown();
    }
}
