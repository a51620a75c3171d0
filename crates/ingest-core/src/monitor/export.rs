//! Metrics export: a full JSON dump, or a flat per-job CSV summary.

use super::JobMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

const CSV_HEADER: &str =
    "job_id,filename,start_time,duration_secs,success,file_size_mb,page_count,ocr_quality_score,bytes_read,bytes_written,steps_completed,steps_failed,error_message";

pub fn jobs_to_csv(jobs: &[JobMetrics]) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push('\n');
    for job in jobs {
        let fields = [
            job.job_id.clone(),
            job.filename.clone(),
            job.start_time.to_rfc3339(),
            job.duration_secs.map(|d| d.to_string()).unwrap_or_default(),
            job.success.to_string(),
            job.file_size_mb.map(|v| v.to_string()).unwrap_or_default(),
            job.page_count.map(|v| v.to_string()).unwrap_or_default(),
            job.ocr_quality_score.map(|v| v.to_string()).unwrap_or_default(),
            job.bytes_read.map(|v| v.to_string()).unwrap_or_default(),
            job.bytes_written.map(|v| v.to_string()).unwrap_or_default(),
            job.steps_completed.join("|"),
            job.steps_failed.join("|"),
            job.error_message.clone().unwrap_or_default(),
        ];
        out.push_str(&fields.iter().map(|f| csv_escape(f)).collect::<Vec<_>>().join(","));
        out.push('\n');
    }
    out
}

fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn escapes_fields_containing_commas() {
        assert_eq!(csv_escape("a,b"), "\"a,b\"");
        assert_eq!(csv_escape("plain"), "plain");
        assert_eq!(csv_escape("has \"quote\""), "\"has \"\"quote\"\"\"");
    }

    #[test]
    fn csv_export_includes_header_and_one_row_per_job() {
        let job = JobMetrics {
            job_id: "job1".to_string(),
            filename: "f.pdf".to_string(),
            start_time: Utc::now(),
            end_time: None,
            duration_secs: Some(1.5),
            success: true,
            error_message: None,
            steps_completed: vec!["ocr".to_string()],
            steps_failed: vec![],
            step_durations_secs: Default::default(),
            peak_memory_mb: None,
            peak_cpu_percent: None,
            file_size_mb: Some(2.0),
            page_count: Some(3),
            ocr_quality_score: None,
            embedding_dimension: None,
            bytes_read: Some(1024),
            bytes_written: Some(1024),
        };
        let csv = jobs_to_csv(&[job]);
        assert_eq!(csv.lines().count(), 2);
        assert!(csv.starts_with(CSV_HEADER));
    }
}
