//! FileValidator (C1): validates uploads for size, extension, MIME,
//! signature, content-safety, and per-client rate, in the canonical order
//! the specification enumerates.

mod error;
mod rate_limit;
mod report;

pub use error::ValidationError;
pub use rate_limit::{RateLimitWindow, RateLimiter};
pub use report::{Check, QuarantineRecord, ThreatLevel, ValidationReport};

use std::path::Path;

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::config::IngestConfig;

const NATIVE_EXE_MAGIC: &[&[u8]] = &[
    b"MZ",             // Windows PE
    b"\x7fELF",        // Linux ELF
    b"\xca\xfe\xba\xbe", // Mach-O fat binary
    b"\xfe\xed\xfa\xce", // Mach-O 32-bit
    b"\xfe\xed\xfa\xcf", // Mach-O 64-bit
];

pub struct FileValidator {
    config: IngestConfig,
    rate_limiter: RateLimiter,
}

impl FileValidator {
    pub fn new(config: IngestConfig) -> Self {
        let rate_limiter = RateLimiter::new(config.max_uploads_per_hour, config.max_uploads_per_day);
        Self { config, rate_limiter }
    }

    /// Validate the file at `path`, short-circuiting on the first fatal
    /// check. `declared_filename` is the name the client supplied; it is not
    /// trusted for MIME/signature purposes, only for hygiene and extension
    /// checks.
    pub async fn validate(
        &self,
        path: &Path,
        declared_filename: &str,
        client_id: Option<&str>,
    ) -> Result<ValidationReport, ValidationError> {
        let mut checks_performed = Vec::new();
        let mut warnings = Vec::new();

        // 1. Rate limit.
        if let Some(client_id) = client_id {
            checks_performed.push(Check::RateLimit);
            if let Some(window) = self.rate_limiter.check_and_record(client_id).await {
                return Err(ValidationError::RateLimitExceeded {
                    client_id: client_id.to_string(),
                    window: window.label(),
                });
            }
        }

        // 2. Filename hygiene.
        checks_performed.push(Check::FilenameHygiene);
        self.check_filename(declared_filename)?;

        // 3. Size.
        checks_performed.push(Check::Size);
        let bytes = tokio::fs::read(path).await?;
        self.check_size(bytes.len() as u64)?;

        // 4. MIME via content sniffing.
        checks_performed.push(Check::Mime);
        let detected_mime = self.check_mime(&bytes)?;

        // 5. Signature.
        checks_performed.push(Check::Signature);
        self.check_signature(&bytes)?;

        // 6. SHA-256 digest.
        checks_performed.push(Check::Sha256);
        let sha256 = hex::encode(Sha256::digest(&bytes));

        // 7. Content scan.
        checks_performed.push(Check::ContentScan);
        let (mut threat_level, scan_warnings) = self.content_scan(&bytes);
        warnings.extend(scan_warnings);

        // 8. PDF structure.
        checks_performed.push(Check::PdfStructure);
        self.check_structure(&bytes)?;

        // 9. PDF semantic.
        checks_performed.push(Check::PdfSemantic);
        let (page_count, encrypted, has_forms, has_javascript, has_attachments, semantic_warnings) =
            self.check_semantic(&bytes)?;
        warnings.extend(semantic_warnings);
        if encrypted || has_javascript {
            threat_level = threat_level.max(ThreatLevel::Medium);
        }

        let mut report = ValidationReport {
            detected_mime,
            sha256,
            threat_level,
            warnings,
            checks_performed,
            quarantined: false,
            page_count: Some(page_count),
            encrypted,
            has_forms,
            has_javascript,
            has_attachments,
        };

        if report.threat_level >= ThreatLevel::High {
            if self.config.enable_quarantine {
                self.quarantine(path, declared_filename, &mut report).await?;
                return Err(ValidationError::Malicious(report.warnings.join("; ")));
            } else {
                warn!(filename = declared_filename, "quarantine bypassed for high/critical threat file");
                report.warnings.push("quarantine bypassed".to_string());
            }
        }

        info!(filename = declared_filename, sha256 = %report.sha256, "upload validated");
        Ok(report)
    }

    fn check_filename(&self, filename: &str) -> Result<(), ValidationError> {
        if filename.is_empty() {
            return Err(ValidationError::BadName("empty filename".to_string()));
        }
        if filename.len() > self.config.max_filename_length {
            return Err(ValidationError::BadName("filename too long".to_string()));
        }
        const FORBIDDEN: &[char] = &['<', '>', ':', '"', '|', '?', '*'];
        if filename.contains("..")
            || filename.contains('/')
            || filename.contains('\\')
            || filename.contains('\0')
            || filename.contains('\n')
            || filename.contains('\r')
            || filename.chars().any(|c| FORBIDDEN.contains(&c))
        {
            return Err(ValidationError::BadName("filename contains forbidden characters".to_string()));
        }
        let lower = filename.to_ascii_lowercase();
        let allowed = self
            .config
            .allowed_extensions
            .iter()
            .any(|ext| lower.ends_with(ext.as_str()));
        if !allowed {
            return Err(ValidationError::BadName(format!("extension not allowed for {filename}")));
        }
        Ok(())
    }

    fn check_size(&self, size: u64) -> Result<(), ValidationError> {
        if size == 0 {
            return Err(ValidationError::Empty);
        }
        if size > self.config.max_file_size {
            return Err(ValidationError::TooLarge { size, max: self.config.max_file_size });
        }
        Ok(())
    }

    fn check_mime(&self, bytes: &[u8]) -> Result<String, ValidationError> {
        let kind = infer::get(bytes);
        let mime = kind.map(|k| k.mime_type().to_string()).unwrap_or_else(|| "application/octet-stream".to_string());
        if !self.config.allowed_mime_types.iter().any(|m| m == &mime) {
            return Err(ValidationError::WrongType(mime));
        }
        Ok(mime)
    }

    fn check_signature(&self, bytes: &[u8]) -> Result<(), ValidationError> {
        let head = &bytes[..bytes.len().min(16)];
        let ok = head.starts_with(b"%PDF-1.") || head.starts_with(b"%PDF-2.");
        if ok {
            Ok(())
        } else {
            Err(ValidationError::BadSignature)
        }
    }

    fn content_scan(&self, bytes: &[u8]) -> (ThreatLevel, Vec<String>) {
        let mut warnings = Vec::new();
        let mut level = ThreatLevel::Safe;

        let text_lossy = String::from_utf8_lossy(bytes);

        for marker in &self.config.active_content_markers {
            if text_lossy.contains(marker.as_str()) {
                warnings.push(format!("active-content marker present: {marker}"));
                level = level.max(ThreatLevel::Medium);
            }
        }
        for token in &self.config.suspicious_shell_tokens {
            if text_lossy.contains(token.as_str()) {
                warnings.push(format!("shell/script token present: {token}"));
                level = level.max(ThreatLevel::High);
            }
        }
        for magic in NATIVE_EXE_MAGIC {
            if bytes.starts_with(magic) || bytes.windows(magic.len()).any(|w| w == *magic) {
                warnings.push("embedded native executable magic bytes detected".to_string());
                level = level.max(ThreatLevel::Critical);
                break;
            }
        }

        for url_str in extract_urls(&text_lossy) {
            if let Ok(parsed) = url::Url::parse(&url_str) {
                let host = parsed.host_str().unwrap_or("");
                if self.config.suspicious_url_tokens.iter().any(|t| host.contains(t.as_str())) {
                    warnings.push(format!("suspicious shortener/URL host: {host}"));
                    level = level.max(ThreatLevel::Medium);
                }
                if let Some(port) = parsed.port() {
                    if self.config.suspicious_ports.contains(&port) {
                        warnings.push(format!("suspicious port in URL: {port}"));
                        level = level.max(ThreatLevel::Medium);
                    }
                }
            }
        }

        (level, warnings)
    }

    fn check_structure(&self, bytes: &[u8]) -> Result<(), ValidationError> {
        let text_lossy = String::from_utf8_lossy(bytes);
        if !(text_lossy.starts_with("%PDF-1.") || text_lossy.starts_with("%PDF-2.")) {
            return Err(ValidationError::StructureInvalid("missing PDF header".to_string()));
        }
        if !text_lossy.contains("%%EOF") {
            return Err(ValidationError::StructureInvalid("missing %%EOF marker".to_string()));
        }
        let obj_count = text_lossy.matches(" obj").count();
        let stream_count = text_lossy.matches("stream").count();
        const MAX_OBJECTS: usize = 2_000_000;
        const MAX_STREAMS: usize = 2_000_000;
        if obj_count > MAX_OBJECTS || stream_count > MAX_STREAMS {
            return Err(ValidationError::StructureInvalid("object/stream count exceeds sane cap".to_string()));
        }
        Ok(())
    }

    #[allow(clippy::type_complexity)]
    fn check_semantic(&self, bytes: &[u8]) -> Result<(u32, bool, bool, bool, bool, Vec<String>), ValidationError> {
        let mut warnings = Vec::new();
        let doc = match lopdf::Document::load_mem(bytes) {
            Ok(doc) => doc,
            Err(e) => return Err(ValidationError::StructureInvalid(format!("lopdf parse error: {e}"))),
        };

        let page_count = doc.get_pages().len() as u32;
        if page_count > self.config.max_pdf_pages {
            return Err(ValidationError::StructureInvalid(format!(
                "page count {page_count} exceeds cap {}",
                self.config.max_pdf_pages
            )));
        }

        let encrypted = doc.trailer.get(b"Encrypt").is_ok();
        if encrypted {
            warnings.push("document is encrypted".to_string());
        }

        let text_lossy = String::from_utf8_lossy(bytes);
        let has_forms = text_lossy.contains("/AcroForm") || text_lossy.contains("/SubmitForm");
        let has_javascript = text_lossy.contains("/JavaScript") || text_lossy.contains("/JS");
        let has_attachments = text_lossy.contains("/EmbeddedFile") || text_lossy.contains("/FileAttachment");

        if has_forms {
            warnings.push("document contains form fields".to_string());
        }
        if has_javascript {
            warnings.push("document contains JavaScript actions".to_string());
        }
        if has_attachments {
            warnings.push("document contains embedded attachments".to_string());
        }

        Ok((page_count, encrypted, has_forms, has_javascript, has_attachments, warnings))
    }

    async fn quarantine(&self, path: &Path, filename: &str, report: &mut ValidationReport) -> Result<(), ValidationError> {
        tokio::fs::create_dir_all(&self.config.quarantine_dir).await?;
        let dest_name = format!("{}_{}", Utc::now().timestamp(), filename);
        let dest = self.config.quarantine_dir.join(&dest_name);
        tokio::fs::copy(path, &dest).await?;

        report.quarantined = true;
        let record = QuarantineRecord {
            original_filename: filename.to_string(),
            quarantined_at: Utc::now(),
            report: report.clone(),
        };
        let sidecar = self.config.quarantine_dir.join(format!("{dest_name}.json"));
        let json = serde_json::to_string_pretty(&record).unwrap_or_default();
        tokio::fs::write(sidecar, json).await?;

        warn!(filename, dest = %dest.display(), "malicious file quarantined");
        Ok(())
    }
}

/// Extract URLs from arbitrary text via a permissive regex.
fn extract_urls(text: &str) -> Vec<String> {
    let re = regex::Regex::new(r"https?://[^\s)>\]\x27\x22]+").unwrap();
    re.find_iter(text).map(|m| m.as_str().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn minimal_pdf() -> Vec<u8> {
        let mut doc = lopdf::Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(lopdf::dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
        });
        doc.objects.insert(
            pages_id,
            lopdf::Object::Dictionary(lopdf::dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(lopdf::dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    #[tokio::test]
    async fn rejects_bad_filename() {
        let config = IngestConfig::default();
        let validator = FileValidator::new(config);
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f.pdf");
        tokio::fs::write(&path, minimal_pdf()).await.unwrap();

        let result = validator.validate(&path, "../evil.pdf", None).await;
        assert!(matches!(result, Err(ValidationError::BadName(_))));
    }

    #[tokio::test]
    async fn checks_performed_is_a_prefix_up_to_first_failure() {
        let config = IngestConfig::default();
        let validator = FileValidator::new(config);
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.pdf");
        tokio::fs::write(&path, b"").await.unwrap();

        let err = validator.validate(&path, "empty.pdf", None).await.unwrap_err();
        assert!(matches!(err, ValidationError::Empty));
    }

    #[tokio::test]
    async fn accepts_minimal_valid_pdf() {
        let config = IngestConfig::default();
        let validator = FileValidator::new(config);
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ok.pdf");
        tokio::fs::write(&path, minimal_pdf()).await.unwrap();

        let report = validator.validate(&path, "ok.pdf", None).await.unwrap();
        assert_eq!(report.threat_level, ThreatLevel::Safe);
        assert!(!report.sha256.is_empty());
    }

    #[tokio::test]
    async fn flags_javascript_marker_as_malicious_when_quarantine_enabled() {
        let mut config = IngestConfig::default();
        config.enable_quarantine = true;
        let dir = TempDir::new().unwrap();
        config.quarantine_dir = dir.path().join("quarantine");
        let validator = FileValidator::new(config);

        let mut bytes = minimal_pdf();
        bytes.extend_from_slice(b"\n% /JavaScript /OpenAction eval(x)\n");
        let path = dir.path().join("bad.pdf");
        tokio::fs::write(&path, &bytes).await.unwrap();

        let err = validator.validate(&path, "bad.pdf", None).await.unwrap_err();
        assert!(matches!(err, ValidationError::Malicious(_)));

        let mut entries = tokio::fs::read_dir(dir.path().join("quarantine")).await.unwrap();
        let mut found_sidecar = false;
        while let Some(entry) = entries.next_entry().await.unwrap() {
            if entry.file_name().to_string_lossy().ends_with(".json") {
                found_sidecar = true;
            }
        }
        assert!(found_sidecar);
    }
}
