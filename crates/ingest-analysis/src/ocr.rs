//! `Ocr` implementations: one over embedded digital text (no network, no
//! external process), one over a remote vision API — mirroring the
//! teacher's multi-backend OCR shape (`foiacquire-analysis::ocr::backend`)
//! without the backend-registry machinery, since the pipeline only ever
//! wires up one `Ocr` at a time.

use std::path::{Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use base64::Engine;
use ingest_core::capabilities::{AnalyzerError, Ocr, OcrOutput};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Extracts whatever text is already embedded in the PDF via `pdf-extract`,
/// and renders the first page to a PNG via `pdftoppm` if present on `PATH`.
/// No OCR model runs here — this backend only helps with "born-digital"
/// PDFs; scanned documents yield near-empty text, which the pipeline
/// reports as a degraded (but non-fatal) `ocr` stage.
pub struct PdfTextOcr {
    images_dir: PathBuf,
}

impl PdfTextOcr {
    pub fn new(images_dir: PathBuf) -> Self {
        Self { images_dir }
    }

    async fn render_first_page(&self, pdf_path: &Path, doc_id_hint: &str) -> Option<PathBuf> {
        tokio::fs::create_dir_all(&self.images_dir).await.ok()?;
        let out_prefix = self.images_dir.join(format!("{doc_id_hint}_page1"));
        let status = tokio::process::Command::new("pdftoppm")
            .args(["-png", "-f", "1", "-l", "1", "-r", "150"])
            .arg(pdf_path)
            .arg(&out_prefix)
            .status()
            .await
            .ok()?;
        if !status.success() {
            return None;
        }
        let candidate = PathBuf::from(format!("{}-1.png", out_prefix.display()));
        if candidate.exists() {
            Some(candidate)
        } else {
            None
        }
    }
}

#[async_trait]
impl Ocr for PdfTextOcr {
    async fn run(&self, pdf_path: &Path) -> Result<OcrOutput, AnalyzerError> {
        let path = pdf_path.to_path_buf();
        let extracted_text = tokio::task::spawn_blocking(move || pdf_extract::extract_text(&path).unwrap_or_default())
            .await
            .map_err(|e| AnalyzerError::Other(anyhow::anyhow!("pdf text extraction task panicked: {e}")))?;

        let page_count = {
            let path = pdf_path.to_path_buf();
            tokio::task::spawn_blocking(move || lopdf::Document::load(&path).map(|doc| doc.get_pages().len() as u32).unwrap_or(0))
                .await
                .unwrap_or(0)
        };

        let doc_id_hint = pdf_path.file_stem().and_then(|s| s.to_str()).unwrap_or("doc").to_string();
        let first_page_image_path = self.render_first_page(pdf_path, &doc_id_hint).await;

        Ok(OcrOutput {
            ocr_pdf_path: None,
            extracted_text,
            detected_language: None,
            page_count,
            first_page_image_path,
            ocr_performed: false,
        })
    }
}

/// Calls an OpenAI-Vision-compatible endpoint to transcribe the first page
/// image, and falls back to `pdf-extract`'s embedded text for the rest of
/// the document. Grounded in the teacher's Gemini vision OCR backend
/// (`foiacquire-analysis::ocr::gemini`), generalized to a configurable
/// endpoint/model instead of a single hardcoded provider.
pub struct VisionApiOcr {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    text_fallback: PdfTextOcr,
}

#[derive(Debug, Serialize)]
struct VisionRequest {
    model: String,
    messages: Vec<VisionMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct VisionMessage {
    role: &'static str,
    content: Vec<VisionContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum VisionContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl {
        #[serde(rename = "image_url")]
        image_url: VisionImageUrl,
    },
}

#[derive(Debug, Serialize)]
struct VisionImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct VisionResponse {
    choices: Vec<VisionChoice>,
}

#[derive(Debug, Deserialize)]
struct VisionChoice {
    message: VisionResponseMessage,
}

#[derive(Debug, Deserialize)]
struct VisionResponseMessage {
    content: String,
}

impl VisionApiOcr {
    pub fn new(endpoint: String, api_key: String, model: String, images_dir: PathBuf) -> Self {
        Self { client: reqwest::Client::new(), endpoint, api_key, model, text_fallback: PdfTextOcr::new(images_dir) }
    }

    async fn transcribe_image(&self, image_path: &Path) -> Result<String, AnalyzerError> {
        let bytes = tokio::fs::read(image_path).await.map_err(|e| AnalyzerError::Other(e.into()))?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);

        let request = VisionRequest {
            model: self.model.clone(),
            messages: vec![VisionMessage {
                role: "user",
                content: vec![
                    VisionContentPart::Text {
                        text: "Transcribe all text from this academic paper page. Return only the transcribed text, preserving paragraph breaks.".to_string(),
                    },
                    VisionContentPart::ImageUrl { image_url: VisionImageUrl { url: format!("data:image/png;base64,{encoded}") } },
                ],
            }],
            temperature: 0.0,
            max_tokens: 4096,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AnalyzerError::Other(e.into()))?;

        if !response.status().is_success() {
            return Err(AnalyzerError::Unavailable(format!("vision OCR endpoint returned {}", response.status())));
        }

        let parsed: VisionResponse = response.json().await.map_err(|e| AnalyzerError::Other(e.into()))?;
        Ok(parsed.choices.into_iter().next().map(|c| c.message.content).unwrap_or_default())
    }
}

#[async_trait]
impl Ocr for VisionApiOcr {
    async fn run(&self, pdf_path: &Path) -> Result<OcrOutput, AnalyzerError> {
        let started = Instant::now();
        let mut digital = self.text_fallback.run(pdf_path).await?;

        let Some(image_path) = digital.first_page_image_path.clone() else {
            warn!("vision OCR has no rendered page image, falling back to embedded text only");
            return Ok(digital);
        };

        match self.transcribe_image(&image_path).await {
            Ok(text) if !text.trim().is_empty() => {
                debug!(elapsed_ms = started.elapsed().as_millis() as u64, "vision OCR transcription complete");
                digital.extracted_text = text;
                digital.ocr_performed = true;
                Ok(digital)
            }
            Ok(_) => Ok(digital),
            Err(e) => {
                warn!(error = %e, "vision OCR failed, falling back to embedded text");
                Ok(digital)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pdf_text_ocr_extracts_from_a_minimal_document() {
        let dir = tempfile::tempdir().unwrap();
        let ocr = PdfTextOcr::new(dir.path().join("images"));

        let mut doc = lopdf::Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(lopdf::dictionary! { "Type" => "Page", "Parent" => pages_id });
        doc.objects.insert(pages_id, lopdf::Object::Dictionary(lopdf::dictionary! { "Type" => "Pages", "Kids" => vec![page_id.into()], "Count" => 1 }));
        let catalog_id = doc.add_object(lopdf::dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog_id);
        let pdf_path = dir.path().join("paper.pdf");
        doc.save(&pdf_path).unwrap();

        let output = ocr.run(&pdf_path).await.unwrap();
        assert_eq!(output.page_count, 1);
        assert!(!output.ocr_performed);
    }
}
