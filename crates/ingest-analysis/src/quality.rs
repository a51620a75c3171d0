//! `QualityAssessor`: a heuristic OCR-quality scorer over the first-page
//! image, bucketed into [`OcrQualityLabel`]. No ML model is loaded — this
//! mirrors the teacher's preference for a cheap, dependency-light default
//! backend (`foiacquire-analysis::ocr::backend::OcrBackend::is_available`
//! pattern: a capability that's always available, with heavier backends
//! layered on top by the caller) rather than leaving the stage unimplemented.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use image::GenericImageView;
use ingest_core::capabilities::{AnalyzerError, QualityAssessor, QualityOutput};
use ingest_core::models::OcrQualityLabel;

/// Minimum side length, in pixels, below which a page image is judged too
/// low-resolution to have yielded reliable OCR.
const MIN_USABLE_DIMENSION: u32 = 600;

pub struct HeuristicQualityAssessor;

impl HeuristicQualityAssessor {
    pub fn new() -> Self {
        Self
    }

    /// Score in `[0, 1]`: contrast (normalized std-dev of luma) weighted
    /// against a resolution penalty for undersized scans.
    fn score(image: &image::DynamicImage) -> (f64, HashMap<String, f64>) {
        let (width, height) = image.dimensions();
        let gray = image.to_luma8();
        let pixels: Vec<f64> = gray.pixels().map(|p| p.0[0] as f64).collect();
        let mean = pixels.iter().sum::<f64>() / pixels.len().max(1) as f64;
        let variance = pixels.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / pixels.len().max(1) as f64;
        let contrast = variance.sqrt() / 128.0;

        let min_dimension = width.min(height);
        let resolution_factor = (min_dimension as f64 / MIN_USABLE_DIMENSION as f64).min(1.0);

        let score = (contrast.min(1.0) * 0.7 + resolution_factor * 0.3).clamp(0.0, 1.0);

        let mut detail = HashMap::new();
        detail.insert("contrast".to_string(), contrast);
        detail.insert("resolution_factor".to_string(), resolution_factor);
        detail.insert("width".to_string(), width as f64);
        detail.insert("height".to_string(), height as f64);
        (score, detail)
    }

    fn label_for(score: f64) -> OcrQualityLabel {
        if score >= 0.85 {
            OcrQualityLabel::Excellent
        } else if score >= 0.65 {
            OcrQualityLabel::Good
        } else if score >= 0.4 {
            OcrQualityLabel::Fair
        } else {
            OcrQualityLabel::Poor
        }
    }
}

impl Default for HeuristicQualityAssessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QualityAssessor for HeuristicQualityAssessor {
    async fn assess(&self, first_page_image: &Path) -> Result<QualityOutput, AnalyzerError> {
        let path = first_page_image.to_path_buf();
        let image = tokio::task::spawn_blocking(move || image::open(&path))
            .await
            .map_err(|e| AnalyzerError::Other(anyhow::anyhow!("quality assessment task panicked: {e}")))?
            .map_err(|e| AnalyzerError::Unavailable(format!("failed to decode page image: {e}")))?;

        let (score, mut detail) = Self::score(&image);
        detail.insert("overall_score".to_string(), score);
        Ok(QualityOutput { label: Self::label_for(score), detail })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_buckets_match_thresholds() {
        assert_eq!(HeuristicQualityAssessor::label_for(0.9), OcrQualityLabel::Excellent);
        assert_eq!(HeuristicQualityAssessor::label_for(0.7), OcrQualityLabel::Good);
        assert_eq!(HeuristicQualityAssessor::label_for(0.5), OcrQualityLabel::Fair);
        assert_eq!(HeuristicQualityAssessor::label_for(0.1), OcrQualityLabel::Poor);
    }

    #[tokio::test]
    async fn assesses_a_uniform_image_as_low_contrast() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page1.png");
        let image = image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(800, 1000, image::Rgb([255, 255, 255])));
        image.save(&path).unwrap();

        let assessor = HeuristicQualityAssessor::new();
        let output = assessor.assess(&path).await.unwrap();
        assert_eq!(output.detail.get("contrast").copied().unwrap_or(1.0), 0.0);
    }
}
