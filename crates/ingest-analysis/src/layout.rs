//! `LayoutAnalyzer`: a heuristic per-page element census over the raw PDF
//! object graph via `lopdf`, in the same spirit as `dedup::extract`'s
//! `read_pdf_info` — walk the document's own structure rather than
//! reaching for a layout-model dependency the pack doesn't carry.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use ingest_core::capabilities::{AnalyzerError, LayoutAnalyzer, LayoutOutput};
use lopdf::{Object, ObjectId};
use serde_json::json;

/// Counts `Image` XObjects, font references, and annotation entries per
/// page — a rough proxy for "elements" in the absence of a real layout
/// model, good enough to populate [`LayoutOutput::element_types`] and the
/// per-page `pages` detail the specification calls for.
pub struct LopdfLayoutAnalyzer;

impl LopdfLayoutAnalyzer {
    pub fn new() -> Self {
        Self
    }

    fn count_page(doc: &lopdf::Document, page_id: ObjectId) -> (HashMap<String, i64>, serde_json::Value) {
        let mut counts: HashMap<String, i64> = HashMap::new();
        let mut text_blocks = 0i64;
        let mut images = 0i64;
        let mut annotations = 0i64;

        if let Ok(content) = doc.get_page_content(page_id) {
            if let Ok(operations) = lopdf::content::Content::decode(&content) {
                for op in operations.operations {
                    match op.operator.as_str() {
                        "Tj" | "TJ" | "'" | "\"" => text_blocks += 1,
                        "Do" => images += 1,
                        _ => {}
                    }
                }
            }
        }

        if let Ok(page_dict) = doc.get_dictionary(page_id) {
            if let Ok(Object::Array(annots)) = page_dict.get(b"Annots") {
                annotations = annots.len() as i64;
            }
        }

        counts.insert("text_block".to_string(), text_blocks);
        counts.insert("image".to_string(), images);
        counts.insert("annotation".to_string(), annotations);

        let detail = json!({
            "text_blocks": text_blocks,
            "images": images,
            "annotations": annotations,
        });
        (counts, detail)
    }
}

impl Default for LopdfLayoutAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LayoutAnalyzer for LopdfLayoutAnalyzer {
    async fn analyze(&self, pdf_path: &Path) -> Result<LayoutOutput, AnalyzerError> {
        let path = pdf_path.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let doc = lopdf::Document::load(&path).map_err(|e| AnalyzerError::Unavailable(format!("failed to load PDF for layout analysis: {e}")))?;
            let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();

            let mut element_types: HashMap<String, i64> = HashMap::new();
            let mut pages = Vec::with_capacity(page_ids.len());
            for (index, page_id) in page_ids.iter().enumerate() {
                let (counts, detail) = Self::count_page(&doc, *page_id);
                for (kind, count) in &counts {
                    *element_types.entry(kind.clone()).or_insert(0) += count;
                }
                pages.push(json!({ "page_number": index + 1, "elements": detail }));
            }

            Ok(LayoutOutput {
                page_count: page_ids.len() as u32,
                element_types,
                pages: serde_json::Value::Array(pages),
            })
        })
        .await
        .map_err(|e| AnalyzerError::Other(anyhow::anyhow!("layout analysis task panicked: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_pdf_with_text(dir: &std::path::Path) -> std::path::PathBuf {
        let mut doc = lopdf::Document::with_version("1.5");
        let content = lopdf::content::Content {
            operations: vec![
                lopdf::content::Operation::new("BT", vec![]),
                lopdf::content::Operation::new("Tj", vec![Object::string_literal("hello")]),
                lopdf::content::Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(lopdf::Stream::new(lopdf::dictionary! {}, content.encode().unwrap()));
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(lopdf::dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        doc.objects.insert(pages_id, Object::Dictionary(lopdf::dictionary! { "Type" => "Pages", "Kids" => vec![page_id.into()], "Count" => 1 }));
        let catalog_id = doc.add_object(lopdf::dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog_id);
        let path = dir.join("layout.pdf");
        doc.save(&path).unwrap();
        path
    }

    #[tokio::test]
    async fn counts_a_text_operation_on_the_single_page() {
        let dir = tempfile::tempdir().unwrap();
        let path = minimal_pdf_with_text(dir.path());
        let analyzer = LopdfLayoutAnalyzer::new();
        let output = analyzer.analyze(&path).await.unwrap();
        assert_eq!(output.page_count, 1);
        assert_eq!(output.element_types.get("text_block").copied().unwrap_or(0), 1);
    }
}
