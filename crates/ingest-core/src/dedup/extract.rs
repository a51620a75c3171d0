//! PDF canonical-text and metadata extraction shared by the L1/L2 cascade
//! layers.

use std::path::Path;

/// Bibliographic fields pulled from a PDF's `/Info` dictionary, used to
/// build the L1 canonical string.
#[derive(Debug, Clone, Default)]
pub struct PdfInfo {
    pub title: Option<String>,
    pub author: Option<String>,
    pub creator: Option<String>,
    pub page_count: u32,
}

pub fn read_pdf_info(pdf_path: &Path) -> Result<PdfInfo, anyhow::Error> {
    let doc = lopdf::Document::load(pdf_path)?;
    let page_count = doc.get_pages().len() as u32;

    let mut info = PdfInfo { page_count, ..Default::default() };
    if let Ok(trailer_info) = doc.trailer.get(b"Info") {
        if let Ok(info_id) = trailer_info.as_reference() {
            if let Ok(obj) = doc.get_object(info_id) {
                if let Ok(dict) = obj.as_dict() {
                    info.title = dict.get(b"Title").ok().and_then(|v| v.as_str().ok()).map(|s| String::from_utf8_lossy(s).to_string());
                    info.author = dict.get(b"Author").ok().and_then(|v| v.as_str().ok()).map(|s| String::from_utf8_lossy(s).to_string());
                    info.creator = dict.get(b"Creator").ok().and_then(|v| v.as_str().ok()).map(|s| String::from_utf8_lossy(s).to_string());
                }
            }
        }
    }
    Ok(info)
}

/// Extract plain text from the first `max_pages` pages, truncated to
/// `max_chars` characters total. Best-effort: a text-extraction failure
/// yields an empty string rather than propagating, since the cascade can
/// still fall back to other layers.
pub fn extract_first_pages_text(pdf_path: &Path, max_pages: usize, max_chars: usize) -> String {
    match pdf_extract::extract_text(pdf_path) {
        Ok(text) => {
            // pdf-extract has no page-limited API; approximate by splitting
            // on form-feed (page break) markers it emits between pages.
            let pages: Vec<&str> = text.split('\x0c').collect();
            let joined: String = pages.into_iter().take(max_pages).collect::<Vec<_>>().join("\n");
            joined.chars().take(max_chars).collect()
        }
        Err(_) => String::new(),
    }
}

/// Build the L1 canonical string:
/// `title|author|creator|page_count|first_5000_chars_of_first_3_pages`.
pub fn canonical_string(info: &PdfInfo, first_three_pages_text: &str) -> String {
    format!(
        "{}|{}|{}|{}|{}",
        info.title.as_deref().unwrap_or(""),
        info.author.as_deref().unwrap_or(""),
        info.creator.as_deref().unwrap_or(""),
        info.page_count,
        first_three_pages_text,
    )
}

/// Select sample pages per the `first_last_middle` strategy: pages 1,
/// `N/2`, and `N`, deduplicated, 1-indexed.
pub fn first_last_middle_pages(page_count: u32) -> Vec<u32> {
    if page_count == 0 {
        return Vec::new();
    }
    let mut pages = vec![1, (page_count / 2).max(1), page_count];
    pages.sort_unstable();
    pages.dedup();
    pages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_last_middle_dedups_for_small_documents() {
        assert_eq!(first_last_middle_pages(1), vec![1]);
        assert_eq!(first_last_middle_pages(2), vec![1, 2]);
        assert_eq!(first_last_middle_pages(7), vec![1, 3, 7]);
    }

    #[test]
    fn canonical_string_includes_all_fields() {
        let info = PdfInfo {
            title: Some("T".to_string()),
            author: Some("A".to_string()),
            creator: Some("C".to_string()),
            page_count: 10,
        };
        let s = canonical_string(&info, "body text");
        assert_eq!(s, "T|A|C|10|body text");
    }
}
