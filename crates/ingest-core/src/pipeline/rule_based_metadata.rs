//! Rule-based metadata fallback used by Pipeline step 7 when the LLM
//! metadata capability is disabled or unavailable. Cheap regex heuristics
//! over the extracted text — title line, author list, year, DOI — rather
//! than a capability the pipeline depends on, since it never calls out to
//! an external service.

use regex::Regex;

use crate::capabilities::MetadataOutput;

/// Regexes are compiled fresh on each call rather than cached globally:
/// extraction runs once per new paper, not in a hot loop.
pub fn rule_based_extract(text: &str) -> MetadataOutput {
    let mut out = MetadataOutput::default();

    let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    if let Some(title_line) = lines.iter().find(|l| l.len() >= 8 && l.len() <= 250 && !l.chars().all(|c| c.is_ascii_uppercase() || !c.is_alphabetic())) {
        out.title = Some(title_line.to_string());
    }

    let author_re = Regex::new(r"^([A-Z][a-zA-Z.\-]+(?:\s+[A-Z][a-zA-Z.\-]+)+)(,|\s+and\s+|\s*&\s*)").unwrap();
    for line in lines.iter().take(6) {
        if let Some(caps) = author_re.captures(line) {
            let authors: Vec<String> = line
                .split(|c| c == ',' || c == '&')
                .map(|s| s.trim().trim_start_matches("and").trim().to_string())
                .filter(|s| !s.is_empty() && s.chars().next().map(|c| c.is_uppercase()).unwrap_or(false))
                .collect();
            if !authors.is_empty() {
                out.authors = authors;
            }
            let _ = caps;
            break;
        }
    }

    let year_re = Regex::new(r"\b(19|20)\d{2}\b").unwrap();
    if let Some(m) = year_re.find(text) {
        out.year = m.as_str().parse().ok();
    }

    let doi_re = Regex::new(r"10\.\d{4,9}/[-._;()/:A-Za-z0-9]+").unwrap();
    if let Some(m) = doi_re.find(text) {
        out.doi = Some(m.as_str().trim_end_matches(['.', ',']).to_string());
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_year_and_doi() {
        let text = "Some Paper Title About Things\nJane Doe, John Smith\nPublished 2019. DOI: 10.1234/abcd.5678\n";
        let out = rule_based_extract(text);
        assert_eq!(out.year, Some(2019));
        assert_eq!(out.doi.as_deref(), Some("10.1234/abcd.5678"));
        assert!(out.title.is_some());
    }

    #[test]
    fn empty_text_yields_empty_metadata() {
        let out = rule_based_extract("");
        assert!(out.title.is_none());
        assert!(out.authors.is_empty());
    }
}
