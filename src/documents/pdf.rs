//! PDF format processor.
//!
//! Extracts per-page text, classifies each page by line-pattern heuristics,
//! strips running headers and bare page numbers, and emits one raw split per
//! non-empty cleaned page.

use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

use super::splitter::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, RichMediaSplitter};
use super::types::{PageType, ProcessorError, RawSplit, SplitMetadata};

/// Processor-local priority boost applied to every PDF split.
pub const PDF_PRIORITY_BOOST: f32 = 0.1;

/// Form feed, emitted between pages by the text extractor.
const PAGE_BREAK: char = '\u{0c}';

static BARE_PAGE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(page\s+)?\d{1,4}(\s*(of|/)\s*\d{1,4})?\s*$").expect("page number pattern"));
static NUMBERED_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(\.\d+)*[.)]?\s+\S").expect("numbered heading pattern"));
static SPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]{2,}").expect("space run pattern"));

const END_MATTER_KEYWORDS: [&str; 5] = [
    "references",
    "bibliography",
    "acknowledgements",
    "acknowledgments",
    "appendix",
];

/// Converts a PDF into per-page raw splits with page-type classification.
///
/// Pages longer than the chunk budget are re-split, with every resulting
/// piece keeping its page number and classification.
#[derive(Debug, Clone, Copy)]
pub struct PdfProcessor {
    splitter: RichMediaSplitter,
    priority_boost: f32,
}

impl Default for PdfProcessor {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP, PDF_PRIORITY_BOOST)
    }
}

impl PdfProcessor {
    /// Build a processor with explicit splitting budgets and priority boost.
    pub fn new(chunk_size: usize, chunk_overlap: usize, priority_boost: f32) -> Self {
        Self {
            splitter: RichMediaSplitter::new(chunk_size, chunk_overlap),
            priority_boost,
        }
    }

    /// Process one PDF file into per-page raw splits.
    pub fn process(&self, path: &Path) -> Result<Vec<RawSplit>, ProcessorError> {
        let bytes = std::fs::read(path)?;
        let text = pdf_extract::extract_text_from_mem(&bytes)
            .map_err(|err| ProcessorError::Pdf(err.to_string()))?;
        Ok(self.process_text(&text))
    }

    /// Split already-extracted text into cleaned, classified page splits.
    ///
    /// Text without page breaks is treated as a single page.
    pub fn process_text(&self, text: &str) -> Vec<RawSplit> {
        let pages: Vec<&str> = text.split(PAGE_BREAK).collect();
        let running_lines = running_header_lines(&pages);

        let mut splits = Vec::new();
        for (index, page) in pages.iter().enumerate() {
            let page_type = classify_page(page);
            let (cleaned, headings) = clean_page(page, &running_lines);
            if cleaned.is_empty() {
                continue;
            }
            let base = SplitMetadata {
                headings,
                priority_score: self.priority_boost,
                page_number: Some(index + 1),
                page_type: Some(page_type),
                ..SplitMetadata::default()
            };
            splits.extend(self.splitter.create_chunks(&cleaned, &base));
        }
        splits
    }
}

/// Lines repeated across at least half the pages (and at least three of them)
/// are treated as running headers or footers.
fn running_header_lines(pages: &[&str]) -> Vec<String> {
    if pages.len() < 3 {
        return Vec::new();
    }
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for page in pages {
        for line in page.lines().map(str::trim).filter(|line| !line.is_empty()) {
            *counts.entry(line).or_insert(0) += 1;
        }
    }
    let threshold = (pages.len() / 2).max(3);
    counts
        .into_iter()
        .filter(|(line, count)| *count >= threshold && !BARE_PAGE_NUMBER.is_match(line))
        .map(|(line, _)| line.to_string())
        .collect()
}

/// Classify a raw page before cleanup.
fn classify_page(page: &str) -> PageType {
    let lower = page.to_lowercase();
    if lower.contains("table of contents") {
        return PageType::TableOfContents;
    }

    let lines: Vec<&str> = page
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    if lines.is_empty() {
        return PageType::Body;
    }

    if lines.iter().any(|line| {
        let normalized = line.to_lowercase();
        END_MATTER_KEYWORDS
            .iter()
            .any(|keyword| normalized == *keyword || normalized.starts_with(&format!("{keyword} ")))
    }) {
        return PageType::EndMatter;
    }

    let heading_like = lines
        .iter()
        .filter(|line| is_all_caps_line(line) || NUMBERED_HEADING.is_match(line))
        .count();

    if lines.len() < 8 && !page.contains(". ") && heading_like * 2 >= lines.len() {
        return PageType::TitleMatter;
    }
    if heading_like * 5 >= lines.len() * 2 {
        return PageType::StructuredContent;
    }
    PageType::Body
}

/// Strip page numbers and running headers, collapse whitespace, and collect
/// heading-like lines.
fn clean_page(page: &str, running_lines: &[String]) -> (String, Vec<String>) {
    let mut headings = Vec::new();
    let mut kept: Vec<String> = Vec::new();
    let mut blank_pending = false;

    for raw_line in page.lines() {
        let line = SPACE_RUN.replace_all(raw_line.trim(), " ").into_owned();
        if line.is_empty() {
            blank_pending = !kept.is_empty();
            continue;
        }
        if BARE_PAGE_NUMBER.is_match(&line) || running_lines.iter().any(|header| *header == line) {
            continue;
        }
        if is_all_caps_line(&line) || NUMBERED_HEADING.is_match(&line) {
            headings.push(line.clone());
        }
        if blank_pending {
            kept.push(String::new());
            blank_pending = false;
        }
        kept.push(line);
    }

    (kept.join("\n"), headings)
}

/// An all-caps line with enough letters to plausibly be a section heading.
fn is_all_caps_line(line: &str) -> bool {
    let letters: Vec<char> = line.chars().filter(|c| c.is_alphabetic()).collect();
    letters.len() >= 4
        && letters.iter().all(|c| c.is_uppercase())
        && line.chars().count() <= 80
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_split_on_form_feed() {
        let processor = PdfProcessor::default();
        let splits = processor.process_text("First page text.\u{0c}Second page text.");
        assert_eq!(splits.len(), 2);
        assert_eq!(splits[0].metadata.page_number, Some(1));
        assert_eq!(splits[1].metadata.page_number, Some(2));
    }

    #[test]
    fn text_without_breaks_is_one_page() {
        let processor = PdfProcessor::default();
        let splits = processor.process_text("Just one continuous body of text. It flows.");
        assert_eq!(splits.len(), 1);
        assert_eq!(splits[0].metadata.page_number, Some(1));
        assert_eq!(splits[0].metadata.page_type, Some(PageType::Body));
    }

    #[test]
    fn toc_and_end_matter_are_classified() {
        assert_eq!(
            classify_page("Table of Contents\n1. Intro ... 2\n2. Work ... 5"),
            PageType::TableOfContents
        );
        assert_eq!(
            classify_page("References\nSmith, A. (2020). Brand systems in practice."),
            PageType::EndMatter
        );
    }

    #[test]
    fn sparse_caps_page_is_title_matter() {
        assert_eq!(
            classify_page("CORPORATE VALUES\n\nSTUDIO HANDBOOK"),
            PageType::TitleMatter
        );
    }

    #[test]
    fn page_numbers_and_running_headers_are_stripped() {
        let header = "Gin Lane Studio Handbook";
        let pages: Vec<String> = (1..=4)
            .map(|n| format!("{header}\nBody text for page {n}. It has substance.\nPage {n}"))
            .collect();
        let text = pages.join("\u{0c}");

        let processor = PdfProcessor::default();
        let splits = processor.process_text(&text);
        assert_eq!(splits.len(), 4);
        for split in &splits {
            assert!(!split.text.contains(header));
            assert!(!split.text.to_lowercase().contains("page 1\n"));
            assert!(split.text.contains("Body text"));
        }
    }

    #[test]
    fn heading_lines_are_collected() {
        let processor = PdfProcessor::default();
        let splits =
            processor.process_text("OUR PROCESS\nWe begin every engagement with discovery.");
        assert_eq!(splits.len(), 1);
        assert_eq!(splits[0].metadata.headings, vec!["OUR PROCESS"]);
    }

    #[test]
    fn oversized_pages_are_split_within_the_budget() {
        let processor = PdfProcessor::new(100, 0, PDF_PRIORITY_BOOST);
        let text = "The studio shapes brands with care. ".repeat(20);
        let splits = processor.process_text(&text);

        assert!(splits.len() > 1);
        for split in &splits {
            assert!(split.text.chars().count() <= 100);
            assert_eq!(split.metadata.page_number, Some(1));
            assert_eq!(split.metadata.page_type, Some(PageType::Body));
        }
    }

    #[test]
    fn empty_pages_are_dropped() {
        let processor = PdfProcessor::default();
        let splits = processor.process_text("Real content here.\u{0c}\n  \n\u{0c}More content.");
        assert_eq!(splits.len(), 2);
        assert_eq!(splits[1].metadata.page_number, Some(3));
    }
}
