//! Markdown format processor.
//!
//! Normalizes exported markdown (decorative separators, empty headers, optional
//! YAML frontmatter), splits on `#`/`##`/`###` heading boundaries carrying the
//! heading breadcrumb, then re-splits each section through the media-aware
//! recursive splitter.

use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

use super::splitter::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, RichMediaSplitter};
use super::types::{ProcessorError, RawSplit, SplitMetadata};

/// Processor-local priority boost applied to every markdown split.
pub const MARKDOWN_PRIORITY_BOOST: f32 = 0.2;

static DOC_EXPORT_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\*{0,2}\\\\?_+_?\*{0,2}").expect("export separator pattern"));
static REPEATED_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[_*\-=]{10,}$").expect("repeated separator pattern"));
static EMPTY_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#+\s*$").expect("empty header pattern"));
static HORIZONTAL_RULE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-_*]{3,}$").expect("horizontal rule pattern"));

/// A heading-delimited slice of a markdown document.
#[derive(Debug, Clone, PartialEq)]
struct HeadingSection {
    headings: Vec<String>,
    body: String,
}

/// Splits markdown files into media-aware raw splits with heading breadcrumbs.
#[derive(Debug, Clone, Copy)]
pub struct MarkdownProcessor {
    splitter: RichMediaSplitter,
    priority_boost: f32,
}

impl Default for MarkdownProcessor {
    fn default() -> Self {
        Self::new(
            DEFAULT_CHUNK_SIZE,
            DEFAULT_CHUNK_OVERLAP,
            MARKDOWN_PRIORITY_BOOST,
        )
    }
}

impl MarkdownProcessor {
    /// Build a processor with explicit splitting budgets and priority boost.
    pub fn new(chunk_size: usize, chunk_overlap: usize, priority_boost: f32) -> Self {
        Self {
            splitter: RichMediaSplitter::new(chunk_size, chunk_overlap),
            priority_boost,
        }
    }

    /// Process one markdown file into raw splits.
    pub fn process(&self, path: &Path) -> Result<Vec<RawSplit>, ProcessorError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(self.process_text(&raw))
    }

    /// Split markdown text already held in memory.
    pub fn process_text(&self, raw: &str) -> Vec<RawSplit> {
        let cleaned = clean_markdown(raw);
        let sections = split_by_headings(&cleaned);

        let mut splits = Vec::new();
        for section in sections {
            let base = SplitMetadata {
                headings: section.headings.clone(),
                priority_score: self.priority_boost,
                ..SplitMetadata::default()
            };
            splits.extend(self.splitter.create_chunks(&section.body, &base));
        }
        splits
    }
}

/// Drop decorative separator lines, empty headers, and YAML frontmatter.
pub fn clean_markdown(text: &str) -> String {
    let text = strip_frontmatter(text);

    let cleaned: Vec<&str> = text
        .lines()
        .filter(|line| {
            !(DOC_EXPORT_SEPARATOR.is_match(line)
                || REPEATED_SEPARATOR.is_match(line)
                || EMPTY_HEADER.is_match(line)
                || HORIZONTAL_RULE.is_match(line))
        })
        .collect();

    cleaned.join("\n").trim().to_string()
}

/// Remove a leading `---` fenced YAML frontmatter block, if present.
fn strip_frontmatter(text: &str) -> &str {
    let trimmed = text.trim_start_matches('\u{feff}');
    let Some(rest) = trimmed.strip_prefix("---\n").or_else(|| {
        trimmed
            .strip_prefix("---\r\n")
            .or_else(|| (trimmed == "---").then_some(""))
    }) else {
        return trimmed;
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        offset += line.len();
        if line.trim_end() == "---" {
            return &rest[offset..];
        }
    }
    // Unterminated fence; treat the marker as ordinary text.
    trimmed
}

/// Split cleaned markdown on `#`/`##`/`###` boundaries.
///
/// Each section carries the heading path accumulated so far; a heading at
/// level N truncates the breadcrumb below N. Fenced code blocks are passed
/// through verbatim, headings inside them do not split.
fn split_by_headings(text: &str) -> Vec<HeadingSection> {
    let mut sections = Vec::new();
    let mut breadcrumb: Vec<String> = Vec::new();
    let mut body: Vec<&str> = Vec::new();
    let mut in_fence = false;

    let mut flush = |breadcrumb: &[String], body: &mut Vec<&str>, sections: &mut Vec<HeadingSection>| {
        let joined = body.join("\n");
        let trimmed = joined.trim();
        if !trimmed.is_empty() {
            sections.push(HeadingSection {
                headings: breadcrumb.to_vec(),
                body: trimmed.to_string(),
            });
        }
        body.clear();
    };

    for line in text.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            body.push(line);
            continue;
        }
        if !in_fence
            && let Some((level, title)) = parse_heading(line)
        {
            flush(&breadcrumb, &mut body, &mut sections);
            breadcrumb.truncate(level - 1);
            breadcrumb.push(title.to_string());
            continue;
        }
        body.push(line);
    }
    flush(&breadcrumb, &mut body, &mut sections);

    sections
}

/// Parse an ATX heading of level 1 through 3.
fn parse_heading(line: &str) -> Option<(usize, &str)> {
    let hashes = line.bytes().take_while(|b| *b == b'#').count();
    if !(1..=3).contains(&hashes) {
        return None;
    }
    let rest = &line[hashes..];
    let title = rest.strip_prefix(' ').or_else(|| rest.strip_prefix('\t'))?;
    let title = title.trim();
    (!title.is_empty()).then_some((hashes, title))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleanup_drops_separator_noise() {
        let text = "# Title\n__________________\n\\_\\_\\_\\_\n##   \n---\nReal content.";
        assert_eq!(clean_markdown(text), "# Title\nReal content.");
    }

    #[test]
    fn frontmatter_is_stripped() {
        let text = "---\ntitle: Case study\ndraft: true\n---\n# Heading\nBody.";
        assert_eq!(clean_markdown(text), "# Heading\nBody.");
    }

    #[test]
    fn unterminated_frontmatter_is_kept() {
        let text = "---\nnot actually frontmatter";
        assert_eq!(clean_markdown(text), text);
    }

    #[test]
    fn heading_breadcrumbs_track_nesting() {
        let text = "# Studio\nIntro.\n## Services\nWeb design.\n### Pricing\nTiered.\n## Team\nPeople.";
        let sections = split_by_headings(text);
        assert_eq!(sections.len(), 4);
        assert_eq!(sections[0].headings, vec!["Studio"]);
        assert_eq!(sections[1].headings, vec!["Studio", "Services"]);
        assert_eq!(sections[2].headings, vec!["Studio", "Services", "Pricing"]);
        assert_eq!(sections[3].headings, vec!["Studio", "Team"]);
        assert_eq!(sections[3].body, "People.");
    }

    #[test]
    fn fenced_code_does_not_split() {
        let text = "# Docs\nBefore.\n```\n# not a heading\n```\nAfter.";
        let sections = split_by_headings(text);
        assert_eq!(sections.len(), 1);
        assert!(sections[0].body.contains("# not a heading"));
    }

    #[test]
    fn process_text_carries_headings_and_boost() {
        let processor = MarkdownProcessor::default();
        let splits =
            processor.process_text("# Studio\n## Services\nBrand systems and product design.");
        assert_eq!(splits.len(), 1);
        assert_eq!(splits[0].metadata.headings, vec!["Studio", "Services"]);
        assert!((splits[0].metadata.priority_score - MARKDOWN_PRIORITY_BOOST).abs() < f32::EPSILON);
    }

    #[test]
    fn media_survives_heading_sections() {
        let processor = MarkdownProcessor::default();
        let splits = processor
            .process_text("## Services\nSee ![logo](https://ex.com/a.png) for the identity work.");
        assert_eq!(splits.len(), 1);
        assert!(splits[0].text.contains("![logo](https://ex.com/a.png)"));
        assert_eq!(splits[0].metadata.media.len(), 1);
        assert_eq!(splits[0].metadata.media[0].url, "https://ex.com/a.png");
    }
}
