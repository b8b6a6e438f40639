//! Recursive text splitting with media-safe placeholder handling.
//!
//! Inline images and links are lifted out of the text and replaced with positional
//! placeholders before splitting, so a split boundary can never truncate a URL. The
//! original markup is restored into each chunk afterwards. Meta-links
//! (`{meta_link: description}[url]`) are removed from the visible text entirely and
//! surface only through reference metadata.

use regex::{Captures, Regex};
use std::sync::LazyLock;

use super::types::{MediaElement, MediaKind, RawSplit, Reference, SplitMetadata};

/// Default splitter chunk size, in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 600;
/// Default splitter overlap, in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 40;

/// Separator cascade: paragraph break, line break, sentence punctuation, space,
/// then raw characters as a last resort.
const SEPARATORS: [&str; 8] = ["\n\n", "\n", ".", "!", "?", ";", ":", " "];

static META_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{meta_link:\s*(.*?)\}\[(.*?)\]").expect("meta-link pattern"));
static IMAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[(.*?)\]\((.*?)\)").expect("image pattern"));
static LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(.*?)\]\((.*?)\)").expect("link pattern"));

/// Check that a URL carries both a scheme and a host.
///
/// Markup around anything else is treated as literal text, not media.
pub fn is_valid_url(url: &str) -> bool {
    match reqwest::Url::parse(url) {
        Ok(parsed) => parsed.has_host(),
        Err(_) => false,
    }
}

fn placeholder(index: usize) -> String {
    format!("{{{{MEDIA_{index}}}}}")
}

/// Lift media and meta-link references out of `text`.
///
/// Returns the processed text with placeholders in position, the extracted
/// media elements, and the extracted references. Invalid URLs leave the markup
/// untouched.
pub fn extract_media(text: &str) -> (String, Vec<MediaElement>, Vec<Reference>) {
    let mut references = Vec::new();
    let mut media = Vec::new();

    let without_meta = META_LINK.replace_all(text, |caps: &Captures| {
        let url = caps[2].to_string();
        if is_valid_url(&url) {
            references.push(Reference {
                description: caps[1].to_string(),
                url,
            });
            String::new()
        } else {
            caps[0].to_string()
        }
    });

    let with_images = IMAGE.replace_all(&without_meta, |caps: &Captures| {
        let url = caps[2].to_string();
        if is_valid_url(&url) {
            let position = media.len();
            let alt = caps[1].to_string();
            media.push(MediaElement {
                kind: MediaKind::Image,
                position,
                url,
                text: if alt.is_empty() { None } else { Some(alt) },
            });
            placeholder(position)
        } else {
            caps[0].to_string()
        }
    });

    let with_links = LINK.replace_all(&with_images, |caps: &Captures| {
        let url = caps[2].to_string();
        if is_valid_url(&url) {
            let position = media.len();
            let label = caps[1].to_string();
            media.push(MediaElement {
                kind: MediaKind::Link,
                position,
                url,
                text: if label.is_empty() { None } else { Some(label) },
            });
            placeholder(position)
        } else {
            caps[0].to_string()
        }
    });

    (with_links.into_owned(), media, references)
}

/// Replace media placeholders with their original markdown markup.
pub fn restore_media(text: &str, media: &[MediaElement]) -> String {
    let mut restored = text.to_string();
    for element in media {
        let markup = match element.kind {
            MediaKind::Image => format!(
                "![{}]({})",
                element.text.as_deref().unwrap_or(""),
                element.url
            ),
            MediaKind::Link => format!(
                "[{}]({})",
                element.text.as_deref().unwrap_or(&element.url),
                element.url
            ),
        };
        restored = restored.replace(&placeholder(element.position), &markup);
    }
    restored
}

/// Character-budgeted recursive splitter with media placeholder round-tripping.
#[derive(Debug, Clone, Copy)]
pub struct RichMediaSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Default for RichMediaSplitter {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP)
    }
}

impl RichMediaSplitter {
    /// Build a splitter with explicit size and overlap budgets (characters).
    ///
    /// Overlap is clamped below the chunk size.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size.saturating_sub(1)),
        }
    }

    /// Split `text` into raw splits, preserving media markup across boundaries.
    ///
    /// Each produced split carries the full media and reference lists in its
    /// metadata so downstream chunk records can flatten them; empty splits are
    /// dropped.
    pub fn create_chunks(&self, text: &str, base: &SplitMetadata) -> Vec<RawSplit> {
        let (processed, media, references) = extract_media(text);

        self.split_text(&processed)
            .into_iter()
            .filter(|piece| !piece.trim().is_empty())
            .map(|piece| {
                let mut metadata = base.clone();
                metadata.media = media.clone();
                metadata.references.extend(references.iter().cloned());
                RawSplit {
                    text: restore_media(&piece, &media),
                    metadata,
                }
            })
            .collect()
    }

    /// Split plain text by the separator cascade into chunks within the budget.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        let pieces = split_recursive(text, &SEPARATORS, self.chunk_size);
        self.merge_pieces(pieces)
    }

    /// Greedily pack pieces into chunks, seeding each new chunk with the
    /// character tail of the previous one.
    fn merge_pieces(&self, pieces: Vec<String>) -> Vec<String> {
        let mut chunks: Vec<String> = Vec::new();
        let mut current = String::new();

        for piece in pieces {
            let current_len = current.chars().count();
            let piece_len = piece.chars().count();
            if !current.is_empty() && current_len + piece_len > self.chunk_size {
                let finished = current.trim().to_string();
                if !finished.is_empty() {
                    chunks.push(finished);
                }
                current = char_tail(&current, self.chunk_overlap);
            }
            current.push_str(&piece);
        }

        let finished = current.trim().to_string();
        if !finished.is_empty() {
            chunks.push(finished);
        }
        chunks
    }
}

/// Split text on the first separator present, recursing into oversized pieces
/// with the remaining separators. Separators stay attached to the end of the
/// piece they terminate.
fn split_recursive(text: &str, separators: &[&str], chunk_size: usize) -> Vec<String> {
    let Some((index, separator)) = separators
        .iter()
        .enumerate()
        .find(|(_, sep)| text.contains(**sep))
    else {
        // No separator applies; fall back to fixed character windows.
        return char_windows(text, chunk_size);
    };

    let mut pieces = Vec::new();
    for part in split_keep_separator(text, separator) {
        if part.chars().count() > chunk_size {
            if index + 1 < separators.len() {
                pieces.extend(split_recursive(&part, &separators[index + 1..], chunk_size));
            } else {
                pieces.extend(char_windows(&part, chunk_size));
            }
        } else if !part.is_empty() {
            pieces.push(part);
        }
    }
    pieces
}

fn split_keep_separator(text: &str, separator: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut rest = text;
    while let Some(at) = rest.find(separator) {
        let end = at + separator.len();
        parts.push(rest[..end].to_string());
        rest = &rest[end..];
    }
    if !rest.is_empty() {
        parts.push(rest.to_string());
    }
    parts
}

fn char_windows(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(size.max(1))
        .map(|window| window.iter().collect())
        .collect()
}

fn char_tail(text: &str, count: usize) -> String {
    if count == 0 {
        return String::new();
    }
    let chars: Vec<char> = text.chars().collect();
    let start = chars.len().saturating_sub(count);
    chars[start..].iter().collect()
}
