//! Document ingestion pipeline: format processors, chunkers, and the
//! relationship builder that cross-links Q&A and service records to chunks.

pub mod chunker;
pub mod json_qa;
pub mod markdown;
pub mod pdf;
pub mod project;
pub mod relations;
pub mod splitter;
pub mod types;
pub mod utils;

use std::path::Path;

use types::{ProcessorError, RawSplit, SplitMetadata};

/// Closed set of format processors.
///
/// Selected by file extension through [`ProcessorKind::for_path`]; `.json`
/// files default to the Q&A processor, except a `services.json` catalog,
/// which routes to [`ProcessorKind::JsonServices`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorKind {
    /// Markdown case studies and documents.
    Markdown,
    /// PDF documents, one split per page.
    Pdf,
    /// Q&A evaluation datasets.
    JsonQa,
    /// Service catalog files.
    JsonServices,
    /// Unstructured plain text.
    PlainText,
}

/// Extension lookup table for processor dispatch.
const EXTENSION_TABLE: [(&str, ProcessorKind); 5] = [
    ("md", ProcessorKind::Markdown),
    ("markdown", ProcessorKind::Markdown),
    ("pdf", ProcessorKind::Pdf),
    ("json", ProcessorKind::JsonQa),
    ("txt", ProcessorKind::PlainText),
];

impl ProcessorKind {
    /// Resolve the processor for a path from its extension.
    pub fn for_path(path: &Path) -> Result<Self, ProcessorError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        let kind = EXTENSION_TABLE
            .iter()
            .find(|(known, _)| *known == extension)
            .map(|(_, kind)| *kind)
            .ok_or(ProcessorError::UnsupportedExtension(extension))?;

        if kind == Self::JsonQa
            && let Some(stem) = path.file_stem().and_then(|stem| stem.to_str())
            && stem.eq_ignore_ascii_case("services")
        {
            return Ok(Self::JsonServices);
        }
        Ok(kind)
    }

    /// Run the processor for this kind against a file with the given
    /// splitting budgets.
    ///
    /// The Q&A and services processors ignore the budgets; their entries map
    /// one-to-one onto splits and are never cut.
    pub fn process(
        &self,
        path: &Path,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Result<Vec<RawSplit>, ProcessorError> {
        match self {
            Self::Markdown => markdown::MarkdownProcessor::new(
                chunk_size,
                chunk_overlap,
                markdown::MARKDOWN_PRIORITY_BOOST,
            )
            .process(path),
            Self::Pdf => {
                pdf::PdfProcessor::new(chunk_size, chunk_overlap, pdf::PDF_PRIORITY_BOOST)
                    .process(path)
            }
            Self::JsonQa => json_qa::QaProcessor::default().process(path),
            Self::JsonServices => json_qa::ServicesProcessor::default().process(path),
            Self::PlainText => {
                let text = std::fs::read_to_string(path)?;
                Ok(splitter::RichMediaSplitter::new(chunk_size, chunk_overlap)
                    .create_chunks(&text, &SplitMetadata::default()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_covers_known_extensions() {
        assert_eq!(
            ProcessorKind::for_path(Path::new("a/studio.md")).ok(),
            Some(ProcessorKind::Markdown)
        );
        assert_eq!(
            ProcessorKind::for_path(Path::new("deck.PDF")).ok(),
            Some(ProcessorKind::Pdf)
        );
        assert_eq!(
            ProcessorKind::for_path(Path::new("eval.json")).ok(),
            Some(ProcessorKind::JsonQa)
        );
        assert_eq!(
            ProcessorKind::for_path(Path::new("config/services.json")).ok(),
            Some(ProcessorKind::JsonServices)
        );
    }

    #[test]
    fn unknown_extension_is_an_error() {
        let err = ProcessorKind::for_path(Path::new("photo.tiff")).unwrap_err();
        assert!(matches!(err, ProcessorError::UnsupportedExtension(ext) if ext == "tiff"));
    }
}
