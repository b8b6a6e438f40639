//! Core data types for the ingestion pipeline: raw splits, chunks, documents, datasets,
//! and the side-loaded config records that drive enrichment.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while converting a source file into raw splits.
#[derive(Debug, Error)]
pub enum ProcessorError {
    /// Underlying file could not be read.
    #[error("Failed to read source file: {0}")]
    Io(#[from] std::io::Error),
    /// JSON source or config file failed to parse.
    #[error("Failed to parse JSON in {path}: {source}")]
    Json {
        /// Path of the offending file.
        path: String,
        /// Parser error.
        #[source]
        source: serde_json::Error,
    },
    /// PDF text extraction failed.
    #[error("Failed to extract PDF text: {0}")]
    Pdf(String),
    /// File extension has no registered processor.
    #[error("Unsupported file extension: {0}")]
    UnsupportedExtension(String),
}

/// Kind of media element extracted from inline markdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Inline image (`![alt](url)`).
    Image,
    /// Inline link (`[text](url)`).
    Link,
}

impl MediaKind {
    /// Stable string form stored in flattened metadata.
    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Link => "link",
        }
    }
}

/// A media element lifted out of markdown text before splitting.
///
/// The `position` is the element's placeholder slot; the three flattened media
/// arrays on a chunk are addressed by this index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaElement {
    /// Image or link.
    pub kind: MediaKind,
    /// Placeholder slot assigned during extraction.
    pub position: usize,
    /// Validated URL (scheme and host both present).
    pub url: String,
    /// Alt text or link text, when the markup carried one.
    pub text: Option<String>,
}

/// A meta-link reference extracted from `{meta_link: description}[url]` markup.
///
/// References never appear in retrievable content, only in metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reference {
    /// Human-readable description from the markup.
    pub description: String,
    /// Validated target URL.
    pub url: String,
}

/// Page classification tags produced by the PDF processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageType {
    /// Cover / title-matter page.
    TitleMatter,
    /// References, acknowledgements, appendix.
    EndMatter,
    /// Table of contents.
    TableOfContents,
    /// Page dominated by numbered headings or list structure.
    StructuredContent,
    /// Ordinary prose page.
    Body,
}

/// Metadata attached to a raw split by its format processor.
#[derive(Debug, Clone, Default)]
pub struct SplitMetadata {
    /// Heading breadcrumb for the split (outermost first).
    pub headings: Vec<String>,
    /// Subject supplied by the processor (QA subject title, for example).
    pub subject: Option<String>,
    /// Original question text for QA splits.
    pub question: Option<String>,
    /// Source question identifier for QA splits.
    pub question_id: Option<String>,
    /// Service title for services-mode splits.
    pub service: Option<String>,
    /// Processor-local priority boost, merged additively with config priority.
    pub priority_score: f32,
    /// Pre-linked related chunk identifiers carried by the source entry.
    pub related_chunks: Vec<String>,
    /// Media elements embedded in the split text.
    pub media: Vec<MediaElement>,
    /// Meta-link references removed from the split text.
    pub references: Vec<Reference>,
    /// One-based page number for PDF splits.
    pub page_number: Option<usize>,
    /// Page classification for PDF splits.
    pub page_type: Option<PageType>,
}

/// One processor output: a text payload plus provenance metadata.
///
/// Raw splits are format-local; the chunkers enrich them into full [`Chunk`]
/// records with corpus-level context.
#[derive(Debug, Clone)]
pub struct RawSplit {
    /// Text payload; empty splits are dropped by the chunkers.
    pub text: String,
    /// Processor-supplied metadata.
    pub metadata: SplitMetadata,
}

/// Discriminator describing what kind of content a chunk carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    /// Question/answer evaluation content.
    Qa,
    /// Service catalog content.
    Services,
    /// Project case-study content.
    Project,
    /// Anything else.
    General,
}

/// Atomic retrievable unit: text plus relationship-aware metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Deterministic identifier derived from file name, index, and content prefix.
    pub chunk_id: String,
    /// Text payload, non-empty by construction.
    pub content: String,
    /// Topic labels from the directory path and processor metadata, deduplicated.
    #[serde(default)]
    pub subjects: Vec<String>,
    /// Heading breadcrumb (document structure).
    #[serde(default)]
    pub headings: Vec<String>,
    /// Services associated with the source project, if any.
    #[serde(default)]
    pub services: Vec<String>,
    /// Client categories, populated for project sources.
    #[serde(default)]
    pub categories: Vec<String>,
    /// Client display name, populated for project sources.
    #[serde(default)]
    pub client_name: Option<String>,
    /// Project identifier, populated for project sources.
    #[serde(default)]
    pub project_id: Option<String>,
    /// Client identifier, populated for project sources.
    #[serde(default)]
    pub client_id: Option<String>,
    /// Content discriminator from the source config, if configured.
    #[serde(default)]
    pub content_type: Option<ContentType>,
    /// Weighting, relationship, and provenance metadata.
    pub metadata: ChunkMetadata,
}

/// Chunk-level metadata persisted into the dataset and flattened for the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Source file name.
    pub source: String,
    /// One-based position within the source document.
    pub chunk_number: usize,
    /// Character length of the content.
    pub char_length: usize,
    /// Whitespace-delimited word count of the content.
    pub word_count: usize,
    /// Base importance weight; influences ranking, never filtering.
    pub priority: f32,
    /// Chunk identifiers this chunk is known to answer or support.
    #[serde(default)]
    pub related_chunks: Vec<String>,
    /// Original question text for QA chunks.
    #[serde(default)]
    pub question: Option<String>,
    /// PDF page number, when the chunk came from a PDF page.
    #[serde(default)]
    pub page_number: Option<usize>,
    /// PDF page classification, when applicable.
    #[serde(default)]
    pub page_type: Option<PageType>,
    /// Media URLs, slot-aligned with `media_types` and `media_texts`.
    #[serde(default)]
    pub media_urls: Vec<Option<String>>,
    /// Media kinds, slot-aligned with the other media arrays.
    #[serde(default)]
    pub media_types: Vec<Option<String>>,
    /// Media alt/link texts, slot-aligned with the other media arrays.
    #[serde(default)]
    pub media_texts: Vec<Option<String>>,
    /// Reference URLs extracted from meta-links.
    #[serde(default)]
    pub reference_urls: Vec<String>,
    /// Reference descriptions, index-aligned with `reference_urls`.
    #[serde(default)]
    pub reference_descriptions: Vec<String>,
}

impl ChunkMetadata {
    /// Populate the slot-aligned media arrays from extracted media elements.
    ///
    /// Every array receives exactly one entry per element so the three arrays
    /// stay length-aligned; absent texts become `None` rather than being
    /// dropped.
    pub fn set_media(&mut self, media: &[MediaElement]) {
        self.media_urls = media.iter().map(|m| Some(m.url.clone())).collect();
        self.media_types = media
            .iter()
            .map(|m| Some(m.kind.as_str().to_string()))
            .collect();
        self.media_texts = media.iter().map(|m| m.text.clone()).collect();
    }

    /// Populate the reference arrays from extracted references.
    pub fn set_references(&mut self, references: &[Reference]) {
        self.reference_urls = references.iter().map(|r| r.url.clone()).collect();
        self.reference_descriptions = references.iter().map(|r| r.description.clone()).collect();
    }
}

impl Default for ChunkMetadata {
    fn default() -> Self {
        Self {
            source: String::new(),
            chunk_number: 0,
            char_length: 0,
            word_count: 0,
            priority: 0.0,
            related_chunks: Vec::new(),
            question: None,
            page_number: None,
            page_type: None,
            media_urls: Vec::new(),
            media_types: Vec::new(),
            media_texts: Vec::new(),
            reference_urls: Vec::new(),
            reference_descriptions: Vec::new(),
        }
    }
}

/// A processed source file: ordered chunks plus document-level metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Deterministic identifier derived from the file name.
    pub doc_id: String,
    /// Source file name.
    pub file_name: String,
    /// Lowercased file extension including the dot.
    pub file_type: String,
    /// Ordered chunks; adjacency is meaningful.
    pub chunks: Vec<Chunk>,
    /// Document-level metadata.
    pub metadata: DocumentMetadata,
}

/// Document-level metadata recorded during chunking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Absolute path of the source file at processing time.
    pub source_path: String,
    /// Subject derived from the directory structure, when present.
    #[serde(default)]
    pub subject: Option<String>,
    /// RFC3339 timestamp of the processing run.
    pub creation_date: String,
    /// Number of chunks produced.
    pub total_chunks: usize,
    /// Size of the original content, in bytes.
    pub original_size: u64,
}

/// The corpus: every processed document plus aggregate metadata.
///
/// Built fully offline; consumed wholesale by the vector store upsert step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    /// Aggregate corpus metadata.
    pub metadata: DatasetMetadata,
    /// All processed documents.
    pub documents: Vec<Document>,
}

/// Aggregate metadata describing a full ingestion run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetMetadata {
    /// RFC3339 timestamp of the run.
    pub creation_date: String,
    /// Splitter chunk size used for the run.
    pub chunk_size: usize,
    /// Splitter chunk overlap used for the run.
    pub chunk_overlap: usize,
    /// Number of documents in the dataset.
    pub total_documents: usize,
    /// Number of chunks across all documents.
    pub total_chunks: usize,
    /// Distinct subjects observed, sorted.
    #[serde(default)]
    pub subjects: Vec<String>,
    /// Distinct services observed, sorted.
    #[serde(default)]
    pub services: Vec<String>,
    /// Distinct client names observed, sorted.
    #[serde(default)]
    pub clients: Vec<String>,
    /// Nested map of subdirectories and their document file names.
    pub directory_structure: serde_json::Value,
}

/// Per-file ingestion config entry, matched by exact file name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentConfig {
    /// File name this entry applies to.
    pub document: String,
    /// Base importance weight.
    #[serde(default)]
    pub priority: f32,
    /// Content discriminator for chunks from this file.
    #[serde(default)]
    pub content_type: Option<ContentType>,
    /// Services attributed to this document.
    #[serde(default)]
    pub services: Vec<String>,
    /// Technologies attributed to this document.
    #[serde(default)]
    pub technologies: Vec<String>,
}

/// Project config entry: a document config joined to a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// File name this entry applies to.
    pub document: String,
    /// Base importance weight.
    #[serde(default)]
    pub priority: f32,
    /// Content discriminator for chunks from this file.
    #[serde(default)]
    pub content_type: Option<ContentType>,
    /// Services delivered on the project.
    #[serde(default)]
    pub services: Vec<String>,
    /// Technologies used on the project.
    #[serde(default)]
    pub technologies: Vec<String>,
    /// Owning client identifier.
    pub client_id: String,
    /// Project identifier.
    pub project_id: String,
    /// Project display name.
    pub project_name: String,
}

/// Client config entry, joined from project configs by `client_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Client identifier.
    pub client_id: String,
    /// Client display name.
    pub client_name: String,
    /// Business categories for the client.
    #[serde(default)]
    pub categories: Vec<String>,
    /// Projects belonging to the client.
    #[serde(default)]
    pub project_ids: Vec<String>,
    /// Services attributed at the client level.
    #[serde(default)]
    pub services: Vec<String>,
}

/// A subject grouping of evaluation questions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionSubject {
    /// Subject identifier.
    #[serde(default)]
    pub id: String,
    /// Subject display title.
    pub title: String,
    /// Questions under this subject.
    #[serde(default)]
    pub tests: Vec<QuestionEntry>,
}

/// One evaluation question with its correct answer and known-relevant chunks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionEntry {
    /// Question identifier.
    #[serde(default)]
    pub id: String,
    /// Question text.
    pub question: String,
    /// Correct answer text.
    #[serde(default)]
    pub correct_answer: String,
    /// Chunk identifiers known to answer this question.
    #[serde(default)]
    pub correct_chunks: Vec<String>,
}

/// One service catalog entry with accumulated relationship links.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEntry {
    /// Service identifier.
    #[serde(default)]
    pub id: String,
    /// Service title; matched exactly against chunk service lists.
    pub title: String,
    /// Service description.
    #[serde(default)]
    pub description: String,
    /// Project chunks offering this service.
    #[serde(default)]
    pub correct_chunks: Vec<String>,
    /// Projects offering this service.
    #[serde(default)]
    pub project_ids: Vec<String>,
    /// Clients whose projects offer this service.
    #[serde(default)]
    pub client_ids: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_arrays_stay_aligned() {
        let media = vec![
            MediaElement {
                kind: MediaKind::Image,
                position: 0,
                url: "https://ex.com/a.png".into(),
                text: Some("logo".into()),
            },
            MediaElement {
                kind: MediaKind::Link,
                position: 1,
                url: "https://ex.com".into(),
                text: None,
            },
        ];
        let mut metadata = ChunkMetadata::default();
        metadata.set_media(&media);
        assert_eq!(metadata.media_urls.len(), metadata.media_types.len());
        assert_eq!(metadata.media_urls.len(), metadata.media_texts.len());
        assert_eq!(metadata.media_texts[1], None);
        assert_eq!(metadata.media_types[0].as_deref(), Some("image"));
    }

    #[test]
    fn content_type_serializes_lowercase() {
        let value = serde_json::to_value(ContentType::Qa).unwrap();
        assert_eq!(value, serde_json::json!("qa"));
        let parsed: ContentType = serde_json::from_value(serde_json::json!("project")).unwrap();
        assert_eq!(parsed, ContentType::Project);
    }

    #[test]
    fn document_config_defaults_priority_to_zero() {
        let config: DocumentConfig =
            serde_json::from_str(r#"{"document": "about.md"}"#).unwrap();
        assert_eq!(config.priority, 0.0);
        assert!(config.content_type.is_none());
    }
}
