//! Directory-wide chunking: drives format processors over a document tree and
//! enriches raw splits into full chunk records.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::metrics::IngestMetrics;

use super::splitter::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use super::types::{
    Chunk, ChunkMetadata, Dataset, DatasetMetadata, Document, DocumentConfig, DocumentMetadata,
    ProcessorError, RawSplit,
};
use super::{ProcessorKind, utils};

/// Orchestrates format processors across a directory tree and assembles a
/// [`Dataset`].
///
/// Per-file failures are logged and skipped, never fatal to the run. Files
/// with no config entry get priority 0 and stay in the dataset.
#[derive(Debug)]
pub struct DocumentChunker {
    chunk_size: usize,
    chunk_overlap: usize,
    configs: HashMap<String, DocumentConfig>,
    metrics: IngestMetrics,
}

impl Default for DocumentChunker {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP)
    }
}

impl DocumentChunker {
    /// Build a chunker with explicit splitting budgets.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            configs: HashMap::new(),
            metrics: IngestMetrics::default(),
        }
    }

    /// Attach per-file config entries, keyed by exact file name.
    pub fn with_configs(mut self, configs: Vec<DocumentConfig>) -> Self {
        self.configs = configs
            .into_iter()
            .map(|entry| (entry.document.clone(), entry))
            .collect();
        self
    }

    /// Load config entries from a JSON file and attach them.
    pub fn with_config_file(self, path: &Path) -> Result<Self, ProcessorError> {
        let configs: Vec<DocumentConfig> = utils::load_json(path)?;
        Ok(self.with_configs(configs))
    }

    /// Counters accumulated over processing runs.
    pub fn metrics(&self) -> &IngestMetrics {
        &self.metrics
    }

    /// Process every supported file under `directory` into a dataset.
    pub fn process_directory(&self, directory: &Path) -> Result<Dataset, ProcessorError> {
        let mut documents = Vec::new();

        let mut entries: Vec<_> = WalkDir::new(directory)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .collect();
        entries.sort_by(|a, b| a.path().cmp(b.path()));

        for entry in entries {
            let path = entry.path();
            let kind = match ProcessorKind::for_path(path) {
                Ok(kind) => kind,
                Err(err) => {
                    debug!(path = %path.display(), %err, "skipping unsupported file");
                    self.metrics.record_skipped_file();
                    continue;
                }
            };
            match self.process_file(path, kind, directory) {
                Ok(document) => {
                    self.metrics.record_document(document.chunks.len() as u64);
                    documents.push(document);
                }
                Err(err) => {
                    warn!(path = %path.display(), %err, "failed to process file, excluding from dataset");
                    self.metrics.record_skipped_file();
                }
            }
        }

        Ok(self.assemble(documents, directory))
    }

    /// Process a single file into a document record.
    pub fn process_file(
        &self,
        path: &Path,
        kind: ProcessorKind,
        base_dir: &Path,
    ) -> Result<Document, ProcessorError> {
        let splits = kind.process(path, self.chunk_size, self.chunk_overlap)?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_string();
        let file_type = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| format!(".{}", ext.to_lowercase()))
            .unwrap_or_default();
        let subject = utils::subject_from_path(path, base_dir);
        let original_size = std::fs::metadata(path).map(|meta| meta.len()).unwrap_or(0);

        let chunks = self.enrich_splits(&file_name, subject.as_deref(), splits);

        Ok(Document {
            doc_id: utils::stable_doc_id(&file_name),
            file_name: file_name.clone(),
            file_type,
            metadata: DocumentMetadata {
                source_path: path.display().to_string(),
                subject,
                creation_date: utils::current_timestamp_rfc3339(),
                total_chunks: chunks.len(),
                original_size,
            },
            chunks,
        })
    }

    /// Turn raw splits into chunk records with config-derived weighting.
    ///
    /// Subjects merge the path-derived subject with any processor-supplied
    /// subject, deduplicated in order. Processor priority boosts add onto the
    /// config priority.
    fn enrich_splits(
        &self,
        file_name: &str,
        path_subject: Option<&str>,
        splits: Vec<RawSplit>,
    ) -> Vec<Chunk> {
        let config = self.configs.get(file_name);
        if config.is_none() && !self.configs.is_empty() {
            warn!(file_name, "no config entry for file, defaulting priority to 0");
        }
        let base_priority = config.map(|entry| entry.priority).unwrap_or(0.0);
        let content_type = config.and_then(|entry| entry.content_type);
        let services = config.map(|entry| entry.services.clone()).unwrap_or_default();

        splits
            .into_iter()
            .filter(|split| !split.text.trim().is_empty())
            .enumerate()
            .map(|(index, split)| {
                let mut subjects: Vec<String> = Vec::new();
                if let Some(subject) = path_subject {
                    subjects.push(subject.to_string());
                }
                if let Some(subject) = &split.metadata.subject
                    && !subjects.iter().any(|existing| existing == subject)
                {
                    subjects.push(subject.clone());
                }

                let mut metadata = ChunkMetadata {
                    source: file_name.to_string(),
                    chunk_number: index + 1,
                    char_length: split.text.chars().count(),
                    word_count: split.text.split_whitespace().count(),
                    priority: base_priority + split.metadata.priority_score,
                    related_chunks: split.metadata.related_chunks.clone(),
                    question: split.metadata.question.clone(),
                    page_number: split.metadata.page_number,
                    page_type: split.metadata.page_type,
                    ..ChunkMetadata::default()
                };
                metadata.set_media(&split.metadata.media);
                metadata.set_references(&split.metadata.references);

                Chunk {
                    chunk_id: utils::stable_chunk_id(file_name, index, &split.text),
                    content: split.text,
                    subjects,
                    headings: split.metadata.headings,
                    services: services.clone(),
                    categories: Vec::new(),
                    client_name: None,
                    project_id: None,
                    client_id: None,
                    content_type,
                    metadata,
                }
            })
            .collect()
    }

    /// Assemble documents into a dataset with aggregate metadata.
    fn assemble(&self, documents: Vec<Document>, base_dir: &Path) -> Dataset {
        let mut subjects = BTreeSet::new();
        let mut services = BTreeSet::new();
        let mut clients = BTreeSet::new();
        let mut total_chunks = 0;

        for document in &documents {
            if let Some(subject) = &document.metadata.subject {
                subjects.insert(subject.clone());
            }
            total_chunks += document.chunks.len();
            for chunk in &document.chunks {
                services.extend(chunk.services.iter().cloned());
                if let Some(client) = &chunk.client_name {
                    clients.insert(client.clone());
                }
            }
        }

        Dataset {
            metadata: DatasetMetadata {
                creation_date: utils::current_timestamp_rfc3339(),
                chunk_size: self.chunk_size,
                chunk_overlap: self.chunk_overlap,
                total_documents: documents.len(),
                total_chunks,
                subjects: subjects.into_iter().collect(),
                services: services.into_iter().collect(),
                clients: clients.into_iter().collect(),
                directory_structure: utils::directory_structure(base_dir),
            },
            documents,
        }
    }
}
