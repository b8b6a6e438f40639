//! Project-aware chunking: joins case-study documents to project and client
//! config records before enriching splits.

use std::collections::BTreeSet;
use std::path::Path;

use tracing::warn;
use walkdir::WalkDir;

use crate::metrics::IngestMetrics;

use super::splitter::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use super::types::{
    Chunk, ChunkMetadata, ClientConfig, Dataset, DatasetMetadata, Document, DocumentMetadata,
    ProcessorError, ProjectConfig, RawSplit,
};
use super::{ProcessorKind, utils};

/// Chunks project documents with a two-level config join: document name to
/// project entry, project entry to client entry.
///
/// A document with no project entry is a hard warning; its project-scoped
/// fields stay empty and the document remains in the dataset.
#[derive(Debug)]
pub struct ProjectChunker {
    chunk_size: usize,
    chunk_overlap: usize,
    projects: Vec<ProjectConfig>,
    clients: Vec<ClientConfig>,
    metrics: IngestMetrics,
}

impl ProjectChunker {
    /// Build a chunker over the given project and client config records.
    pub fn new(projects: Vec<ProjectConfig>, clients: Vec<ClientConfig>) -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            projects,
            clients,
            metrics: IngestMetrics::default(),
        }
    }

    /// Build a chunker from config files on disk.
    pub fn from_config_files(
        project_config: &Path,
        client_config: &Path,
    ) -> Result<Self, ProcessorError> {
        Ok(Self::new(
            utils::load_json(project_config)?,
            utils::load_json(client_config)?,
        ))
    }

    /// Override the default splitting budgets.
    pub fn with_budgets(mut self, chunk_size: usize, chunk_overlap: usize) -> Self {
        self.chunk_size = chunk_size;
        self.chunk_overlap = chunk_overlap;
        self
    }

    /// Counters accumulated over processing runs.
    pub fn metrics(&self) -> &IngestMetrics {
        &self.metrics
    }

    /// Resolve the project entry for a file name and its owning client.
    fn resolve_config(&self, file_name: &str) -> (Option<&ProjectConfig>, Option<&ClientConfig>) {
        let Some(project) = self
            .projects
            .iter()
            .find(|entry| entry.document == file_name)
        else {
            warn!(file_name, "no project config entry for document");
            return (None, None);
        };

        let client = self
            .clients
            .iter()
            .find(|entry| entry.client_id == project.client_id);
        if client.is_none() {
            warn!(
                project_id = %project.project_id,
                client_id = %project.client_id,
                "no client config entry for project"
            );
        }
        (Some(project), client)
    }

    /// Process every supported file under `directory` into a project dataset.
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
            let Ok(kind) = ProcessorKind::for_path(path) else {
                self.metrics.record_skipped_file();
                continue;
            };
            match self.process_file(path, kind) {
                Ok(document) => {
                    self.metrics.record_document(document.chunks.len() as u64);
                    documents.push(document);
                }
                Err(err) => {
                    warn!(path = %path.display(), %err, "failed to process project file");
                    self.metrics.record_skipped_file();
                }
            }
        }

        Ok(self.assemble(documents, directory))
    }

    /// Process a single project document.
    pub fn process_file(&self, path: &Path, kind: ProcessorKind) -> Result<Document, ProcessorError> {
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
        let original_size = std::fs::metadata(path).map(|meta| meta.len()).unwrap_or(0);

        let (project, client) = self.resolve_config(&file_name);
        let chunks = self.enrich_splits(&file_name, project, client, splits);

        Ok(Document {
            doc_id: utils::stable_doc_id(&file_name),
            file_name: file_name.clone(),
            file_type,
            metadata: DocumentMetadata {
                source_path: path.display().to_string(),
                subject: None,
                creation_date: utils::current_timestamp_rfc3339(),
                total_chunks: chunks.len(),
                original_size,
            },
            chunks,
        })
    }

    /// Turn raw splits into project chunk records.
    ///
    /// Services union the project-level and client-level lists, deduplicated
    /// in order.
    fn enrich_splits(
        &self,
        file_name: &str,
        project: Option<&ProjectConfig>,
        client: Option<&ClientConfig>,
        splits: Vec<RawSplit>,
    ) -> Vec<Chunk> {
        let base_priority = project.map(|entry| entry.priority).unwrap_or(0.0);
        let content_type = project.and_then(|entry| entry.content_type);

        let mut services: Vec<String> = Vec::new();
        for source in project
            .map(|entry| entry.services.as_slice())
            .into_iter()
            .chain(client.map(|entry| entry.services.as_slice()))
        {
            for service in source {
                if !services.iter().any(|existing| existing == service) {
                    services.push(service.clone());
                }
            }
        }

        splits
            .into_iter()
            .filter(|split| !split.text.trim().is_empty())
            .enumerate()
            .map(|(index, split)| {
                let mut metadata = ChunkMetadata {
                    source: file_name.to_string(),
                    chunk_number: index + 1,
                    char_length: split.text.chars().count(),
                    word_count: split.text.split_whitespace().count(),
                    priority: base_priority + split.metadata.priority_score,
                    related_chunks: split.metadata.related_chunks.clone(),
                    question: split.metadata.question.clone(),
                    ..ChunkMetadata::default()
                };
                metadata.set_media(&split.metadata.media);
                metadata.set_references(&split.metadata.references);

                Chunk {
                    chunk_id: utils::stable_chunk_id(file_name, index, &split.text),
                    content: split.text,
                    subjects: split
                        .metadata
                        .subject
                        .clone()
                        .map(|subject| vec![subject])
                        .unwrap_or_default(),
                    headings: split.metadata.headings,
                    services: services.clone(),
                    categories: client.map(|entry| entry.categories.clone()).unwrap_or_default(),
                    client_name: client.map(|entry| entry.client_name.clone()),
                    project_id: project.map(|entry| entry.project_id.clone()),
                    client_id: project.map(|entry| entry.client_id.clone()),
                    content_type,
                    metadata,
                }
            })
            .collect()
    }

    /// Assemble documents into a dataset with aggregate metadata.
    fn assemble(&self, documents: Vec<Document>, base_dir: &Path) -> Dataset {
        let mut services = BTreeSet::new();
        let mut clients = BTreeSet::new();
        let mut subjects = BTreeSet::new();
        let mut total_chunks = 0;

        for document in &documents {
            total_chunks += document.chunks.len();
            for chunk in &document.chunks {
                services.extend(chunk.services.iter().cloned());
                subjects.extend(chunk.subjects.iter().cloned());
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::types::ContentType;
    use std::fs;

    fn configs() -> (Vec<ProjectConfig>, Vec<ClientConfig>) {
        let projects = vec![ProjectConfig {
            document: "hims.md".into(),
            priority: 0.6,
            content_type: Some(ContentType::Project),
            services: vec!["Brand Identity".into(), "Web Design".into()],
            technologies: vec!["React".into()],
            client_id: "c-hims".into(),
            project_id: "p-hims".into(),
            project_name: "Hims Launch".into(),
        }];
        let clients = vec![ClientConfig {
            client_id: "c-hims".into(),
            client_name: "Hims".into(),
            categories: vec!["Healthcare".into()],
            project_ids: vec!["p-hims".into()],
            services: vec!["Web Design".into(), "Strategy".into()],
        }];
        (projects, clients)
    }

    #[test]
    fn budget_override_reaches_the_processors() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("venue.md"),
            "Strategy comes before any visual direction. ".repeat(15),
        )
        .unwrap();

        let dataset = ProjectChunker::new(Vec::new(), Vec::new())
            .with_budgets(100, 0)
            .process_directory(dir.path())
            .unwrap();

        assert_eq!(dataset.metadata.chunk_size, 100);
        let doc = &dataset.documents[0];
        assert!(doc.chunks.len() > 1);
        for chunk in &doc.chunks {
            assert!(chunk.metadata.char_length <= 100);
        }
    }

    #[test]
    fn project_chunks_carry_joined_config() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("hims.md"),
            "# Hims\nA telehealth brand built from scratch.",
        )
        .unwrap();

        let (projects, clients) = configs();
        let dataset = ProjectChunker::new(projects, clients)
            .process_directory(dir.path())
            .unwrap();

        let chunk = &dataset.documents[0].chunks[0];
        assert_eq!(chunk.client_name.as_deref(), Some("Hims"));
        assert_eq!(chunk.project_id.as_deref(), Some("p-hims"));
        assert_eq!(chunk.client_id.as_deref(), Some("c-hims"));
        assert_eq!(chunk.categories, vec!["Healthcare"]);
        // union of project and client services, deduplicated
        assert_eq!(
            chunk.services,
            vec!["Brand Identity", "Web Design", "Strategy"]
        );
        assert_eq!(dataset.metadata.clients, vec!["Hims"]);
        // project priority plus markdown boost
        assert!((chunk.metadata.priority - 0.8).abs() < 1e-6);
    }

    #[test]
    fn unmatched_document_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("mystery.md"), "# Mystery\nNo config entry.").unwrap();

        let (projects, clients) = configs();
        let dataset = ProjectChunker::new(projects, clients)
            .process_directory(dir.path())
            .unwrap();

        assert_eq!(dataset.metadata.total_documents, 1);
        let chunk = &dataset.documents[0].chunks[0];
        assert_eq!(chunk.client_name, None);
        assert_eq!(chunk.project_id, None);
        assert!(chunk.services.is_empty());
        assert!((chunk.metadata.priority - 0.2).abs() < 1e-6);
    }
}
