//! Relationship builder: cross-links Q&A and service records against the
//! materialized corpus.
//!
//! Runs as a separate offline pass over already-chunked datasets. Its output
//! is written back to the question and service config files, which feed the
//! next ingestion run.

use std::collections::HashSet;

use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

use super::types::{Dataset, QuestionSubject, ServiceEntry};

/// Default word-overlap ratio above which a chunk is considered related.
pub const DEFAULT_OVERLAP_THRESHOLD: f32 = 0.3;

static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\w+\b").expect("word pattern"));

/// Flattened view of one corpus chunk, precomputed for matching.
#[derive(Debug)]
struct IndexedChunk {
    chunk_id: String,
    words: HashSet<String>,
    client_name: Option<String>,
    services: Vec<String>,
    project_id: Option<String>,
    client_id: Option<String>,
}

/// Cross-references questions and services against every chunk in the corpus.
#[derive(Debug)]
pub struct RelationshipBuilder {
    chunks: Vec<IndexedChunk>,
    overlap_threshold: f32,
}

impl RelationshipBuilder {
    /// Index the chunks of the given datasets for relationship matching.
    pub fn new(datasets: &[&Dataset], overlap_threshold: f32) -> Self {
        let chunks = datasets
            .iter()
            .flat_map(|dataset| dataset.documents.iter())
            .flat_map(|document| document.chunks.iter())
            .map(|chunk| IndexedChunk {
                chunk_id: chunk.chunk_id.clone(),
                words: word_set(&chunk.content.to_lowercase()),
                client_name: chunk.client_name.as_ref().map(|name| name.to_lowercase()),
                services: chunk.services.clone(),
                project_id: chunk.project_id.clone(),
                client_id: chunk.client_id.clone(),
            })
            .collect();
        Self {
            chunks,
            overlap_threshold,
        }
    }

    /// Find chunk ids relevant to a piece of text.
    ///
    /// A chunk matches when its client name appears as a substring of the
    /// text, or when the share of its words also present in the text exceeds
    /// the overlap threshold.
    pub fn find_related_chunks(&self, text: &str) -> Vec<String> {
        let text = text.to_lowercase();
        let text_words = word_set(&text);

        self.chunks
            .iter()
            .filter(|chunk| {
                if let Some(client) = &chunk.client_name
                    && !client.is_empty()
                    && text.contains(client.as_str())
                {
                    return true;
                }
                if chunk.words.is_empty() || text_words.is_empty() {
                    return false;
                }
                let overlap = chunk.words.intersection(&text_words).count();
                overlap as f32 / chunk.words.len() as f32 > self.overlap_threshold
            })
            .map(|chunk| chunk.chunk_id.clone())
            .collect()
    }

    /// Populate `correct_chunks` on every question from its answer text.
    pub fn link_questions(&self, subjects: &mut [QuestionSubject]) {
        for subject in subjects.iter_mut() {
            for test in subject.tests.iter_mut() {
                test.correct_chunks = self.find_related_chunks(&test.correct_answer);
                debug!(
                    question_id = %test.id,
                    matches = test.correct_chunks.len(),
                    "linked question to chunks"
                );
            }
        }
    }

    /// Populate `correct_chunks`, `project_ids`, and `client_ids` on every
    /// service from exact title matches against chunk service lists.
    pub fn link_services(&self, services: &mut [ServiceEntry]) {
        for service in services.iter_mut() {
            let mut correct_chunks = Vec::new();
            let mut project_ids: Vec<String> = Vec::new();
            let mut client_ids: Vec<String> = Vec::new();

            for chunk in self
                .chunks
                .iter()
                .filter(|chunk| chunk.services.iter().any(|name| *name == service.title))
            {
                correct_chunks.push(chunk.chunk_id.clone());
                if let Some(project_id) = &chunk.project_id
                    && !project_ids.contains(project_id)
                {
                    project_ids.push(project_id.clone());
                }
                if let Some(client_id) = &chunk.client_id
                    && !client_ids.contains(client_id)
                {
                    client_ids.push(client_id.clone());
                }
            }

            service.correct_chunks = correct_chunks;
            service.project_ids = project_ids;
            service.client_ids = client_ids;
        }
    }
}

fn word_set(text: &str) -> HashSet<String> {
    WORD.find_iter(text)
        .map(|word| word.as_str().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::types::{
        Chunk, ChunkMetadata, Dataset, DatasetMetadata, Document, DocumentMetadata, QuestionEntry,
    };

    fn chunk(id: &str, content: &str) -> Chunk {
        Chunk {
            chunk_id: id.to_string(),
            content: content.to_string(),
            subjects: Vec::new(),
            headings: Vec::new(),
            services: Vec::new(),
            categories: Vec::new(),
            client_name: None,
            project_id: None,
            client_id: None,
            content_type: None,
            metadata: ChunkMetadata::default(),
        }
    }

    fn dataset(chunks: Vec<Chunk>) -> Dataset {
        Dataset {
            metadata: DatasetMetadata {
                creation_date: String::new(),
                chunk_size: 600,
                chunk_overlap: 40,
                total_documents: 1,
                total_chunks: chunks.len(),
                subjects: Vec::new(),
                services: Vec::new(),
                clients: Vec::new(),
                directory_structure: serde_json::Value::Null,
            },
            documents: vec![Document {
                doc_id: "doc".into(),
                file_name: "doc.md".into(),
                file_type: ".md".into(),
                metadata: DocumentMetadata {
                    source_path: String::new(),
                    subject: None,
                    creation_date: String::new(),
                    total_chunks: chunks.len(),
                    original_size: 0,
                },
                chunks,
            }],
        }
    }

    #[test]
    fn word_overlap_links_question_to_chunk() {
        let data = dataset(vec![
            chunk("react", "Our stack includes React for frontend development"),
            chunk("print", "Letterpress printing on cotton stock"),
        ]);
        let builder = RelationshipBuilder::new(&[&data], DEFAULT_OVERLAP_THRESHOLD);

        let mut subjects = vec![QuestionSubject {
            id: "s1".into(),
            title: "Engineering".into(),
            tests: vec![QuestionEntry {
                id: "q1".into(),
                question: "What frontend stack do you use?".into(),
                correct_answer: "We use React for frontend".into(),
                correct_chunks: Vec::new(),
            }],
        }];
        builder.link_questions(&mut subjects);

        assert_eq!(subjects[0].tests[0].correct_chunks, vec!["react"]);
    }

    #[test]
    fn client_name_substring_links_regardless_of_overlap() {
        let mut named = chunk("hims", "A dense case study with many unrelated words inside it");
        named.client_name = Some("Hims".into());
        let data = dataset(vec![named]);
        let builder = RelationshipBuilder::new(&[&data], DEFAULT_OVERLAP_THRESHOLD);

        let related = builder.find_related_chunks("The hims launch was our flagship project");
        assert_eq!(related, vec!["hims"]);
    }

    #[test]
    fn service_title_must_match_exactly() {
        let mut a = chunk("a", "Brand work");
        a.services = vec!["Brand Identity".into()];
        a.project_id = Some("p1".into());
        a.client_id = Some("c1".into());
        let mut b = chunk("b", "More brand work");
        b.services = vec!["Brand Identity".into()];
        b.project_id = Some("p1".into());
        b.client_id = Some("c2".into());
        let mut c = chunk("c", "Adjacent work");
        c.services = vec!["Brand Strategy".into()];
        let data = dataset(vec![a, b, c]);
        let builder = RelationshipBuilder::new(&[&data], DEFAULT_OVERLAP_THRESHOLD);

        let mut services = vec![ServiceEntry {
            id: "svc".into(),
            title: "Brand Identity".into(),
            description: String::new(),
            correct_chunks: Vec::new(),
            project_ids: Vec::new(),
            client_ids: Vec::new(),
        }];
        builder.link_services(&mut services);

        assert_eq!(services[0].correct_chunks, vec!["a", "b"]);
        assert_eq!(services[0].project_ids, vec!["p1"]);
        assert_eq!(services[0].client_ids, vec!["c1", "c2"]);
    }

    #[test]
    fn low_overlap_does_not_link() {
        let data = dataset(vec![chunk(
            "other",
            "Completely different subject matter about ceramics and glazing techniques",
        )]);
        let builder = RelationshipBuilder::new(&[&data], DEFAULT_OVERLAP_THRESHOLD);
        assert!(
            builder
                .find_related_chunks("We use React for frontend")
                .is_empty()
        );
    }
}
