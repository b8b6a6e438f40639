//! Structured JSON processors for Q&A datasets and service catalogs.

use std::path::Path;

use super::types::{ProcessorError, QuestionSubject, RawSplit, ServiceEntry, SplitMetadata};
use super::utils;

/// Processor-local priority boost for structured Q&A and service content.
pub const QA_PRIORITY_BOOST: f32 = 0.8;

/// Emits one split per question in a subject/test hierarchy.
///
/// Split content pairs the question with its answer so both sides are
/// retrievable; the question text and any pre-linked chunk ids ride along in
/// metadata.
#[derive(Debug, Clone, Copy)]
pub struct QaProcessor {
    priority_boost: f32,
}

impl Default for QaProcessor {
    fn default() -> Self {
        Self::new(QA_PRIORITY_BOOST)
    }
}

impl QaProcessor {
    /// Build a processor with an explicit priority boost.
    pub fn new(priority_boost: f32) -> Self {
        Self { priority_boost }
    }

    /// Process a Q&A dataset file into raw splits.
    pub fn process(&self, path: &Path) -> Result<Vec<RawSplit>, ProcessorError> {
        let subjects: Vec<QuestionSubject> = utils::load_json(path)?;
        Ok(self.process_subjects(&subjects))
    }

    /// Flatten the subject/test hierarchy into splits.
    pub fn process_subjects(&self, subjects: &[QuestionSubject]) -> Vec<RawSplit> {
        let mut splits = Vec::new();
        for subject in subjects {
            for test in &subject.tests {
                if test.question.trim().is_empty() && test.correct_answer.trim().is_empty() {
                    continue;
                }
                splits.push(RawSplit {
                    text: format!(
                        "Question: {}\nAnswer: {}",
                        test.question, test.correct_answer
                    ),
                    metadata: SplitMetadata {
                        subject: Some(subject.title.clone()),
                        question: Some(test.question.clone()),
                        question_id: Some(test.id.clone()),
                        related_chunks: test.correct_chunks.clone(),
                        priority_score: self.priority_boost,
                        ..SplitMetadata::default()
                    },
                });
            }
        }
        splits
    }
}

/// Emits one split per service catalog entry.
#[derive(Debug, Clone, Copy)]
pub struct ServicesProcessor {
    priority_boost: f32,
}

impl Default for ServicesProcessor {
    fn default() -> Self {
        Self::new(QA_PRIORITY_BOOST)
    }
}

impl ServicesProcessor {
    /// Build a processor with an explicit priority boost.
    pub fn new(priority_boost: f32) -> Self {
        Self { priority_boost }
    }

    /// Process a service catalog file into raw splits.
    pub fn process(&self, path: &Path) -> Result<Vec<RawSplit>, ProcessorError> {
        let services: Vec<ServiceEntry> = utils::load_json(path)?;
        Ok(self.process_services(&services))
    }

    /// Convert service entries into splits tagged with the service title.
    pub fn process_services(&self, services: &[ServiceEntry]) -> Vec<RawSplit> {
        services
            .iter()
            .filter(|service| !service.title.trim().is_empty())
            .map(|service| RawSplit {
                text: format!("{}\n\n{}", service.title, service.description),
                metadata: SplitMetadata {
                    service: Some(service.title.clone()),
                    related_chunks: service.correct_chunks.clone(),
                    priority_score: self.priority_boost,
                    ..SplitMetadata::default()
                },
            })
            .collect()
    }
}
