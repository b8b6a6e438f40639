use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing ingestion activity.
#[derive(Debug, Default)]
pub struct IngestMetrics {
    documents_processed: AtomicU64,
    chunks_processed: AtomicU64,
    files_skipped: AtomicU64,
}

impl IngestMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a processed document and the number of chunks produced for it.
    pub fn record_document(&self, chunk_count: u64) {
        self.documents_processed.fetch_add(1, Ordering::Relaxed);
        self.chunks_processed
            .fetch_add(chunk_count, Ordering::Relaxed);
    }

    /// Record a source file that failed to process and was skipped.
    pub fn record_skipped_file(&self) {
        self.files_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_processed: self.documents_processed.load(Ordering::Relaxed),
            chunks_processed: self.chunks_processed.load(Ordering::Relaxed),
            files_skipped: self.files_skipped.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of ingestion counters used for reporting.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Number of source documents processed since startup.
    pub documents_processed: u64,
    /// Total chunk count produced across all processed documents.
    pub chunks_processed: u64,
    /// Files skipped because their processor raised an error.
    pub files_skipped: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_documents_and_chunks() {
        let metrics = IngestMetrics::new();
        metrics.record_document(2);
        metrics.record_document(3);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.documents_processed, 2);
        assert_eq!(snapshot.chunks_processed, 5);
    }

    #[test]
    fn records_skipped_files_independently() {
        let metrics = IngestMetrics::new();
        metrics.record_skipped_file();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.documents_processed, 0);
        assert_eq!(snapshot.chunks_processed, 0);
        assert_eq!(snapshot.files_skipped, 1);
    }
}
