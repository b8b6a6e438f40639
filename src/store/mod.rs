//! Vector store: priority-weighted embedding, segmented upsert, and filtered,
//! reranked similarity search.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::get_config;
use crate::documents::types::Chunk;
use crate::embedding::{EmbeddingClient, EmbeddingClientError};
use crate::qdrant::{
    ChunkPoint, QdrantError, QdrantService, SearchFilterArgs, build_search_filter, flatten_chunk,
    point_id_for_chunk,
};

/// Errors surfaced by vector store operations.
#[derive(Debug, Error)]
pub enum VectorStoreError {
    /// Embedding or rerank provider failed.
    #[error(transparent)]
    Embedding(#[from] EmbeddingClientError),
    /// Vector index failed.
    #[error(transparent)]
    Qdrant(#[from] QdrantError),
}

/// Outcome of a segmented upsert run.
///
/// Partial success is acceptable; failed segments are counted, not fatal.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpsertReport {
    /// Points successfully upserted.
    pub points_upserted: usize,
    /// Total segments attempted.
    pub segments_total: usize,
    /// Segments that failed and were skipped.
    pub segments_failed: usize,
}

/// One retrieval hit: chunk text, relevance score, and flattened metadata.
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// Chunk identifier from the stored payload.
    pub chunk_id: String,
    /// Chunk text.
    pub text: String,
    /// Relevance score; reranker score when reranking ran, boosted
    /// similarity otherwise.
    pub score: f32,
    /// Flattened chunk payload.
    pub metadata: Map<String, Value>,
}

/// Tunables for embedding weighting and upsert pacing.
#[derive(Debug, Clone)]
pub struct VectorStoreOptions {
    /// Target collection name.
    pub collection: String,
    /// Divisor applied to effective priority inside the exponential weight.
    pub weight_factor: f32,
    /// Maximum points per upsert segment.
    pub segment_size: usize,
    /// Pause between segments, as rate-limit backpressure.
    pub segment_delay: Duration,
    /// Whether search results pass through the reranker.
    pub rerank_enabled: bool,
    /// Hard cap on requested result counts.
    pub max_limit: usize,
}

impl VectorStoreOptions {
    /// Read the tunables from the process configuration.
    pub fn from_config() -> Self {
        let config = get_config();
        Self {
            collection: config.qdrant_collection_name.clone(),
            weight_factor: config.priority_weight_factor,
            segment_size: config.upsert_segment_size,
            segment_delay: Duration::from_millis(config.upsert_segment_delay_ms),
            rerank_enabled: config.rerank_enabled,
            max_limit: config.search_max_limit,
        }
    }
}

/// Embeds enriched chunks into the index and serves filtered search.
pub struct VectorStore {
    qdrant: QdrantService,
    embedder: Arc<dyn EmbeddingClient + Send + Sync>,
    options: VectorStoreOptions,
    query_cache: Mutex<HashMap<String, Vec<f32>>>,
}

impl VectorStore {
    /// Build a store over the given index client and embedding backend.
    pub fn new(
        qdrant: QdrantService,
        embedder: Arc<dyn EmbeddingClient + Send + Sync>,
        options: VectorStoreOptions,
    ) -> Self {
        Self {
            qdrant,
            embedder,
            options,
            query_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Ensure the target collection and its payload indexes exist.
    pub async fn ensure_collection(&self, vector_size: u64) -> Result<(), VectorStoreError> {
        self.qdrant
            .create_collection_if_not_exists(&self.options.collection, vector_size)
            .await?;
        self.qdrant
            .ensure_payload_indexes(&self.options.collection)
            .await?;
        Ok(())
    }

    /// Embed, weight, and upsert a corpus of chunks.
    ///
    /// IDs derive from chunk ids, so re-running with the same corpus
    /// overwrites vectors in place rather than duplicating them.
    pub async fn upsert_chunks(&self, chunks: &[Chunk]) -> Result<UpsertReport, VectorStoreError> {
        if chunks.is_empty() {
            return Ok(UpsertReport::default());
        }

        let texts: Vec<String> = chunks.iter().map(enhanced_text).collect();
        let embeddings = self.embedder.generate_embeddings(texts).await?;

        let strengths: Vec<f32> = chunks
            .iter()
            .map(|chunk| relationship_strength(chunk, chunks))
            .collect();
        let max_strength = strengths.iter().copied().fold(1.0_f32, f32::max);

        let points: Vec<ChunkPoint> = chunks
            .iter()
            .zip(embeddings)
            .zip(&strengths)
            .map(|((chunk, embedding), strength)| {
                let effective_priority = chunk.metadata.priority * strength;
                let weight = (effective_priority / self.options.weight_factor).exp();
                let vector: Vec<f32> = embedding.iter().map(|value| value * weight).collect();

                let stored_priority = (chunk.metadata.priority / max_strength).min(1.0);
                ChunkPoint {
                    id: point_id_for_chunk(&chunk.chunk_id),
                    vector,
                    payload: flatten_chunk(chunk, stored_priority),
                }
            })
            .collect();

        let mut report = UpsertReport::default();
        let segments: Vec<&[ChunkPoint]> = points.chunks(self.options.segment_size).collect();
        report.segments_total = segments.len();

        for (index, segment) in segments.iter().enumerate() {
            match self
                .qdrant
                .upsert_points(&self.options.collection, segment)
                .await
            {
                Ok(()) => {
                    report.points_upserted += segment.len();
                    debug!(segment = index + 1, points = segment.len(), "segment upserted");
                }
                Err(err) => {
                    report.segments_failed += 1;
                    warn!(segment = index + 1, %err, "segment upsert failed, continuing");
                }
            }
            if index + 1 < segments.len() && !self.options.segment_delay.is_zero() {
                tokio::time::sleep(self.options.segment_delay).await;
            }
        }

        info!(
            points = report.points_upserted,
            segments = report.segments_total,
            failed = report.segments_failed,
            "corpus upsert finished"
        );
        Ok(report)
    }

    /// Filtered similarity search with optional reranking.
    ///
    /// A query embedding failure is an error, not an empty result; an empty
    /// candidate list short-circuits reranking and returns empty.
    pub async fn search(
        &self,
        query: &str,
        filter: &SearchFilterArgs,
        k: usize,
    ) -> Result<Vec<SearchResult>, VectorStoreError> {
        let k = k.clamp(1, self.options.max_limit);
        let vector = self.query_embedding(query).await?;

        let points = self
            .qdrant
            .search_points(
                &self.options.collection,
                vector,
                build_search_filter(filter),
                k,
            )
            .await?;

        let mut candidates: Vec<SearchResult> = points
            .into_iter()
            .map(|point| {
                let metadata = point.payload.unwrap_or_default();
                let chunk_id = metadata
                    .get("chunk_id")
                    .and_then(Value::as_str)
                    .unwrap_or(&point.id)
                    .to_string();
                let text = metadata
                    .get("text")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                // stored priority re-enters as an additive score boost;
                // cosine search alone would erase the upsert-time weighting
                // on normalized vectors
                let boost = metadata
                    .get("priority")
                    .and_then(Value::as_f64)
                    .map(|priority| priority as f32 / self.options.weight_factor)
                    .unwrap_or(0.0);
                SearchResult {
                    chunk_id,
                    text,
                    score: point.score + boost,
                    metadata,
                }
            })
            .collect();
        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

        if candidates.is_empty() || !self.options.rerank_enabled {
            return Ok(candidates);
        }

        let documents: Vec<String> = candidates
            .iter()
            .map(|candidate| candidate.text.clone())
            .collect();
        match self.embedder.rerank(query, documents, k).await {
            Ok(ranked) => {
                let reordered = ranked
                    .into_iter()
                    .filter_map(|entry| {
                        candidates.get(entry.index).map(|candidate| SearchResult {
                            score: entry.relevance_score,
                            ..candidate.clone()
                        })
                    })
                    .collect();
                Ok(reordered)
            }
            Err(err) => {
                warn!(%err, "rerank failed, falling back to similarity order");
                Ok(candidates)
            }
        }
    }

    async fn query_embedding(&self, query: &str) -> Result<Vec<f32>, VectorStoreError> {
        if let Ok(cache) = self.query_cache.lock()
            && let Some(vector) = cache.get(query)
        {
            return Ok(vector.clone());
        }

        let mut embeddings = self
            .embedder
            .generate_embeddings(vec![query.to_string()])
            .await?;
        let vector = embeddings.pop().ok_or_else(|| {
            EmbeddingClientError::GenerationFailed("provider returned no query embedding".into())
        })?;

        if let Ok(mut cache) = self.query_cache.lock() {
            cache.insert(query.to_string(), vector.clone());
        }
        Ok(vector)
    }
}

/// Compose the text that actually gets embedded for a chunk.
///
/// Structural context lines come first in a fixed order; a line is omitted
/// entirely when its source field is empty.
pub fn enhanced_text(chunk: &Chunk) -> String {
    let mut lines: Vec<String> = Vec::new();

    if !chunk.headings.is_empty() {
        lines.push(format!("Headings: {}", chunk.headings.join(" > ")));
    }
    if !chunk.subjects.is_empty() {
        lines.push(format!("Subjects: {}", chunk.subjects.join(", ")));
    }
    if !chunk.services.is_empty() {
        lines.push(format!("Services: {}", chunk.services.join(", ")));
    }
    if let Some(client) = chunk.client_name.as_deref().filter(|name| !name.is_empty()) {
        lines.push(format!("Client: {client}"));
    }
    if let Some(content_type) = chunk.content_type {
        let tag = serde_json::to_value(content_type)
            .ok()
            .and_then(|value| value.as_str().map(str::to_string))
            .unwrap_or_default();
        if !tag.is_empty() {
            lines.push(format!("Content type: {tag}"));
        }
    }

    if lines.is_empty() {
        chunk.content.clone()
    } else {
        format!("{}\n\n{}", lines.join("\n"), chunk.content)
    }
}

/// Relationship strength for a chunk within its batch.
///
/// Starts at 1.0 and grows by 0.2 per relationship: forward links when the
/// chunk carries them, otherwise reverse references found in the rest of the
/// batch.
pub fn relationship_strength(chunk: &Chunk, all: &[Chunk]) -> f32 {
    let forward = chunk.metadata.related_chunks.len();
    let count = if forward > 0 {
        forward
    } else {
        all.iter()
            .filter(|other| {
                other
                    .metadata
                    .related_chunks
                    .iter()
                    .any(|id| *id == chunk.chunk_id)
            })
            .count()
    };
    1.0 + 0.2 * count as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::types::{ChunkMetadata, ContentType};
    use crate::embedding::VoyageClient;
    use httpmock::prelude::*;

    fn chunk(id: &str, content: &str, priority: f32) -> Chunk {
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
            metadata: ChunkMetadata {
                source: "test.md".into(),
                chunk_number: 1,
                priority,
                ..ChunkMetadata::default()
            },
        }
    }

    #[test]
    fn enhanced_text_orders_context_lines_and_omits_empty() {
        let mut rich = chunk("a", "The work itself.", 0.5);
        rich.headings = vec!["Studio".into(), "Services".into()];
        rich.subjects = vec!["Case Studies".into()];
        rich.client_name = Some("Hims".into());
        rich.content_type = Some(ContentType::Project);

        let text = enhanced_text(&rich);
        assert_eq!(
            text,
            "Headings: Studio > Services\nSubjects: Case Studies\nClient: Hims\nContent type: project\n\nThe work itself."
        );

        let bare = chunk("b", "Just text.", 0.0);
        assert_eq!(enhanced_text(&bare), "Just text.");
    }

    #[test]
    fn relationship_strength_counts_forward_then_reverse() {
        let mut linked = chunk("a", "x", 0.5);
        linked.metadata.related_chunks = vec!["b".into(), "c".into()];
        let mut referencing = chunk("b", "y", 0.5);
        referencing.metadata.related_chunks = vec!["target".into()];
        let target = chunk("target", "z", 0.5);

        let all = vec![linked.clone(), referencing.clone(), target.clone()];
        assert!((relationship_strength(&linked, &all) - 1.4).abs() < f32::EPSILON);
        assert!((relationship_strength(&target, &all) - 1.2).abs() < f32::EPSILON);

        let lonely = chunk("lonely", "w", 0.5);
        assert!((relationship_strength(&lonely, &all) - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn more_relationships_never_weigh_less() {
        let weight = |n: usize| {
            let mut c = chunk("c", "x", 0.5);
            c.metadata.related_chunks = (0..n).map(|i| format!("r{i}")).collect();
            let strength = relationship_strength(&c, &[]);
            (0.5 * strength / 2.0_f32).exp()
        };
        assert!(weight(1) >= weight(0));
        assert!(weight(5) >= weight(1));
        assert!(weight(10) >= weight(5));
    }

    fn options(collection: &str) -> VectorStoreOptions {
        VectorStoreOptions {
            collection: collection.to_string(),
            weight_factor: 2.0,
            segment_size: 2,
            segment_delay: Duration::ZERO,
            rerank_enabled: false,
            max_limit: 50,
        }
    }

    #[tokio::test]
    async fn upsert_segments_and_reports_partial_failures() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/embeddings");
                then.status(200).json_body(serde_json::json!({
                    "data": [
                        {"index": 0, "embedding": [1.0, 0.0]},
                        {"index": 1, "embedding": [0.0, 1.0]},
                        {"index": 2, "embedding": [1.0, 1.0]}
                    ]
                }));
            })
            .await;
        let upsert_mock = server
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/studio/points");
                then.status(200)
                    .json_body(serde_json::json!({"status": "ok"}));
            })
            .await;

        let embedder = Arc::new(VoyageClient::new(
            &server.base_url(),
            "key",
            "voyage-2",
            "rerank-2",
        ));
        let qdrant = QdrantService::with_connection(&server.base_url(), None).expect("client");
        let store = VectorStore::new(qdrant, embedder, options("studio"));

        let chunks = vec![
            chunk("a", "first", 0.5),
            chunk("b", "second", 0.5),
            chunk("c", "third", 0.5),
        ];
        let report = store.upsert_chunks(&chunks).await.unwrap();

        // three points in segments of two
        assert_eq!(report.segments_total, 2);
        assert_eq!(report.segments_failed, 0);
        assert_eq!(report.points_upserted, 3);
        upsert_mock.assert_hits_async(2).await;
    }

    #[tokio::test]
    async fn search_boosts_by_stored_priority() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/embeddings");
                then.status(200).json_body(serde_json::json!({
                    "data": [{"index": 0, "embedding": [1.0, 0.0]}]
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/collections/studio/points/query");
                then.status(200).json_body(serde_json::json!({
                    "result": [
                        {"id": "p1", "score": 0.80, "payload":
                            {"chunk_id": "low", "text": "low priority", "priority": 0.0}},
                        {"id": "p2", "score": 0.78, "payload":
                            {"chunk_id": "high", "text": "high priority", "priority": 0.9}}
                    ]
                }));
            })
            .await;

        let embedder = Arc::new(VoyageClient::new(
            &server.base_url(),
            "key",
            "voyage-2",
            "rerank-2",
        ));
        let qdrant = QdrantService::with_connection(&server.base_url(), None).expect("client");
        let store = VectorStore::new(qdrant, embedder, options("studio"));

        let results = store
            .search("query", &SearchFilterArgs::default(), 5)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        // 0.78 + 0.9/2.0 outranks 0.80 + 0.0
        assert_eq!(results[0].chunk_id, "high");
    }

    #[tokio::test]
    async fn empty_candidates_return_empty_without_rerank() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/embeddings");
                then.status(200).json_body(serde_json::json!({
                    "data": [{"index": 0, "embedding": [1.0, 0.0]}]
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/collections/studio/points/query");
                then.status(200).json_body(serde_json::json!({"result": []}));
            })
            .await;
        let rerank_mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/rerank");
                then.status(200).json_body(serde_json::json!({"data": []}));
            })
            .await;

        let embedder = Arc::new(VoyageClient::new(
            &server.base_url(),
            "key",
            "voyage-2",
            "rerank-2",
        ));
        let qdrant = QdrantService::with_connection(&server.base_url(), None).expect("client");
        let mut opts = options("studio");
        opts.rerank_enabled = true;
        let store = VectorStore::new(qdrant, embedder, opts);

        let results = store
            .search("query", &SearchFilterArgs::default(), 5)
            .await
            .unwrap();
        assert!(results.is_empty());
        rerank_mock.assert_hits_async(0).await;
    }

    #[tokio::test]
    async fn query_embedding_failure_is_an_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/embeddings");
                then.status(500).body("overloaded");
            })
            .await;

        let embedder = Arc::new(VoyageClient::new(
            &server.base_url(),
            "key",
            "voyage-2",
            "rerank-2",
        ));
        let qdrant = QdrantService::with_connection(&server.base_url(), None).expect("client");
        let store = VectorStore::new(qdrant, embedder, options("studio"));

        let result = store.search("query", &SearchFilterArgs::default(), 5).await;
        assert!(matches!(result, Err(VectorStoreError::Embedding(_))));
    }

    #[tokio::test]
    async fn rerank_order_is_authoritative() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/embeddings");
                then.status(200).json_body(serde_json::json!({
                    "data": [{"index": 0, "embedding": [1.0, 0.0]}]
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/collections/studio/points/query");
                then.status(200).json_body(serde_json::json!({
                    "result": [
                        {"id": "p1", "score": 0.9, "payload": {"chunk_id": "a", "text": "alpha"}},
                        {"id": "p2", "score": 0.5, "payload": {"chunk_id": "b", "text": "beta"}}
                    ]
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/rerank");
                then.status(200).json_body(serde_json::json!({
                    "data": [
                        {"index": 1, "relevance_score": 0.95},
                        {"index": 0, "relevance_score": 0.40}
                    ]
                }));
            })
            .await;

        let embedder = Arc::new(VoyageClient::new(
            &server.base_url(),
            "key",
            "voyage-2",
            "rerank-2",
        ));
        let qdrant = QdrantService::with_connection(&server.base_url(), None).expect("client");
        let mut opts = options("studio");
        opts.rerank_enabled = true;
        let store = VectorStore::new(qdrant, embedder, opts);

        let results = store
            .search("query", &SearchFilterArgs::default(), 2)
            .await
            .unwrap();
        assert_eq!(results[0].chunk_id, "b");
        assert!((results[0].score - 0.95).abs() < f32::EPSILON);
        assert_eq!(results[1].chunk_id, "a");
    }
}
