//! Shared types used by the Qdrant client and helpers.

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors returned while interacting with Qdrant.
#[derive(Debug, Error)]
pub enum QdrantError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid Qdrant URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Qdrant responded with an unexpected status code.
    #[error("Unexpected Qdrant response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned from Qdrant.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
}

/// Prepared point ready for indexing: deterministic id, vector, and payload.
#[derive(Debug, Clone)]
pub struct ChunkPoint {
    /// Point identifier derived from the chunk id, stable across runs.
    pub id: String,
    /// Weighted embedding vector for the chunk.
    pub vector: Vec<f32>,
    /// Flattened chunk payload.
    pub payload: Map<String, Value>,
}

/// Metadata constraints applied to similarity search.
///
/// Priority is a ranking signal everywhere else; here it participates only as
/// a range threshold.
#[derive(Debug, Default, Clone)]
pub struct SearchFilterArgs {
    /// Inclusive lower bound on the stored `priority` field.
    pub min_priority: Option<f32>,
    /// Contains-any constraint for the `subjects` payload field.
    pub subjects: Option<Vec<String>>,
    /// Contains-any constraint for the `services` payload field.
    pub services: Option<Vec<String>>,
    /// Exact match constraint for the `content_type` payload field.
    pub content_type: Option<String>,
}

/// Scored payload returned by Qdrant queries.
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    /// Identifier assigned to the vector.
    pub id: String,
    /// Similarity score computed by Qdrant.
    pub score: f32,
    /// Optional payload associated with the vector.
    pub payload: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
pub(crate) struct QueryResponse {
    pub(crate) result: QueryResponseResult,
}

#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum QueryResponseResult {
    Points(Vec<QueryPoint>),
    Object {
        #[serde(default)]
        points: Vec<QueryPoint>,
    },
}

#[derive(Deserialize)]
pub(crate) struct QueryPoint {
    pub(crate) id: Value,
    pub(crate) score: f32,
    #[serde(default)]
    pub(crate) payload: Option<Map<String, Value>>,
}
