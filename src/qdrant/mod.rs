//! Qdrant vector index integration.

pub mod client;
pub mod filters;
pub mod payload;
pub mod types;

pub use client::QdrantService;
pub use filters::build_search_filter;
pub use payload::{flatten_chunk, point_id_for_chunk};
pub use types::{ChunkPoint, QdrantError, ScoredPoint, SearchFilterArgs};
