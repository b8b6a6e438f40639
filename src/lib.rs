#![deny(missing_docs)]

//! Core library for the Little Plains retrieval-augmented chatbot backend.

/// HTTP routing and REST handlers.
pub mod api;
/// Conversational orchestration and media extraction.
pub mod chat;
/// Environment-driven configuration management.
pub mod config;
/// Format processors, chunkers, and relationship building.
pub mod documents;
/// Embedding and rerank client abstraction.
pub mod embedding;
/// LLM client for generation, streaming, and token counting.
pub mod llm;
/// Structured logging and tracing setup.
pub mod logging;
/// Ingestion metrics helpers.
pub mod metrics;
/// Qdrant vector store integration.
pub mod qdrant;
/// Conversation session and token-budget management.
pub mod session;
/// Priority-weighted vector store over the Qdrant client.
pub mod store;
