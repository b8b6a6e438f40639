//! HTTP surface for the studio chatbot.
//!
//! A compact Axum router with a handful of endpoints:
//!
//! - `POST /search` – Filtered similarity search over the chunk collection,
//!   returning scored results and the media attached to them.
//! - `POST /chat` – Answer a visitor question; the reply streams back as
//!   plain text while session history updates behind the scenes.
//! - `GET /session/stats` – Observe the conversation token budget.
//! - `POST /session/reset` – Clear the conversation.

use crate::chat::{ChatError, MediaCollection, collect_media};
use crate::config::get_config;
use crate::llm::TokenStream;
use crate::qdrant::SearchFilterArgs;
use crate::session::SessionStats;
use crate::store::{SearchResult, VectorStoreError};
use async_trait::async_trait;
use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Operations the HTTP surface needs from the chat service.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Filtered similarity search.
    async fn search(
        &self,
        query: &str,
        filter: &SearchFilterArgs,
        limit: usize,
    ) -> Result<Vec<SearchResult>, VectorStoreError>;

    /// Answer a visitor question as a token stream.
    async fn chat(&self, input: &str) -> Result<TokenStream, ChatError>;

    /// Clear the conversation.
    async fn reset_session(&self);

    /// Current token-budget snapshot.
    async fn session_stats(&self) -> SessionStats;
}

#[async_trait]
impl ChatApi for crate::chat::ChatBot {
    async fn search(
        &self,
        query: &str,
        filter: &SearchFilterArgs,
        limit: usize,
    ) -> Result<Vec<SearchResult>, VectorStoreError> {
        Self::search(self, query, filter, limit).await
    }

    async fn chat(&self, input: &str) -> Result<TokenStream, ChatError> {
        self.process_user_input(input).await
    }

    async fn reset_session(&self) {
        self.reset_conversation().await;
    }

    async fn session_stats(&self) -> SessionStats {
        Self::session_stats(self).await
    }
}

/// Build the HTTP router over the chat service.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: ChatApi + 'static,
{
    Router::new()
        .route("/search", post(search::<S>))
        .route("/chat", post(chat::<S>))
        .route("/session/stats", get(session_stats::<S>))
        .route("/session/reset", post(reset_session::<S>))
        .with_state(service)
}

/// Request body for `POST /search`.
#[derive(Deserialize)]
struct SearchRequest {
    /// Query text to embed and search with.
    query: String,
    /// Optional result count (defaults to `SEARCH_DEFAULT_LIMIT`).
    #[serde(default)]
    limit: Option<usize>,
    /// Optional inclusive lower bound on stored priority.
    #[serde(default)]
    min_priority: Option<f32>,
    /// Optional contains-any subject constraint.
    #[serde(default)]
    subjects: Option<Vec<String>>,
    /// Optional contains-any service constraint.
    #[serde(default)]
    services: Option<Vec<String>>,
    /// Optional exact content-type constraint.
    #[serde(default)]
    content_type: Option<String>,
}

/// One scored hit in a `POST /search` response.
#[derive(Serialize)]
struct SearchHit {
    chunk_id: String,
    text: String,
    score: f32,
    metadata: serde_json::Map<String, serde_json::Value>,
}

/// Response body for `POST /search`.
#[derive(Serialize)]
struct SearchResponse {
    results: Vec<SearchHit>,
    media: MediaCollection,
}

/// Search the chunk collection.
async fn search<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError>
where
    S: ChatApi,
{
    let filter = SearchFilterArgs {
        min_priority: request.min_priority,
        subjects: request.subjects,
        services: request.services,
        content_type: request.content_type,
    };
    let limit = request
        .limit
        .unwrap_or_else(|| get_config().search_default_limit);
    let results = service.search(&request.query, &filter, limit).await?;
    tracing::info!(
        query = %request.query,
        hits = results.len(),
        "Search request completed"
    );

    let media = collect_media(&results);
    let hits = results
        .into_iter()
        .map(|result| SearchHit {
            chunk_id: result.chunk_id,
            text: result.text,
            score: result.score,
            metadata: result.metadata,
        })
        .collect();
    Ok(Json(SearchResponse {
        results: hits,
        media,
    }))
}

/// Request body for `POST /chat`.
#[derive(Deserialize)]
struct ChatRequest {
    /// Visitor question.
    message: String,
}

/// Answer a visitor question, streaming the reply as plain text.
async fn chat<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<ChatRequest>,
) -> Result<Response, AppError>
where
    S: ChatApi,
{
    let stream = service.chat(&request.message).await?;
    let body = Body::from_stream(stream.map(|delta| delta.map(axum::body::Bytes::from)));
    Ok(Response::builder()
        .header("content-type", "text/plain; charset=utf-8")
        .body(body)
        .map_err(|err| AppError(err.to_string()))?)
}

/// Return the session token-budget snapshot.
async fn session_stats<S>(State(service): State<Arc<S>>) -> Json<SessionStats>
where
    S: ChatApi,
{
    Json(service.session_stats().await)
}

/// Clear the conversation and return the fresh budget snapshot.
async fn reset_session<S>(State(service): State<Arc<S>>) -> Json<SessionStats>
where
    S: ChatApi,
{
    service.reset_session().await;
    tracing::info!("Session reset");
    Json(service.session_stats().await)
}

struct AppError(String);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, self.0).into_response()
    }
}

impl From<VectorStoreError> for AppError {
    fn from(inner: VectorStoreError) -> Self {
        Self(inner.to_string())
    }
}

impl From<ChatError> for AppError {
    fn from(inner: ChatError) -> Self {
        Self(inner.to_string())
    }
}
