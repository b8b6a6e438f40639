//! Embedding and reranking client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::get_config;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
    /// Provider was unable to rerank the supplied documents.
    #[error("Failed to rerank documents: {0}")]
    RerankFailed(String),
    /// Transport-level failure talking to the provider.
    #[error("Embedding request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// One reranked document: its position in the input list and its score.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RerankResult {
    /// Index into the candidate list passed to `rerank`.
    pub index: usize,
    /// Provider relevance score, higher is more relevant.
    pub relevance_score: f32,
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient {
    /// Produce an embedding vector for each supplied chunk of text.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;

    /// Score candidate documents against a query, best first.
    async fn rerank(
        &self,
        query: &str,
        documents: Vec<String>,
        top_k: usize,
    ) -> Result<Vec<RerankResult>, EmbeddingClientError>;
}

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    input: &'a [String],
    model: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    documents: &'a [String],
    model: &'a str,
    top_k: usize,
}

#[derive(Deserialize)]
struct RerankResponse {
    data: Vec<RerankResult>,
}

/// HTTP embedding client for a Voyage-style embeddings/rerank API.
pub struct VoyageClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    rerank_model: String,
}

impl VoyageClient {
    /// Construct a client against an explicit endpoint.
    pub fn new(api_url: &str, api_key: &str, model: &str, rerank_model: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            rerank_model: rerank_model.to_string(),
        }
    }

    /// Construct a client from the process configuration.
    pub fn from_config() -> Self {
        let config = get_config();
        Self::new(
            &config.embedding_api_url,
            config.embedding_api_key.as_deref().unwrap_or_default(),
            &config.embedding_model,
            &config.rerank_model,
        )
    }
}

#[async_trait]
impl EmbeddingClient for VoyageClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if texts.is_empty() {
            return Err(EmbeddingClientError::GenerationFailed(
                "no texts provided".to_string(),
            ));
        }

        tracing::debug!(model = %self.model, count = texts.len(), "Generating embeddings");

        let response = self
            .http
            .post(format!("{}/embeddings", self.api_url))
            .bearer_auth(&self.api_key)
            .json(&EmbeddingsRequest {
                input: &texts,
                model: &self.model,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingClientError::GenerationFailed(format!(
                "provider returned {status}: {body}"
            )));
        }

        let mut parsed: EmbeddingsResponse = response.json().await?;
        if parsed.data.len() != texts.len() {
            return Err(EmbeddingClientError::GenerationFailed(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }

        parsed.data.sort_by_key(|entry| entry.index);
        Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
    }

    async fn rerank(
        &self,
        query: &str,
        documents: Vec<String>,
        top_k: usize,
    ) -> Result<Vec<RerankResult>, EmbeddingClientError> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        tracing::debug!(model = %self.rerank_model, candidates = documents.len(), top_k, "Reranking");

        let response = self
            .http
            .post(format!("{}/rerank", self.api_url))
            .bearer_auth(&self.api_key)
            .json(&RerankRequest {
                query,
                documents: &documents,
                model: &self.rerank_model,
                top_k,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingClientError::RerankFailed(format!(
                "provider returned {status}: {body}"
            )));
        }

        let parsed: RerankResponse = response.json().await?;
        Ok(parsed.data)
    }
}

/// Build an embedding client from the current configuration.
pub fn get_embedding_client() -> Box<dyn EmbeddingClient + Send + Sync> {
    Box::new(VoyageClient::from_config())
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[tokio::test]
    async fn embeddings_are_returned_in_input_order() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/embeddings")
                    .header("authorization", "Bearer key")
                    .json_body_partial(r#"{"model":"voyage-2"}"#);
                then.status(200).json_body(serde_json::json!({
                    "data": [
                        {"index": 1, "embedding": [0.3, 0.4]},
                        {"index": 0, "embedding": [0.1, 0.2]}
                    ]
                }));
            })
            .await;

        let client = VoyageClient::new(&server.base_url(), "key", "voyage-2", "rerank-2");
        let embeddings = client
            .generate_embeddings(vec!["first".into(), "second".into()])
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(embeddings, vec![vec![0.1, 0.2], vec![0.3, 0.4]]);
    }

    #[tokio::test]
    async fn count_mismatch_is_an_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/embeddings");
                then.status(200).json_body(serde_json::json!({
                    "data": [{"index": 0, "embedding": [0.1]}]
                }));
            })
            .await;

        let client = VoyageClient::new(&server.base_url(), "key", "voyage-2", "rerank-2");
        let result = client
            .generate_embeddings(vec!["first".into(), "second".into()])
            .await;
        assert!(matches!(
            result,
            Err(EmbeddingClientError::GenerationFailed(_))
        ));
    }

    #[tokio::test]
    async fn rerank_short_circuits_on_empty_candidates() {
        let client = VoyageClient::new("http://localhost:1", "key", "voyage-2", "rerank-2");
        let results = client.rerank("query", Vec::new(), 5).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn rerank_returns_provider_scores() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/rerank");
                then.status(200).json_body(serde_json::json!({
                    "data": [
                        {"index": 2, "relevance_score": 0.92},
                        {"index": 0, "relevance_score": 0.41}
                    ]
                }));
            })
            .await;

        let client = VoyageClient::new(&server.base_url(), "key", "voyage-2", "rerank-2");
        let results = client
            .rerank("query", vec!["a".into(), "b".into(), "c".into()], 2)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].index, 2);
        assert!((results[0].relevance_score - 0.92).abs() < f32::EPSILON);
    }
}
