//! LLM client: message creation, streaming, and token counting against an
//! Anthropic-style messages API.

use async_stream::try_stream;
use async_trait::async_trait;
use futures_core::stream::BoxStream;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::config::get_config;

const API_VERSION: &str = "2023-06-01";

/// Errors raised by the LLM provider.
#[derive(Debug, Error)]
pub enum LlmClientError {
    /// Provider rejected the request or returned an unusable response.
    #[error("LLM request failed: {0}")]
    RequestFailed(String),
    /// Transport-level failure talking to the provider.
    #[error("LLM transport error: {0}")]
    Http(#[from] reqwest::Error),
}

/// One conversation message in provider wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// `user` or `assistant`.
    pub role: String,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// Build a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    /// Build an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Incremental text chunks produced by a streaming completion.
pub type TokenStream = BoxStream<'static, Result<String, LlmClientError>>;

/// Interface implemented by LLM backends.
#[async_trait]
pub trait LlmClient {
    /// Generate a complete response for the given conversation.
    async fn create_message(
        &self,
        system: &str,
        messages: &[ChatMessage],
    ) -> Result<String, LlmClientError>;

    /// Generate a response as a stream of text deltas.
    async fn stream_message(
        &self,
        system: &str,
        messages: &[ChatMessage],
    ) -> Result<TokenStream, LlmClientError>;

    /// Count input tokens for the given messages.
    ///
    /// Counting failures are logged and reported as zero so conversation flow
    /// never stalls on the counting endpoint.
    async fn count_tokens(&self, messages: &[ChatMessage]) -> u64;
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    system: &'a str,
    max_tokens: u32,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Serialize)]
struct CountTokensRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct CountTokensResponse {
    input_tokens: u64,
}

#[derive(Deserialize)]
struct StreamEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    delta: Option<StreamDelta>,
}

#[derive(Deserialize)]
struct StreamDelta {
    #[serde(default)]
    text: Option<String>,
}

/// HTTP client for an Anthropic-style messages API.
pub struct AnthropicClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicClient {
    /// Construct a client against an explicit endpoint.
    pub fn new(api_url: &str, api_key: &str, model: &str, max_tokens: u32) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            max_tokens,
        }
    }

    /// Construct a client from the process configuration.
    pub fn from_config() -> Self {
        let config = get_config();
        Self::new(
            &config.llm_api_url,
            config.llm_api_key.as_deref().unwrap_or_default(),
            &config.llm_model,
            config.llm_max_tokens,
        )
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .post(format!("{}{path}", self.api_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn create_message(
        &self,
        system: &str,
        messages: &[ChatMessage],
    ) -> Result<String, LlmClientError> {
        let response = self
            .post("/messages")
            .json(&MessagesRequest {
                model: &self.model,
                system,
                max_tokens: self.max_tokens,
                messages,
                stream: false,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmClientError::RequestFailed(format!(
                "provider returned {status}: {body}"
            )));
        }

        let parsed: MessagesResponse = response.json().await?;
        Ok(parsed
            .content
            .into_iter()
            .map(|block| block.text)
            .collect::<Vec<_>>()
            .join(""))
    }

    async fn stream_message(
        &self,
        system: &str,
        messages: &[ChatMessage],
    ) -> Result<TokenStream, LlmClientError> {
        let response = self
            .post("/messages")
            .json(&MessagesRequest {
                model: &self.model,
                system,
                max_tokens: self.max_tokens,
                messages,
                stream: true,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmClientError::RequestFailed(format!(
                "provider returned {status}: {body}"
            )));
        }

        let mut bytes = response.bytes_stream();
        let stream = try_stream! {
            let mut buffer = String::new();
            while let Some(chunk) = bytes.next().await {
                let chunk = chunk?;
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(boundary) = buffer.find('\n') {
                    let line = buffer[..boundary].trim_end_matches('\r').to_string();
                    buffer.drain(..=boundary);

                    let Some(payload) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    let Ok(event) = serde_json::from_str::<StreamEvent>(payload) else {
                        continue;
                    };
                    if event.kind == "content_block_delta"
                        && let Some(text) = event.delta.and_then(|delta| delta.text)
                        && !text.is_empty()
                    {
                        yield text;
                    }
                }
            }
        };
        Ok(stream.boxed())
    }

    async fn count_tokens(&self, messages: &[ChatMessage]) -> u64 {
        let result = async {
            let response = self
                .post("/messages/count_tokens")
                .json(&CountTokensRequest {
                    model: &self.model,
                    messages,
                })
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(LlmClientError::RequestFailed(format!(
                    "provider returned {status}: {body}"
                )));
            }

            let parsed: CountTokensResponse = response.json().await?;
            Ok(parsed.input_tokens)
        }
        .await;

        match result {
            Ok(count) => count,
            Err(err) => {
                warn!(%err, "token counting failed, treating message as zero tokens");
                0
            }
        }
    }
}

/// Build an LLM client from the current configuration.
pub fn get_llm_client() -> Box<dyn LlmClient + Send + Sync> {
    Box::new(AnthropicClient::from_config())
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[tokio::test]
    async fn create_message_joins_content_blocks() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/messages")
                    .header("x-api-key", "key")
                    .json_body_partial(r#"{"model":"claude-3-5-haiku-latest"}"#);
                then.status(200).json_body(serde_json::json!({
                    "content": [
                        {"type": "text", "text": "We are a design"},
                        {"type": "text", "text": " studio."}
                    ]
                }));
            })
            .await;

        let client =
            AnthropicClient::new(&server.base_url(), "key", "claude-3-5-haiku-latest", 1024);
        let reply = client
            .create_message("identity", &[ChatMessage::user("Who are you?")])
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(reply, "We are a design studio.");
    }

    #[tokio::test]
    async fn stream_message_yields_text_deltas() {
        let server = MockServer::start_async().await;
        let body = concat!(
            "event: message_start\n",
            "data: {\"type\":\"message_start\"}\n",
            "\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"Hello\"}}\n",
            "\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\" there\"}}\n",
            "\n",
            "event: message_stop\n",
            "data: {\"type\":\"message_stop\"}\n",
            "\n",
        );
        server
            .mock_async(|when, then| {
                when.method(POST).path("/messages");
                then.status(200)
                    .header("content-type", "text/event-stream")
                    .body(body);
            })
            .await;

        let client = AnthropicClient::new(&server.base_url(), "key", "model", 1024);
        let mut stream = client
            .stream_message("identity", &[ChatMessage::user("hi")])
            .await
            .unwrap();

        let mut collected = String::new();
        while let Some(delta) = stream.next().await {
            collected.push_str(&delta.unwrap());
        }
        assert_eq!(collected, "Hello there");
    }

    #[tokio::test]
    async fn count_tokens_reads_input_tokens() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/messages/count_tokens");
                then.status(200)
                    .json_body(serde_json::json!({"input_tokens": 42}));
            })
            .await;

        let client = AnthropicClient::new(&server.base_url(), "key", "model", 1024);
        assert_eq!(client.count_tokens(&[ChatMessage::user("hi")]).await, 42);
    }

    #[tokio::test]
    async fn count_tokens_failure_falls_back_to_zero() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/messages/count_tokens");
                then.status(500).body("overloaded");
            })
            .await;

        let client = AnthropicClient::new(&server.base_url(), "key", "model", 1024);
        assert_eq!(client.count_tokens(&[ChatMessage::user("hi")]).await, 0);
    }
}
