//! Conversational orchestration: topic routing, context assembly, media
//! extraction, and streaming replies.

use std::sync::Arc;

use async_stream::try_stream;
use futures_util::StreamExt;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::get_config;
use crate::llm::{ChatMessage, LlmClient, LlmClientError, TokenStream};
use crate::qdrant::SearchFilterArgs;
use crate::session::{SessionManager, SessionStats};
use crate::store::{SearchResult, VectorStore, VectorStoreError};

/// System prompt used when the question touches studio topics.
const ON_TOPIC_IDENTITY: &str = "You are the voice of Little Plains, a digital design studio. \
Answer questions about the studio's work, services, clients, and process warmly and precisely, \
drawing only on the material provided in the conversation. If the material does not cover the \
question, say so honestly rather than inventing details.";

/// System prompt used for everything else.
const OFF_TOPIC_IDENTITY: &str = "You are the voice of Little Plains, a digital design studio. \
The visitor is asking about something outside the studio's work. Reply briefly and kindly, and \
steer the conversation back to the studio's design services, projects, and clients.";

/// Template that wraps retrieved context around the visitor's question.
const CONTEXT_TEMPLATE: &str = "Answer the following question as clearly and naturally as possible, using the relevant details below.";

/// Reply shown when retrieval produced nothing usable.
const NO_CONTEXT_FALLBACK: &str = "No relevant documents found.";

/// Reply shown when the retrieval backend itself is unreachable, so the
/// model can tell the visitor the studio archive is temporarily offline
/// instead of implying nothing matched.
const RETRIEVAL_UNAVAILABLE_NOTICE: &str = "The studio's document archive is temporarily \
unavailable, so no supporting material could be retrieved for this question.";

/// Errors raised while producing a reply.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The generation backend failed.
    #[error(transparent)]
    Llm(#[from] LlmClientError),
    /// Retrieval failed in a way that prevents answering.
    #[error(transparent)]
    Store(#[from] VectorStoreError),
}

/// A media item attached to a retrieved chunk, with its placeholder position.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MediaItem {
    /// Position of the item within its source chunk.
    pub position: usize,
    /// Media URL.
    pub url: String,
    /// `image` or `link`.
    pub kind: String,
    /// Alt text or link text, when present.
    pub text: Option<String>,
}

/// An external reference attached to a retrieved chunk.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ReferenceItem {
    /// Reference URL.
    pub url: String,
    /// Human-readable description.
    pub description: String,
}

/// Media and references collected across a result set.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MediaCollection {
    /// Inline images, in retrieval order.
    pub images: Vec<MediaItem>,
    /// Inline links, in retrieval order.
    pub links: Vec<MediaItem>,
    /// External references, in retrieval order.
    pub references: Vec<ReferenceItem>,
}

/// Gather media and references from retrieved payloads.
///
/// The three media arrays are padded to a common length before zipping, so a
/// missing type or text never shifts later items onto the wrong URL.
pub fn collect_media(results: &[SearchResult]) -> MediaCollection {
    let mut collection = MediaCollection::default();

    for result in results {
        let urls = string_array(&result.metadata, "media_urls");
        let kinds = string_array(&result.metadata, "media_types");
        let texts = string_array(&result.metadata, "media_texts");
        let len = urls.len().max(kinds.len()).max(texts.len());

        for position in 0..len {
            let Some(Some(url)) = urls.get(position) else {
                continue;
            };
            let kind = kinds
                .get(position)
                .cloned()
                .flatten()
                .unwrap_or_else(|| "link".to_string());
            let item = MediaItem {
                position,
                url: url.clone(),
                kind: kind.clone(),
                text: texts.get(position).cloned().flatten(),
            };
            if kind == "image" {
                collection.images.push(item);
            } else {
                collection.links.push(item);
            }
        }

        let ref_urls = string_array(&result.metadata, "reference_urls");
        let ref_descriptions = string_array(&result.metadata, "reference_descriptions");
        for (index, url) in ref_urls.into_iter().enumerate() {
            if let Some(url) = url {
                collection.references.push(ReferenceItem {
                    url,
                    description: ref_descriptions
                        .get(index)
                        .cloned()
                        .flatten()
                        .unwrap_or_default(),
                });
            }
        }
    }

    collection
}

fn string_array(metadata: &serde_json::Map<String, Value>, key: &str) -> Vec<Option<String>> {
    metadata
        .get(key)
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .map(|value| value.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Case-insensitive substring match of any topic label against the input.
pub fn topic_match(topics: &[String], input: &str) -> bool {
    let lowered = input.to_lowercase();
    topics
        .iter()
        .any(|topic| lowered.contains(&topic.to_lowercase()))
}

/// Orchestrates retrieval, session history, and generation for one visitor.
pub struct ChatBot {
    llm: Arc<dyn LlmClient + Send + Sync>,
    store: Arc<VectorStore>,
    session: Arc<Mutex<SessionManager>>,
    topics: Vec<String>,
    search_limit: usize,
}

impl ChatBot {
    /// Build a bot over the given backends, sized from the configuration.
    pub fn new(llm: Arc<dyn LlmClient + Send + Sync>, store: Arc<VectorStore>) -> Self {
        let config = get_config();
        Self {
            llm,
            store,
            session: Arc::new(Mutex::new(SessionManager::from_config())),
            topics: config.topics.clone(),
            search_limit: config.search_default_limit,
        }
    }

    /// Whether the question touches any configured studio topic.
    pub fn is_on_topic(&self, input: &str) -> bool {
        topic_match(&self.topics, input)
    }

    /// Pick the identity prompt for the given question.
    pub fn system_prompt(&self, input: &str) -> &'static str {
        if self.is_on_topic(input) {
            ON_TOPIC_IDENTITY
        } else {
            OFF_TOPIC_IDENTITY
        }
    }

    /// Retrieve context for a question.
    ///
    /// Degrades instead of failing: an unreachable store yields an outage
    /// notice, an empty result set yields the no-match fallback. The two are
    /// distinct so the model never claims nothing matched when the archive
    /// was simply down.
    pub async fn get_context(&self, input: &str) -> (String, Vec<SearchResult>) {
        let results = match self
            .store
            .search(input, &SearchFilterArgs::default(), self.search_limit)
            .await
        {
            Ok(results) => results,
            Err(err) => {
                warn!(%err, "retrieval failed, answering without context");
                return (RETRIEVAL_UNAVAILABLE_NOTICE.to_string(), Vec::new());
            }
        };

        if results.is_empty() {
            return (NO_CONTEXT_FALLBACK.to_string(), results);
        }

        let context = results
            .iter()
            .map(|result| result.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        debug!(chunks = results.len(), "context assembled");
        (context, results)
    }

    /// Answer a visitor question as a token stream.
    ///
    /// The raw question lands in the display transcript; the API history gets
    /// the context-wrapped version instead, so the LLM sees retrieval output
    /// the visitor never does. The assistant reply is committed to both
    /// histories once the stream completes.
    pub async fn process_user_input(&self, input: &str) -> Result<TokenStream, ChatError> {
        let system = self.system_prompt(input);
        let on_topic = self.is_on_topic(input);

        let api_message = if on_topic {
            let (context, _) = self.get_context(input).await;
            ChatMessage::user(format!(
                "{CONTEXT_TEMPLATE}\n\n{context}\n\nQuestion: {input}"
            ))
        } else {
            ChatMessage::user(input)
        };

        let messages = {
            let mut session = self.session.lock().await;
            session
                .add_message(self.llm.as_ref(), ChatMessage::user(input), false, true)
                .await;
            session
                .add_message(self.llm.as_ref(), api_message, true, false)
                .await;
            session.api_messages()
        };

        let mut inner = self.llm.stream_message(system, &messages).await?;
        let llm = Arc::clone(&self.llm);
        let session = Arc::clone(&self.session);

        let stream = try_stream! {
            let mut reply = String::new();
            while let Some(delta) = inner.next().await {
                let delta = delta?;
                reply.push_str(&delta);
                yield delta;
            }
            let mut session = session.lock().await;
            session
                .add_message(llm.as_ref(), ChatMessage::assistant(reply), true, true)
                .await;
        };
        Ok(stream.boxed())
    }

    /// Answer a question in one shot, without touching session history.
    ///
    /// Used by the evaluation harness, where each question stands alone.
    pub async fn process_eval_input(
        &self,
        input: &str,
    ) -> Result<(String, Vec<SearchResult>), ChatError> {
        let system = self.system_prompt(input);
        let (context, results) = self.get_context(input).await;
        let message = ChatMessage::user(format!(
            "{CONTEXT_TEMPLATE}\n\n{context}\n\nQuestion: {input}"
        ));
        let reply = self.llm.create_message(system, &[message]).await?;
        Ok((reply, results))
    }

    /// Filtered similarity search against the chunk collection.
    pub async fn search(
        &self,
        query: &str,
        filter: &SearchFilterArgs,
        limit: usize,
    ) -> Result<Vec<SearchResult>, VectorStoreError> {
        self.store.search(query, filter, limit).await
    }

    /// Clear the conversation.
    pub async fn reset_conversation(&self) {
        self.session.lock().await.reset();
    }

    /// Current token-budget snapshot.
    pub async fn session_stats(&self) -> SessionStats {
        self.session.lock().await.stats()
    }
}
