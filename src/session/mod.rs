//! Conversation session state and token-budget management.
//!
//! The session keeps two parallel histories: the full display transcript
//! shown to the user, and the trimmed API history actually sent to the LLM.

use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::config::get_config;
use crate::llm::{ChatMessage, LlmClient};

/// Messages always kept at the tail of the API history, regardless of budget.
const MIN_RETAINED_MESSAGES: usize = 4;
/// Maximum messages kept in the display transcript.
const DISPLAY_MESSAGE_CAP: usize = 20;

/// An API-history message with its measured token cost.
#[derive(Debug, Clone)]
struct TrackedMessage {
    message: ChatMessage,
    tokens: u64,
    timestamp: OffsetDateTime,
}

/// Snapshot of the session token budget.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    /// Tokens currently held by the API history.
    pub current_usage: u64,
    /// Configured input-token budget.
    pub max_tokens: usize,
    /// Usage as a percentage of the budget.
    pub percent_used: f32,
    /// Messages currently in the API history.
    pub message_count: usize,
    /// Tokens left before the budget is reached.
    pub remaining_tokens: u64,
}

/// Tracks conversation history against a token budget, trimming oldest
/// messages when usage crosses the buffer threshold.
pub struct SessionManager {
    max_tokens: usize,
    token_buffer: usize,
    api_messages: Vec<TrackedMessage>,
    display_messages: Vec<ChatMessage>,
    token_usage: u64,
}

impl SessionManager {
    /// Create a session with an explicit budget and trim buffer.
    pub fn new(max_tokens: usize, token_buffer: usize) -> Self {
        Self {
            max_tokens,
            token_buffer,
            api_messages: Vec::new(),
            display_messages: Vec::new(),
            token_usage: 0,
        }
    }

    /// Create a session sized from the process configuration.
    pub fn from_config() -> Self {
        let config = get_config();
        Self::new(config.max_input_tokens, config.token_buffer)
    }

    /// Record a message in the selected histories.
    ///
    /// API-bound messages are token-counted through the LLM client; trimming
    /// runs afterwards so the history never drifts far past the budget.
    pub async fn add_message(
        &mut self,
        llm: &(dyn LlmClient + Send + Sync),
        message: ChatMessage,
        add_to_api: bool,
        add_to_display: bool,
    ) {
        if add_to_display {
            self.display_messages.push(message.clone());
            if self.display_messages.len() > DISPLAY_MESSAGE_CAP {
                let excess = self.display_messages.len() - DISPLAY_MESSAGE_CAP;
                self.display_messages.drain(..excess);
            }
        }

        if add_to_api {
            let tokens = llm.count_tokens(std::slice::from_ref(&message)).await;
            self.token_usage += tokens;
            self.api_messages.push(TrackedMessage {
                message,
                tokens,
                timestamp: OffsetDateTime::now_utc(),
            });
            self.trim_if_needed();
        }
    }

    /// Evict oldest API messages once usage exceeds the buffer threshold.
    ///
    /// Trimming targets double the buffer below the budget so a single large
    /// message cannot immediately re-trigger it, and always leaves the last
    /// few messages untouched to preserve local context.
    fn trim_if_needed(&mut self) {
        let trigger = self.max_tokens.saturating_sub(self.token_buffer) as u64;
        if self.token_usage <= trigger {
            return;
        }

        let target = self.max_tokens.saturating_sub(2 * self.token_buffer) as u64;
        self.api_messages
            .sort_by_key(|tracked| tracked.timestamp);

        let mut evicted = 0usize;
        while self.token_usage > target && self.api_messages.len() > MIN_RETAINED_MESSAGES {
            let oldest = self.api_messages.remove(0);
            self.token_usage -= oldest.tokens;
            evicted += 1;
            debug!(
                tokens = oldest.tokens,
                role = %oldest.message.role,
                "evicted oldest message"
            );
        }

        info!(
            evicted,
            usage = self.token_usage,
            target,
            "conversation history trimmed"
        );
    }

    /// Messages to send to the LLM, oldest first.
    pub fn api_messages(&self) -> Vec<ChatMessage> {
        self.api_messages
            .iter()
            .map(|tracked| tracked.message.clone())
            .collect()
    }

    /// Transcript shown to the user, capped at the newest entries.
    pub fn display_messages(&self) -> &[ChatMessage] {
        &self.display_messages
    }

    /// Drop all history and reset the token counter.
    pub fn reset(&mut self) {
        self.api_messages.clear();
        self.display_messages.clear();
        self.token_usage = 0;
        info!("conversation session reset");
    }

    /// Current budget snapshot.
    pub fn stats(&self) -> SessionStats {
        let max = self.max_tokens as u64;
        let percent_used = if max == 0 {
            0.0
        } else {
            (self.token_usage as f32 / max as f32) * 100.0
        };
        SessionStats {
            current_usage: self.token_usage,
            max_tokens: self.max_tokens,
            percent_used,
            message_count: self.api_messages.len(),
            remaining_tokens: max.saturating_sub(self.token_usage),
        }
    }
}
