//! Reply generation via the `OpenAI` chat completions API
//!
//! The generator owns the running conversation history: each call appends
//! the user message, requests a completion with the full history, and
//! appends the assistant reply so continuity carries into the next call.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// System prompt defining the assistant's register
const SYSTEM_PROMPT: &str = "You are a helpful, friendly, and conversational AI assistant \
acting as a receptionist. Respond in a natural, engaging way as if you were talking to a \
client. Keep it simple and specific. Do not use markdown or bullets; answer \
conversationally, in at most three short sentences.";

/// Spoken when the completion call fails; the turn still completes
pub const FALLBACK_REPLY: &str =
    "I'm sorry, I encountered an error while processing your request.";

/// One chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// "system", "user", or "assistant"
    pub role: String,
    /// Message text
    pub content: String,
}

impl ChatMessage {
    fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Generates assistant replies, carrying history across turns
pub struct ReplyGenerator {
    client: reqwest::Client,
    api_key: String,
    model: String,
    history: Vec<ChatMessage>,
}

impl ReplyGenerator {
    /// Create a new generator with empty history
    ///
    /// # Errors
    ///
    /// Returns error if the API key is empty
    pub fn new(api_key: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "OpenAI API key required for generation".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            history: Vec::new(),
        })
    }

    /// Generate a reply to `user_input`, updating the history
    ///
    /// # Errors
    ///
    /// Returns error if the API call fails or yields no choices
    pub async fn generate(&mut self, user_input: &str) -> Result<String> {
        self.history.push(ChatMessage::new("user", user_input));

        let mut messages = vec![ChatMessage::new("system", SYSTEM_PROMPT)];
        messages.extend(self.history.iter().cloned());

        let request = ChatRequest {
            model: &self.model,
            messages,
        };

        let response = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Generation(format!(
                "chat completions error {status}: {body}"
            )));
        }

        let result: ChatResponse = response.json().await?;
        let reply = result
            .choices
            .first()
            .map(|c| c.message.content.trim().to_string())
            .ok_or_else(|| Error::Generation("completion returned no choices".to_string()))?;

        self.history.push(ChatMessage::new("assistant", &reply));
        tracing::debug!(history_len = self.history.len(), "reply generated");

        Ok(reply)
    }

    /// Number of messages in the running history
    #[must_use]
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Clear the conversation history
    pub fn clear(&mut self) {
        self.history.clear();
    }
}
