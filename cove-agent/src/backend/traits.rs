//! The provider-agnostic model interface.
//!
//! A backend answers one [`CompletionRequest`] at a time. Deadlines belong
//! to the caller: the pipeline wraps every `complete` in its own timeout.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Ways a model call can fail.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LlmError {
    #[error("Model backend unavailable: {0}")]
    Unavailable(String),

    /// The provider answered with an error status
    #[error("Completion request failed: {0}")]
    RequestFailed(String),

    #[error("Rate limited by provider (retry after {retry_after_ms:?} ms)")]
    RateLimited { retry_after_ms: Option<u64> },

    /// The caller's deadline passed first
    #[error("Timed out after {0}ms")]
    Timeout(u64),

    #[error("Transport error: {0}")]
    NetworkError(String),

    /// The reply could not be decoded
    #[error("Malformed completion: {0}")]
    ParseError(String),
}

/// A chat-completion model.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Model identifier, used in logs.
    fn id(&self) -> &str;

    /// Cheap liveness probe.
    async fn is_available(&self) -> bool;

    /// Produce one completion for `request`.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;
}

/// Speaker of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// Name used on the chat-completions wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Input of one model call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Instructions placed before the messages
    pub system: Option<String>,
    pub messages: Vec<Message>,
    pub max_tokens: Option<u32>,
    /// Sampling temperature, kept within 0.0..=2.0
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    /// A request holding exactly one user message and nothing else.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::new(Role::User, content)],
            ..Default::default()
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature.clamp(0.0, 2.0));
        self
    }

    /// Everything the model will read, one line per part.
    ///
    /// Lets callers check what a call was and was not given.
    pub fn prompt_text(&self) -> String {
        self.system
            .iter()
            .chain(self.messages.iter().map(|m| &m.content))
            .fold(String::new(), |mut text, part| {
                text.push_str(part);
                text.push('\n');
                text
            })
    }
}

/// Output of one model call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: String,
    pub usage: Usage,
}

/// Token accounting, summed across the calls of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }

    pub fn add(&mut self, other: Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_text_includes_system() {
        let request = CompletionRequest::user("Who wrote Hamlet?").with_system("Be brief.");
        assert_eq!(request.prompt_text(), "Be brief.\nWho wrote Hamlet?\n");
    }

    #[test]
    fn test_temperature_is_clamped() {
        assert_eq!(CompletionRequest::user("x").with_temperature(5.0).temperature, Some(2.0));
    }

    #[test]
    fn test_usage_sums() {
        let mut usage = Usage::default();
        usage.add(Usage { input_tokens: 10, output_tokens: 2 });
        usage.add(Usage { input_tokens: 5, output_tokens: 1 });
        assert_eq!(usage.total(), 18);
    }
}
