//! Mock LLM backend for testing.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::traits::*;

/// What the mock does when a rule matches.
#[derive(Debug, Clone)]
enum Reply {
    Respond(String),
    Fail(LlmError),
    Delayed(Duration, String),
}

/// A prompt-matching rule: first rule whose needle occurs in the prompt wins.
#[derive(Debug, Clone)]
struct Rule {
    needle: String,
    reply: Reply,
}

/// Mock backend for testing.
///
/// Replies are scripted by substring match on the full prompt text, and every
/// prompt is recorded so tests can inspect exactly what each call was given.
pub struct MockBackend {
    model_id: String,
    available: AtomicBool,
    response_content: String,
    rules: Vec<Rule>,
    call_count: AtomicU32,
    prompts: Mutex<Vec<String>>,
}

impl MockBackend {
    /// A backend answering "Mock response" to everything.
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            available: AtomicBool::new(true),
            response_content: "Mock response".to_string(),
            rules: Vec::new(),
            call_count: AtomicU32::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Set the response used when no rule matches.
    pub fn with_response(mut self, content: impl Into<String>) -> Self {
        self.response_content = content.into();
        self
    }

    /// Reply with `content` when the prompt contains `needle`.
    pub fn when(mut self, needle: impl Into<String>, content: impl Into<String>) -> Self {
        self.rules.push(Rule {
            needle: needle.into(),
            reply: Reply::Respond(content.into()),
        });
        self
    }

    /// Fail with `error` when the prompt contains `needle`.
    pub fn fail_when(mut self, needle: impl Into<String>, error: LlmError) -> Self {
        self.rules.push(Rule {
            needle: needle.into(),
            reply: Reply::Fail(error),
        });
        self
    }

    /// Reply with `content` after `delay` when the prompt contains `needle`.
    pub fn delay_when(
        mut self,
        needle: impl Into<String>,
        delay: Duration,
        content: impl Into<String>,
    ) -> Self {
        self.rules.push(Rule {
            needle: needle.into(),
            reply: Reply::Delayed(delay, content.into()),
        });
        self
    }

    /// Switch the backend on or off; an off backend fails every call.
    pub fn with_available(self, available: bool) -> Self {
        self.available.store(available, Ordering::SeqCst);
        self
    }

    /// Calls made so far, including failed ones.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Every prompt received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    fn reply_for(&self, prompt: &str) -> Reply {
        self.rules
            .iter()
            .find(|r| prompt.contains(&r.needle))
            .map(|r| r.reply.clone())
            .unwrap_or_else(|| Reply::Respond(self.response_content.clone()))
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new("mock-model")
    }
}

#[async_trait]
impl LlmBackend for MockBackend {
    fn id(&self) -> &str {
        &self.model_id
    }

    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        let prompt = request.prompt_text();
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.clone());
        }

        if !self.available.load(Ordering::SeqCst) {
            return Err(LlmError::Unavailable(format!("{} switched off", self.model_id)));
        }

        let content = match self.reply_for(&prompt) {
            Reply::Respond(content) => content,
            Reply::Fail(error) => return Err(error),
            Reply::Delayed(delay, content) => {
                tokio::time::sleep(delay).await;
                content
            }
        };

        // Roughly four characters per token.
        Ok(CompletionResponse {
            usage: Usage {
                input_tokens: prompt.len() as u32 / 4,
                output_tokens: content.len() as u32 / 4,
            },
            content,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_backend() {
        let backend = MockBackend::new("test-model").with_response("Hello, world!");

        assert!(backend.is_available().await);
        assert_eq!(backend.call_count(), 0);

        let response = backend
            .complete(CompletionRequest::user("Hi"))
            .await
            .unwrap();

        assert_eq!(response.content, "Hello, world!");
        assert_eq!(backend.call_count(), 1);
        assert_eq!(backend.prompts(), vec!["Hi\n".to_string()]);
    }

    #[tokio::test]
    async fn test_mock_rules_match_in_order() {
        let backend = MockBackend::default()
            .when("capital", "Canberra")
            .fail_when("explode", LlmError::RequestFailed("boom".to_string()))
            .when("capital of France", "never reached");

        let answer = backend
            .complete(CompletionRequest::user("What is the capital of France?"))
            .await
            .unwrap();
        assert_eq!(answer.content, "Canberra");

        let err = backend
            .complete(CompletionRequest::user("please explode"))
            .await
            .unwrap_err();
        assert_eq!(err, LlmError::RequestFailed("boom".to_string()));
    }

    #[tokio::test]
    async fn test_mock_unavailable() {
        let backend = MockBackend::new("test-model").with_available(false);

        assert!(!backend.is_available().await);

        let result = backend.complete(CompletionRequest::user("Hi")).await;
        assert!(result.is_err());
    }
}
