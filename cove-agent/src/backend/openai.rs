//! Chat-completions client for OpenAI-compatible servers.
//!
//! Ollama (the default local provider), vLLM, LocalAI and the hosted
//! OpenAI API all accept the same `/chat/completions` shape.

use async_trait::async_trait;
use reqwest::{header, Client, Response, StatusCode};
use serde::{Deserialize, Serialize};

use super::traits::*;

const OLLAMA_URL: &str = "http://localhost:11434/v1";
const OPENAI_URL: &str = "https://api.openai.com/v1";

/// Backend speaking the OpenAI chat-completions protocol.
pub struct OpenAiBackend {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiBackend {
    /// `base_url` is the API root, e.g. `http://localhost:8000/v1`.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: Client::new(),
            base_url,
            model: model.into(),
            api_key,
        }
    }

    /// Local Ollama server on its default port.
    pub fn ollama(model: &str) -> Self {
        Self::new(OLLAMA_URL, model, None)
    }

    /// Local vLLM server.
    pub fn vllm(port: u16, model: &str) -> Self {
        Self::new(format!("http://localhost:{port}/v1"), model, None)
    }

    /// Hosted OpenAI API.
    pub fn openai(model: &str, api_key: impl Into<String>) -> Self {
        Self::new(OPENAI_URL, model, Some(api_key.into()))
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header(header::AUTHORIZATION, format!("Bearer {key}")),
            None => builder,
        }
    }

    fn body(&self, request: CompletionRequest) -> WireRequest {
        let system = request.system.map(|content| WireMessage {
            role: Role::System.as_str(),
            content,
        });
        let messages = system
            .into_iter()
            .chain(request.messages.into_iter().map(|m| WireMessage {
                role: m.role.as_str(),
                content: m.content,
            }))
            .collect();

        WireRequest {
            model: self.model.clone(),
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream: false,
        }
    }
}

#[derive(Debug, Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireReply,
}

#[derive(Debug, Deserialize)]
struct WireReply {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

/// Map a non-success reply to an error.
async fn status_error(response: Response) -> LlmError {
    let status = response.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after_ms = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(|secs| secs * 1000);
        return LlmError::RateLimited { retry_after_ms };
    }

    let detail = response.text().await.unwrap_or_default();
    LlmError::RequestFailed(format!("HTTP {status}: {detail}"))
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    fn id(&self) -> &str {
        &self.model
    }

    async fn is_available(&self) -> bool {
        let probe = self.authorized(self.client.get(self.endpoint("models")));
        matches!(probe.send().await, Ok(r) if r.status().is_success())
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = self.body(request);

        let response = self
            .authorized(self.client.post(self.endpoint("chat/completions")))
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let reply: WireResponse = response
            .json()
            .await
            .map_err(|e| LlmError::ParseError(e.to_string()))?;

        let content = reply
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.unwrap_or_default())
            .ok_or_else(|| LlmError::ParseError("reply has no choices".to_string()))?;

        let usage = reply
            .usage
            .map(|u| Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        Ok(CompletionResponse { content, usage })
    }
}
