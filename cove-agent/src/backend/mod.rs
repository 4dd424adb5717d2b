//! LLM backend abstraction layer.
//!
//! The pipeline only needs one call, `complete`. Backends:
//! - OpenAI-compatible (Ollama, vLLM, OpenAI, ...)
//! - Scripted mock for tests

pub mod mock;
pub mod openai;
pub mod traits;

pub use mock::MockBackend;
pub use openai::OpenAiBackend;
pub use traits::{CompletionRequest, CompletionResponse, LlmBackend, LlmError, Message, Role, Usage};
