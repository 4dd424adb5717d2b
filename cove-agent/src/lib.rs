//! CoVe Agent - Chain-of-Verification over pluggable LLM backends
//!
//! Answers a query, then fact-checks the answer before returning it:
//! - Trait-based LLM backends (OpenAI-compatible, scripted mock)
//! - Explicit stage machine with per-stage failure rules
//! - Concurrent, isolated verification calls
//! - Audit trail of every run
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │             CovePipeline                │
//! │  Baseline → Plan → Execute → Revise     │
//! └────────────────┬────────────────────────┘
//!                  │
//!      ┌───────────┴───────────┐
//!      ▼                       ▼
//! ┌─────────────┐       ┌──────────────┐
//! │ LlmBackend  │       │ PromptAssem- │
//! │ (OpenAI/    │       │ bler         │
//! │  Mock)      │       │              │
//! └─────────────┘       └──────────────┘
//! ```

pub mod audit;
pub mod backend;
pub mod config;
pub mod context;
pub mod pipeline;
pub mod prompt;

// Re-export main types for convenience
pub use audit::{AuditEntry, AuditLog, AuditStats};
pub use backend::traits::{CompletionRequest, CompletionResponse, LlmBackend, LlmError, Usage};
pub use backend::{MockBackend, OpenAiBackend};
pub use config::CoveConfig;
pub use context::{Contradiction, VerificationAnswer, VerificationContext};
pub use pipeline::{
    CovePipeline, PipelineError, Stage, StageRecord, UnverifiedReason, VerificationOutcome,
    VerificationStatus,
};
pub use prompt::PromptAssembler;
pub use tokio_util::sync::CancellationToken;
