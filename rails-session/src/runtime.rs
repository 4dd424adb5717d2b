//! Interface to the rails-execution runtime.
//!
//! The runtime interprets the composed flows, runs input and output rails,
//! and decides per turn whether to answer, refuse, or call a custom action.
//! It lives outside this workspace; sessions drive it through
//! [`RailsRuntime`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rails_config::ComposedConfiguration;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Parameters the runtime passes to a custom action.
pub type ActionParams = Map<String, Value>;

/// Error types reported by a runtime.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    /// Configuration was rejected
    #[error("Runtime rejected configuration: {0}")]
    Ingest(String),

    /// Action could not be registered
    #[error("Runtime could not register action '{name}': {reason}")]
    Registration { name: String, reason: String },

    /// Turn could not be processed
    #[error("Runtime generation failed: {0}")]
    Generation(String),
}

/// Who spoke a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Assistant,
}

/// One entry of the conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub speaker: Speaker,
    pub text: String,
    pub at: DateTime<Utc>,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::User,
            text: text.into(),
            at: Utc::now(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Assistant,
            text: text.into(),
            at: Utc::now(),
        }
    }
}

/// What the runtime decided for one user message.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeDecision {
    /// Answer produced by the runtime itself
    Respond(String),
    /// A rail blocked the message
    Refuse { rail: String, message: String },
    /// A flow asked for a custom action; its result is the answer
    InvokeAction { name: String, params: ActionParams },
}

/// A rails-execution runtime.
#[async_trait]
pub trait RailsRuntime: Send + Sync {
    /// Load the policy document and flow script of a composed configuration.
    async fn ingest(&mut self, config: &ComposedConfiguration) -> Result<(), RuntimeError>;

    /// Make an action name callable from flows.
    fn register_action(&mut self, name: &str) -> Result<(), RuntimeError>;

    /// Process one user message. `history` holds the earlier turns.
    async fn generate(
        &mut self,
        history: &[Turn],
        message: &str,
    ) -> Result<RuntimeDecision, RuntimeError>;
}
