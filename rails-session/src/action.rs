//! Custom actions callable from rail flows.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use cove_agent::{
    Contradiction, CoveConfig, CovePipeline, LlmBackend, PipelineError, VerificationStatus,
};
use rails_config::{ActionRef, ComposedConfiguration, COVE_ACTION_REF};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::runtime::{ActionParams, Turn};

/// Error types for action execution.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ActionError {
    /// Parameters are missing or malformed
    #[error("Invalid action parameters: {0}")]
    InvalidParams(String),

    /// The session was cancelled while the action ran
    #[error("Action cancelled")]
    Cancelled,

    /// Verification produced no answer
    #[error(transparent)]
    Pipeline(PipelineError),

    /// Any other failure
    #[error("Action failed: {0}")]
    Failed(String),
}

impl From<PipelineError> for ActionError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Cancelled => ActionError::Cancelled,
            other => ActionError::Pipeline(other),
        }
    }
}

/// What an action sees of the turn that triggered it.
pub struct ActionContext<'a> {
    pub session_id: &'a str,
    /// Turns before the current message
    pub history: &'a [Turn],
    /// The current user message
    pub message: &'a str,
    pub cancel: &'a CancellationToken,
}

/// Result of an action.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutput {
    /// Answer text for the turn
    pub text: String,
    /// Set by verifying actions
    pub verification: Option<VerificationStatus>,
    /// Corrections made while verifying
    pub contradictions: Vec<Contradiction>,
}

impl ActionOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            verification: None,
            contradictions: Vec::new(),
        }
    }
}

/// Handler trait for custom actions.
#[async_trait]
pub trait RailAction: Send + Sync {
    /// Execute the action for one turn.
    async fn execute(
        &self,
        params: &ActionParams,
        context: ActionContext<'_>,
    ) -> Result<ActionOutput, ActionError>;
}

/// Implementations addressable by [`ActionRef`].
#[derive(Default, Clone)]
pub struct ActionCatalog {
    actions: HashMap<ActionRef, Arc<dyn RailAction>>,
}

impl ActionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an implementation under a reference.
    pub fn register(mut self, reference: impl Into<String>, action: Arc<dyn RailAction>) -> Self {
        self.actions.insert(ActionRef::new(reference), action);
        self
    }

    /// Register the fact-checking action the `cove` rail binds.
    pub fn with_cove(self, action: CoveAction) -> Self {
        self.register(COVE_ACTION_REF, Arc::new(action))
    }

    pub fn resolve(&self, reference: &ActionRef) -> Option<Arc<dyn RailAction>> {
        self.actions.get(reference).cloned()
    }

    pub fn contains(&self, reference: &ActionRef) -> bool {
        self.actions.contains_key(reference)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Fact-checks the answer to the user's message with Chain-of-Verification.
///
/// Reads the query from the `user_message` parameter, falling back to the
/// current message.
pub struct CoveAction {
    pipeline: Arc<CovePipeline>,
}

impl CoveAction {
    pub fn new(pipeline: Arc<CovePipeline>) -> Self {
        Self { pipeline }
    }

    /// Build a pipeline configured by the `cove:` section of `config`.
    pub fn for_config(
        backend: Arc<dyn LlmBackend>,
        config: &ComposedConfiguration,
    ) -> Result<Self, serde_json::Error> {
        let cove = CoveConfig::from_policy(config.policy())?;
        Ok(Self::new(Arc::new(CovePipeline::new(backend).with_config(cove))))
    }
}

#[async_trait]
impl RailAction for CoveAction {
    async fn execute(
        &self,
        params: &ActionParams,
        context: ActionContext<'_>,
    ) -> Result<ActionOutput, ActionError> {
        let query = match params.get("user_message") {
            Some(value) => value.as_str().ok_or_else(|| {
                ActionError::InvalidParams("user_message must be a string".to_string())
            })?,
            None => context.message,
        };

        debug!(session_id = %context.session_id, "Running fact check");
        let outcome = self.pipeline.run(query, context.cancel).await?;

        Ok(ActionOutput {
            text: outcome.answer,
            verification: Some(outcome.status),
            contradictions: outcome.context.contradictions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cove_agent::MockBackend;
    use rails_config::{BaseConfiguration, ConfigComposer, RailRegistry, SelectionSet};
    use serde_json::json;

    fn context<'a>(message: &'a str, cancel: &'a CancellationToken) -> ActionContext<'a> {
        ActionContext {
            session_id: "test",
            history: &[],
            message,
            cancel,
        }
    }

    #[tokio::test]
    async fn test_cove_action_uses_user_message_param() {
        let backend = Arc::new(
            MockBackend::new("mock")
                .when("VERIFICATION PLANNING", "[]")
                .when("What is 2+2?", "4"),
        );
        let action = CoveAction::new(Arc::new(CovePipeline::new(backend.clone())));

        let mut params = ActionParams::new();
        params.insert("user_message".to_string(), json!("What is 2+2?"));

        let cancel = CancellationToken::new();
        let output = action
            .execute(&params, context("ignored", &cancel))
            .await
            .unwrap();

        assert_eq!(output.text, "4");
        assert_eq!(output.verification, Some(VerificationStatus::UnverifiedTrivial));
        assert_eq!(backend.prompts()[0], "What is 2+2?\n");
    }

    #[tokio::test]
    async fn test_cove_action_rejects_bad_param() {
        let action = CoveAction::new(Arc::new(CovePipeline::new(Arc::new(MockBackend::new("m")))));

        let mut params = ActionParams::new();
        params.insert("user_message".to_string(), json!(42));

        let cancel = CancellationToken::new();
        let err = action.execute(&params, context("q", &cancel)).await.unwrap_err();
        assert!(matches!(err, ActionError::InvalidParams(_)));
    }

    #[tokio::test]
    async fn test_cancelled_pipeline_maps_to_cancelled() {
        let action = CoveAction::new(Arc::new(CovePipeline::new(Arc::new(MockBackend::new("m")))));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = action
            .execute(&ActionParams::new(), context("q", &cancel))
            .await
            .unwrap_err();
        assert_eq!(err, ActionError::Cancelled);
    }

    #[test]
    fn test_for_config_reads_cove_section() {
        let composed = ConfigComposer::new(Arc::new(RailRegistry::builtin()))
            .compose(&BaseConfiguration::empty(), &SelectionSet::new(["cove"]))
            .unwrap();

        let action = CoveAction::for_config(Arc::new(MockBackend::new("m")), &composed).unwrap();
        assert_eq!(action.pipeline.config().max_questions, 8);
    }

    #[test]
    fn test_catalog_resolves_by_reference() {
        let catalog = ActionCatalog::new().with_cove(CoveAction::new(Arc::new(CovePipeline::new(
            Arc::new(MockBackend::new("m")),
        ))));

        assert!(catalog.contains(&ActionRef::new(COVE_ACTION_REF)));
        assert!(catalog.resolve(&ActionRef::new("vendor.other")).is_none());
        assert_eq!(catalog.len(), 1);
    }
}
