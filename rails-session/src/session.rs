//! Session Orchestrator.
//!
//! Binds one composed configuration to one conversation. Turns are strictly
//! sequential: [`Session::turn`] takes `&mut self`.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use cove_agent::{Contradiction, UnverifiedReason, VerificationStatus};
use rails_config::ComposedConfiguration;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::action::{ActionCatalog, ActionContext, ActionError, ActionOutput, RailAction};
use crate::runtime::{ActionParams, RailsRuntime, RuntimeDecision, RuntimeError, Turn};

/// Error types for session creation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    /// The configuration binds an action the catalog cannot provide
    #[error("No implementation '{implementation}' for action '{name}'")]
    MissingAction { name: String, implementation: String },

    /// The runtime refused the configuration or an action
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// How a turn's answer came about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResponseKind {
    /// Answered by the runtime without a custom action
    Runtime,
    /// Blocked by a rail
    Refused { rail: String },
    /// Fact-checked answer
    Verified,
    /// Answer returned without completed verification
    Unverified { reason: String },
    /// No answer could be produced
    Error { message: String },
}

/// Answer to one user message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnResponse {
    pub text: String,
    pub kind: ResponseKind,
    /// Corrections made while verifying, if any
    pub contradictions: Vec<Contradiction>,
}

impl TurnResponse {
    fn new(text: impl Into<String>, kind: ResponseKind) -> Self {
        Self {
            text: text.into(),
            kind,
            contradictions: Vec::new(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(
            format!("Sorry, I could not produce an answer ({message})."),
            ResponseKind::Error { message },
        )
    }

    pub fn is_error(&self) -> bool {
        matches!(self.kind, ResponseKind::Error { .. })
    }
}

/// A conversation bound to one composed configuration.
pub struct Session {
    id: String,
    config: Arc<ComposedConfiguration>,
    runtime: Box<dyn RailsRuntime>,
    /// Action name to implementation
    actions: HashMap<String, Arc<dyn RailAction>>,
    history: Vec<Turn>,
    cancel: CancellationToken,
    started_at: DateTime<Utc>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("fingerprint", &self.config.fingerprint())
            .field("turns", &self.history.len())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Activate `config` on `runtime`.
    ///
    /// Every action binding must resolve in `catalog` before anything is
    /// handed to the runtime; any failure aborts session creation.
    pub async fn start(
        config: Arc<ComposedConfiguration>,
        mut runtime: Box<dyn RailsRuntime>,
        catalog: &ActionCatalog,
    ) -> Result<Self, SessionError> {
        let mut actions = HashMap::with_capacity(config.actions().len());
        for (name, implementation) in config.actions() {
            let action =
                catalog
                    .resolve(implementation)
                    .ok_or_else(|| SessionError::MissingAction {
                        name: name.clone(),
                        implementation: implementation.to_string(),
                    })?;
            actions.insert(name.clone(), action);
        }

        for name in config.actions().keys() {
            runtime.register_action(name)?;
        }
        runtime.ingest(&config).await?;

        let session = Self {
            id: uuid::Uuid::new_v4().to_string(),
            config,
            runtime,
            actions,
            history: Vec::new(),
            cancel: CancellationToken::new(),
            started_at: Utc::now(),
        };

        info!(
            session_id = %session.id,
            rails = session.config.rails().len(),
            actions = session.actions.len(),
            fingerprint = %session.config.fingerprint(),
            "Session started"
        );

        Ok(session)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &ComposedConfiguration {
        &self.config
    }

    /// Turns so far, oldest first.
    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Token that cancels any verification this session is running.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Process one user message.
    ///
    /// Failures become an error response; the session stays usable.
    pub async fn turn(&mut self, message: &str) -> TurnResponse {
        let prior = self.history.len();
        self.history.push(Turn::user(message));

        debug!(session_id = %self.id, turn = prior / 2, "Processing turn");

        let decision = self
            .runtime
            .generate(&self.history[..prior], message)
            .await;

        let response = match decision {
            Ok(RuntimeDecision::Respond(text)) => {
                if text.trim().is_empty() {
                    warn!(session_id = %self.id, "Runtime returned an empty answer");
                    TurnResponse::error("the runtime returned an empty answer")
                } else {
                    TurnResponse::new(text, ResponseKind::Runtime)
                }
            }
            Ok(RuntimeDecision::Refuse { rail, message }) => {
                info!(session_id = %self.id, rail = %rail, "Message refused by rail");
                TurnResponse::new(message, ResponseKind::Refused { rail })
            }
            Ok(RuntimeDecision::InvokeAction { name, params }) => {
                self.invoke(&name, &params, message, prior).await
            }
            Err(e) => {
                warn!(session_id = %self.id, error = %e, "Runtime failed");
                TurnResponse::error(e.to_string())
            }
        };

        self.history.push(Turn::assistant(response.text.clone()));
        response
    }

    /// End the session, cancelling in-flight work.
    pub fn end(self) {
        self.cancel.cancel();
        info!(
            session_id = %self.id,
            turns = self.history.len() / 2,
            "Session ended"
        );
    }

    async fn invoke(
        &self,
        name: &str,
        params: &ActionParams,
        message: &str,
        prior: usize,
    ) -> TurnResponse {
        let Some(action) = self.actions.get(name) else {
            warn!(session_id = %self.id, action = %name, "Runtime invoked an unbound action");
            return TurnResponse::error(format!("action '{name}' is not bound"));
        };

        let context = ActionContext {
            session_id: &self.id,
            history: &self.history[..prior],
            message,
            cancel: &self.cancel,
        };

        match action.execute(params, context).await {
            Ok(output) => action_response(output),
            Err(ActionError::Cancelled) => {
                debug!(session_id = %self.id, action = %name, "Action cancelled");
                TurnResponse::error("cancelled")
            }
            Err(e) => {
                warn!(session_id = %self.id, action = %name, error = %e, "Action failed");
                TurnResponse::error(e.to_string())
            }
        }
    }
}

fn action_response(output: ActionOutput) -> TurnResponse {
    if output.text.trim().is_empty() {
        return TurnResponse::error("the action returned an empty answer");
    }

    let kind = match output.verification {
        None => ResponseKind::Runtime,
        Some(VerificationStatus::Verified) => ResponseKind::Verified,
        Some(VerificationStatus::UnverifiedTrivial) => ResponseKind::Unverified {
            reason: "no checkable claims".to_string(),
        },
        Some(VerificationStatus::Unverified { reason }) => ResponseKind::Unverified {
            reason: match reason {
                UnverifiedReason::PlanFailed => "verification planning failed",
                UnverifiedReason::RevisionFailed => "verification revision failed",
            }
            .to_string(),
        },
    };

    TurnResponse {
        text: output.text,
        kind,
        contradictions: output.contradictions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_response_kinds() {
        let verified = action_response(ActionOutput {
            text: "Paris.".to_string(),
            verification: Some(VerificationStatus::Verified),
            contradictions: Vec::new(),
        });
        assert_eq!(verified.kind, ResponseKind::Verified);

        let plain = action_response(ActionOutput::text("done"));
        assert_eq!(plain.kind, ResponseKind::Runtime);

        let empty = action_response(ActionOutput::text("  "));
        assert!(empty.is_error());
        assert!(!empty.text.is_empty());
    }

    #[test]
    fn test_plan_failure_reason() {
        let response = action_response(ActionOutput {
            text: "baseline".to_string(),
            verification: Some(VerificationStatus::Unverified {
                reason: UnverifiedReason::PlanFailed,
            }),
            contradictions: Vec::new(),
        });
        assert_eq!(
            response.kind,
            ResponseKind::Unverified {
                reason: "verification planning failed".to_string()
            }
        );
    }
}
