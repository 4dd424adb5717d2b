//! Chain-of-Verification pipeline.
//!
//! One run walks an explicit state machine:
//!
//! ```text
//! Baseline ──► Plan ──► Execute ──► Revise ──► Done
//!                │                    │
//!                └── no questions ────┴── failure ──► Done (baseline kept)
//! ```
//!
//! Only a BASELINE failure is fatal. Every later failure degrades to the
//! baseline answer with an explicit unverified status.

use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::audit::AuditLog;
use crate::backend::traits::{CompletionRequest, CompletionResponse, LlmBackend, LlmError, Usage};
use crate::config::CoveConfig;
use crate::context::{VerificationAnswer, VerificationContext};
use crate::prompt::PromptAssembler;

/// Error types for a pipeline run.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PipelineError {
    /// The baseline call failed; there is no answer to verify
    #[error("Baseline generation failed: {0}")]
    Upstream(#[from] LlmError),

    /// The run was cancelled
    #[error("Verification cancelled")]
    Cancelled,
}

/// Pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Baseline,
    Plan,
    Execute,
    Revise,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Baseline => "baseline",
            Stage::Plan => "plan",
            Stage::Execute => "execute",
            Stage::Revise => "revise",
            Stage::Done => "done",
        }
    }
}

/// Why an answer was returned without verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnverifiedReason {
    /// Planning call failed
    PlanFailed,
    /// Revision call failed or returned nothing usable
    RevisionFailed,
}

/// How far verification got.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VerificationStatus {
    /// The answer went through REVISE
    Verified,
    /// The baseline had no checkable claims
    UnverifiedTrivial,
    /// Verification broke off; the baseline is returned
    Unverified { reason: UnverifiedReason },
}

impl VerificationStatus {
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified)
    }
}

/// What happened in one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    /// Stage that ran
    pub stage: Stage,
    /// Model calls made
    pub calls: usize,
    /// Calls that failed or timed out
    pub failures: usize,
    /// Wall-clock duration (ms)
    pub duration_ms: u64,
}

/// Result of a run that produced an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationOutcome {
    /// The answer to return to the user
    pub answer: String,
    /// How far verification got
    pub status: VerificationStatus,
    /// Everything the run produced
    pub context: VerificationContext,
    /// Stages in execution order
    pub trace: Vec<StageRecord>,
    /// Tokens spent across all calls
    pub usage: Usage,
}

/// Mutable state of one run, dropped when the run returns.
struct Run {
    context: VerificationContext,
    status: Option<VerificationStatus>,
    trace: Vec<StageRecord>,
    usage: Usage,
}

impl Run {
    fn record(&mut self, stage: Stage, calls: usize, failures: usize, started: Instant) {
        self.trace.push(StageRecord {
            stage,
            calls,
            failures,
            duration_ms: started.elapsed().as_millis() as u64,
        });
    }
}

/// Runs Chain-of-Verification against one backend.
pub struct CovePipeline {
    backend: Arc<dyn LlmBackend>,
    config: CoveConfig,
    audit: Option<Arc<AuditLog>>,
}

impl CovePipeline {
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self {
            backend,
            config: CoveConfig::default(),
            audit: None,
        }
    }

    /// Create with configuration.
    pub fn with_config(mut self, config: CoveConfig) -> Self {
        self.config = config;
        self
    }

    /// Record every run in `audit`.
    pub fn with_audit(mut self, audit: Arc<AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn config(&self) -> &CoveConfig {
        &self.config
    }

    /// Verify the answer to `query`.
    ///
    /// Cancellation is observed between stages and aborts in-flight calls.
    pub async fn run(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<VerificationOutcome, PipelineError> {
        let mut run = Run {
            context: VerificationContext::new(query),
            status: None,
            trace: Vec::new(),
            usage: Usage::default(),
        };

        let entry_id = match &self.audit {
            Some(audit) => Some(audit.log_start(&run.context).await),
            None => None,
        };

        let result = self.drive(&mut run, cancel).await;

        if let (Some(audit), Some(entry_id)) = (&self.audit, &entry_id) {
            match &result {
                Ok(()) => audit.log_finish(entry_id, run.status, &run.context).await,
                Err(e) => audit.log_failure(entry_id, e).await,
            }
        }
        result?;

        let status = run.status.unwrap_or(VerificationStatus::Unverified {
            reason: UnverifiedReason::RevisionFailed,
        });
        let answer = match (&status, &run.context.revised) {
            (VerificationStatus::Verified, Some(revised)) => revised.clone(),
            _ => run.context.baseline.clone(),
        };

        info!(
            run_id = %run.context.run_id,
            status = ?status,
            questions = run.context.questions.len(),
            unresolved = run.context.unresolved_count(),
            contradictions = run.context.contradictions.len(),
            "Verification finished"
        );

        Ok(VerificationOutcome {
            answer,
            status,
            context: run.context,
            trace: run.trace,
            usage: run.usage,
        })
    }

    async fn drive(&self, run: &mut Run, cancel: &CancellationToken) -> Result<(), PipelineError> {
        let mut stage = Stage::Baseline;

        loop {
            if cancel.is_cancelled() {
                debug!(run_id = %run.context.run_id, stage = stage.as_str(), "Run cancelled");
                return Err(PipelineError::Cancelled);
            }

            let next = match stage {
                Stage::Baseline => self.baseline(run, cancel).await,
                Stage::Plan => Ok(self.plan(run, cancel).await),
                Stage::Execute => Ok(self.execute(run, cancel).await),
                Stage::Revise => Ok(self.revise(run, cancel).await),
                Stage::Done => return Ok(()),
            };

            // A call aborted by cancellation is not an upstream failure.
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            stage = next?;
        }
    }

    async fn baseline(&self, run: &mut Run, cancel: &CancellationToken) -> Result<Stage, PipelineError> {
        let started = Instant::now();
        let request = self.request(run.context.query.clone(), self.config.answer_temperature);

        let result = self.call(request, cancel).await.and_then(|response| {
            if response.content.trim().is_empty() {
                Err(LlmError::ParseError("empty baseline answer".to_string()))
            } else {
                Ok(response)
            }
        });

        match result {
            Ok(response) => {
                run.usage.add(response.usage);
                run.context.baseline = response.content.trim().to_string();
                run.record(Stage::Baseline, 1, 0, started);
                Ok(Stage::Plan)
            }
            Err(e) => {
                warn!(run_id = %run.context.run_id, stage = "baseline", error = %e, "Baseline call failed");
                run.record(Stage::Baseline, 1, 1, started);
                Err(PipelineError::Upstream(e))
            }
        }
    }

    async fn plan(&self, run: &mut Run, cancel: &CancellationToken) -> Stage {
        let started = Instant::now();
        let prompt = PromptAssembler::plan_prompt(
            &run.context.query,
            &run.context.baseline,
            self.config.max_questions,
        );

        let response = match self.call(self.request(prompt, self.config.verify_temperature), cancel).await {
            Ok(response) => response,
            Err(e) => {
                warn!(run_id = %run.context.run_id, stage = "plan", error = %e, "Planning call failed");
                run.record(Stage::Plan, 1, 1, started);
                run.status = Some(VerificationStatus::Unverified {
                    reason: UnverifiedReason::PlanFailed,
                });
                return Stage::Done;
            }
        };
        run.usage.add(response.usage);

        let mut questions = PromptAssembler::parse_questions(&response.content);
        if questions.len() > self.config.max_questions {
            debug!(
                run_id = %run.context.run_id,
                planned = questions.len(),
                kept = self.config.max_questions,
                "Truncating verification plan"
            );
            questions.truncate(self.config.max_questions);
        }
        run.record(Stage::Plan, 1, 0, started);

        if questions.is_empty() {
            debug!(run_id = %run.context.run_id, "No checkable claims in baseline");
            run.status = Some(VerificationStatus::UnverifiedTrivial);
            return Stage::Done;
        }

        run.context.questions = questions;
        Stage::Execute
    }

    async fn execute(&self, run: &mut Run, cancel: &CancellationToken) -> Stage {
        let started = Instant::now();

        // Each request carries the question alone: no query, no baseline.
        let calls = run.context.questions.iter().map(|question| {
            let request = self.request(question.clone(), self.config.verify_temperature);
            self.call(request, cancel)
        });
        let results = join_all(calls).await;

        let mut failures = 0;
        let mut answers = Vec::with_capacity(results.len());
        for (question_index, result) in results.into_iter().enumerate() {
            let answer = match result {
                Ok(response) if !response.content.trim().is_empty() => {
                    run.usage.add(response.usage);
                    VerificationAnswer::resolved(response.content.trim())
                }
                Ok(response) => {
                    run.usage.add(response.usage);
                    VerificationAnswer::unresolved("empty answer")
                }
                Err(e) => {
                    warn!(
                        run_id = %run.context.run_id,
                        stage = "execute",
                        question_index,
                        error = %e,
                        "Verification question unresolved"
                    );
                    VerificationAnswer::unresolved(e.to_string())
                }
            };
            if !answer.is_resolved() {
                failures += 1;
            }
            answers.push(answer);
        }

        run.context.answers = answers;
        run.record(Stage::Execute, run.context.questions.len(), failures, started);
        Stage::Revise
    }

    async fn revise(&self, run: &mut Run, cancel: &CancellationToken) -> Stage {
        let started = Instant::now();
        let prompt = PromptAssembler::revise_prompt(&run.context);

        let revision = match self.call(self.request(prompt, self.config.answer_temperature), cancel).await {
            Ok(response) => {
                run.usage.add(response.usage);
                PromptAssembler::parse_revision(&response.content)
            }
            Err(e) => {
                warn!(run_id = %run.context.run_id, stage = "revise", error = %e, "Revision call failed");
                None
            }
        };

        match revision {
            Some(revision) => {
                run.record(Stage::Revise, 1, 0, started);
                run.context.revised = Some(revision.answer);
                run.context.contradictions = revision.contradictions;
                run.status = Some(VerificationStatus::Verified);
            }
            None => {
                run.record(Stage::Revise, 1, 1, started);
                run.status = Some(VerificationStatus::Unverified {
                    reason: UnverifiedReason::RevisionFailed,
                });
            }
        }
        Stage::Done
    }

    fn request(&self, prompt: String, temperature: f32) -> CompletionRequest {
        let request = CompletionRequest::user(prompt).with_temperature(temperature);
        match self.config.max_tokens {
            Some(max) => request.with_max_tokens(max),
            None => request,
        }
    }

    /// One model call under the configured timeout. No retries.
    async fn call(
        &self,
        request: CompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<CompletionResponse, LlmError> {
        let timeout = self.config.call_timeout();

        tokio::select! {
            _ = cancel.cancelled() => Err(LlmError::RequestFailed("cancelled".to_string())),
            result = tokio::time::timeout(timeout, self.backend.complete(request)) => {
                result.unwrap_or_else(|_| Err(LlmError::Timeout(self.config.call_timeout_ms)))
            }
        }
    }
}
