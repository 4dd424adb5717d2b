//! Per-invocation state of one verification run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Independent answer to one verification question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VerificationAnswer {
    /// The model answered
    Resolved { text: String },
    /// The call failed or timed out
    Unresolved { reason: String },
}

impl VerificationAnswer {
    pub fn resolved(text: impl Into<String>) -> Self {
        Self::Resolved { text: text.into() }
    }

    pub fn unresolved(reason: impl Into<String>) -> Self {
        Self::Unresolved {
            reason: reason.into(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved { .. })
    }

    /// Answer text, if resolved.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Resolved { text } => Some(text),
            Self::Unresolved { .. } => None,
        }
    }
}

/// A claim the revision corrected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contradiction {
    /// Claim as stated in the baseline
    pub original: String,
    /// Claim as stated in the revised answer
    pub corrected: String,
    /// Why it changed
    pub reason: String,
}

/// Everything one verification run produced.
///
/// `answers[i]` always belongs to `questions[i]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationContext {
    /// Unique run ID
    pub run_id: String,
    /// The user query
    pub query: String,
    /// First-pass answer
    pub baseline: String,
    /// Verification questions in plan order
    pub questions: Vec<String>,
    /// Independent answers, index-aligned with `questions`
    pub answers: Vec<VerificationAnswer>,
    /// Revised answer, once REVISE succeeded
    pub revised: Option<String>,
    /// Corrections listed by the revision
    pub contradictions: Vec<Contradiction>,
    /// When the run started
    pub started_at: DateTime<Utc>,
}

impl VerificationContext {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            query: query.into(),
            baseline: String::new(),
            questions: Vec::new(),
            answers: Vec::new(),
            revised: None,
            contradictions: Vec::new(),
            started_at: Utc::now(),
        }
    }

    /// Question/answer pairs in plan order.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &VerificationAnswer)> {
        self.questions
            .iter()
            .map(String::as_str)
            .zip(self.answers.iter())
    }

    pub fn resolved_count(&self) -> usize {
        self.answers.iter().filter(|a| a.is_resolved()).count()
    }

    pub fn unresolved_count(&self) -> usize {
        self.answers.len() - self.resolved_count()
    }
}
