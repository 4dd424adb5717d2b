//! Audit trail of verification runs.
//!
//! Keeps what each run asked, found and corrected, for later review.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::context::{Contradiction, VerificationContext};
use crate::pipeline::{PipelineError, VerificationStatus};

/// Maximum entries in the audit log before pruning.
const MAX_AUDIT_ENTRIES: usize = 10_000;

/// An entry in the audit log.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    /// Unique entry ID
    pub entry_id: String,
    /// Verification run ID
    pub run_id: String,
    /// The query being verified
    pub query: String,
    /// Final status, once the run produced an answer
    pub status: Option<VerificationStatus>,
    /// Error, if the run produced no answer
    pub error: Option<String>,
    /// Verification questions asked
    pub questions: usize,
    /// Questions left unresolved
    pub unresolved: usize,
    /// Corrections made by the revision
    pub contradictions: Vec<Contradiction>,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the run finished
    pub finished_at: Option<DateTime<Utc>>,
    /// Run duration in ms
    pub duration_ms: Option<u64>,
}

impl AuditEntry {
    /// Create an entry for a run that is starting.
    pub fn from_context(context: &VerificationContext) -> Self {
        Self {
            entry_id: uuid::Uuid::new_v4().to_string(),
            run_id: context.run_id.clone(),
            query: context.query.clone(),
            status: None,
            error: None,
            questions: 0,
            unresolved: 0,
            contradictions: Vec::new(),
            started_at: context.started_at,
            finished_at: None,
            duration_ms: None,
        }
    }

    fn finish(&mut self) {
        let now = Utc::now();
        self.finished_at = Some(now);
        self.duration_ms = Some((now - self.started_at).num_milliseconds().max(0) as u64);
    }
}

/// Audit log of verification runs, newest first.
pub struct AuditLog {
    entries: Arc<RwLock<VecDeque<AuditEntry>>>,
    max_entries: usize,
}

impl AuditLog {
    /// Create a new audit log.
    pub fn new() -> Self {
        Self::with_max_entries(MAX_AUDIT_ENTRIES)
    }

    /// Create with custom max entries.
    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(VecDeque::new())),
            max_entries,
        }
    }

    /// Log a run as it starts.
    pub async fn log_start(&self, context: &VerificationContext) -> String {
        let entry = AuditEntry::from_context(context);
        let entry_id = entry.entry_id.clone();

        let mut entries = self.entries.write().await;
        entries.push_front(entry);

        while entries.len() > self.max_entries {
            entries.pop_back();
        }

        entry_id
    }

    /// Complete an entry for a run that produced an answer.
    pub async fn log_finish(
        &self,
        entry_id: &str,
        status: Option<VerificationStatus>,
        context: &VerificationContext,
    ) {
        let mut entries = self.entries.write().await;

        if let Some(entry) = entries.iter_mut().find(|e| e.entry_id == entry_id) {
            entry.status = status;
            entry.questions = context.questions.len();
            entry.unresolved = context.unresolved_count();
            entry.contradictions = context.contradictions.clone();
            entry.finish();
        }
    }

    /// Complete an entry for a run that failed.
    pub async fn log_failure(&self, entry_id: &str, error: &PipelineError) {
        let mut entries = self.entries.write().await;

        if let Some(entry) = entries.iter_mut().find(|e| e.entry_id == entry_id) {
            entry.error = Some(error.to_string());
            entry.finish();
        }
    }

    /// Get recent entries.
    pub async fn recent(&self, limit: usize) -> Vec<AuditEntry> {
        let entries = self.entries.read().await;
        entries.iter().take(limit).cloned().collect()
    }

    /// Get entry by run ID.
    pub async fn get_by_run(&self, run_id: &str) -> Option<AuditEntry> {
        let entries = self.entries.read().await;
        entries.iter().find(|e| e.run_id == run_id).cloned()
    }

    /// Get statistics.
    pub async fn stats(&self) -> AuditStats {
        let entries = self.entries.read().await;

        let mut stats = AuditStats {
            total_runs: entries.len(),
            ..AuditStats::default()
        };
        let mut total_duration = 0;
        for entry in entries.iter() {
            match entry.status {
                Some(VerificationStatus::Verified) => stats.verified += 1,
                Some(VerificationStatus::UnverifiedTrivial) => stats.unverified_trivial += 1,
                Some(VerificationStatus::Unverified { .. }) => stats.unverified += 1,
                None if entry.error.is_some() => stats.failed += 1,
                None => {}
            }
            stats.contradictions += entry.contradictions.len();
            total_duration += entry.duration_ms.unwrap_or(0);
        }
        if stats.total_runs > 0 {
            stats.avg_duration_ms = total_duration / stats.total_runs as u64;
        }

        stats
    }

    /// Clear the log.
    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        entries.clear();
    }

    /// Get count.
    pub async fn count(&self) -> usize {
        let entries = self.entries.read().await;
        entries.len()
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics from the audit log.
#[derive(Debug, Clone, Default)]
pub struct AuditStats {
    /// Total runs logged
    pub total_runs: usize,
    /// Runs that went through revision
    pub verified: usize,
    /// Runs with nothing to check
    pub unverified_trivial: usize,
    /// Runs that fell back to the baseline
    pub unverified: usize,
    /// Runs that produced no answer
    pub failed: usize,
    /// Corrections across all runs
    pub contradictions: usize,
    /// Average run duration
    pub avg_duration_ms: u64,
}
