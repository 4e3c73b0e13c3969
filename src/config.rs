//! Configuration types.

use std::time::Duration;

/// Triage pipeline configuration.
#[derive(Debug, Clone)]
pub struct TriageConfig {
    /// Default cap on emails fetched per run.
    pub max_emails: usize,
    /// Whether reply/escalate suggestions are held for human approval.
    pub require_approval: bool,
    /// How many recent session notes feed the oracle as context.
    pub context_notes: usize,
    /// Session idle timeout (sessions are pruned after this duration).
    pub session_idle_timeout: Duration,
    /// Maximum notes kept per session.
    pub session_history_limit: usize,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            max_emails: 10,
            require_approval: true,
            context_notes: 5,
            session_idle_timeout: Duration::from_secs(3600), // 1 hour
            session_history_limit: 50,
        }
    }
}
