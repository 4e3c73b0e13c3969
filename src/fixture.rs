//! In-memory collaborators for demos and integration tests.
//!
//! None of these talk to a network. `FixtureSource` serves a canned inbox,
//! `KeywordOracle` classifies by subject/body keywords, and
//! `RecordingExecutor` executes everything and remembers what it did.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use crate::error::{ActionError, OracleError, SourceError};
use crate::pipeline::{
    ActionExecutor, ActionResult, ActionStatus, EmailMessage, EmailSource, SummarizationOracle,
    SuggestedAction, SummaryOutcome, SummaryResult,
};

/// Email source serving a fixed inbox.
#[derive(Debug, Default)]
pub struct FixtureSource {
    emails: Vec<EmailMessage>,
    unavailable: bool,
}

impl FixtureSource {
    /// Serve the given messages.
    pub fn new(emails: Vec<EmailMessage>) -> Self {
        Self {
            emails,
            unavailable: false,
        }
    }

    /// A source that always fails, for exercising the abort path.
    pub fn unavailable() -> Self {
        Self {
            emails: Vec::new(),
            unavailable: true,
        }
    }

    /// A small sample inbox covering all four suggested actions.
    pub fn sample_inbox() -> Vec<EmailMessage> {
        let mk = |id: &str, sender: &str, subject: &str, body: &str| EmailMessage {
            id: id.into(),
            sender: sender.into(),
            subject: subject.into(),
            body: body.into(),
            received_at: Utc::now(),
        };
        vec![
            mk(
                "msg-001",
                "alice@example.com",
                "Can we reschedule Tuesday?",
                "Does Wednesday afternoon work for you instead?",
            ),
            mk(
                "msg-002",
                "noreply@newsletter.example.com",
                "Weekly digest",
                "Here is what happened this week. Unsubscribe anytime.",
            ),
            mk(
                "msg-003",
                "ops@example.com",
                "URGENT: production disk usage at 95%",
                "Paging on-call. Disk fills in roughly two hours.",
            ),
            mk(
                "msg-004",
                "bob@example.com",
                "Invoice approval",
                "Please forward this to whoever owns vendor payments.",
            ),
        ]
    }
}

#[async_trait]
impl EmailSource for FixtureSource {
    async fn fetch(
        &self,
        session_id: &str,
        max_count: usize,
    ) -> Result<Vec<EmailMessage>, SourceError> {
        if self.unavailable {
            return Err(SourceError::Unavailable {
                reason: "fixture source configured as unavailable".into(),
            });
        }
        debug!(session_id, max_count, "Fixture fetch");
        Ok(self.emails.iter().take(max_count).cloned().collect())
    }
}

/// Keyword-driven stand-in for the hosted LLM. Deterministic, so demo runs
/// and tests are reproducible.
#[derive(Debug, Default)]
pub struct KeywordOracle;

impl KeywordOracle {
    /// Create the oracle.
    pub fn new() -> Self {
        Self
    }

    fn classify(email: &EmailMessage) -> (SuggestedAction, f64, &'static str) {
        let haystack = format!("{} {}", email.subject, email.body).to_lowercase();
        if haystack.contains("urgent") || haystack.contains("asap") {
            (SuggestedAction::Escalate, 0.9, "urgency keyword present")
        } else if haystack.contains("unsubscribe") || haystack.contains("newsletter") {
            (SuggestedAction::Archive, 0.85, "bulk-mail keyword present")
        } else if haystack.contains("forward this") || haystack.contains("hand off") {
            (SuggestedAction::Delegate, 0.7, "hand-off keyword present")
        } else if haystack.contains('?') {
            (SuggestedAction::Reply, 0.75, "direct question detected")
        } else {
            (SuggestedAction::Archive, 0.5, "no signal, defaulting to archive")
        }
    }
}

#[async_trait]
impl SummarizationOracle for KeywordOracle {
    async fn summarize_batch(
        &self,
        messages: &[EmailMessage],
        context: &str,
    ) -> Result<Vec<SummaryOutcome>, OracleError> {
        debug!(
            batch = messages.len(),
            context_len = context.len(),
            "Keyword oracle summarizing batch"
        );
        Ok(messages
            .iter()
            .map(|email| {
                let (action, confidence, reasoning) = Self::classify(email);
                SummaryOutcome::Summarized(SummaryResult::new(
                    &email.id,
                    format!("{}: {}", email.sender, email.subject),
                    action,
                    confidence,
                    reasoning,
                ))
            })
            .collect())
    }
}

/// Executor that performs every action "successfully" and records the calls.
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    executed: Mutex<Vec<String>>,
}

impl RecordingExecutor {
    /// Create the executor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Email ids executed so far, in call order.
    pub fn executed_ids(&self) -> Vec<String> {
        self.executed
            .lock()
            .map(|v| v.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ActionExecutor for RecordingExecutor {
    async fn execute(&self, summary: &SummaryResult) -> Result<ActionResult, ActionError> {
        if let Ok(mut executed) = self.executed.lock() {
            executed.push(summary.email_id.clone());
        }
        Ok(ActionResult::new(
            &summary.email_id,
            summary.suggested_action,
            ActionStatus::Executed,
            format!("{} executed", summary.suggested_action.label()),
        ))
    }
}
