//! Shared types for the triage pipeline.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ActionError, OracleError, SourceError};

// ── Email message ───────────────────────────────────────────────────

/// One fetched email. Created by the `EmailSource`, read-only downstream,
/// discarded after the pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailMessage {
    /// Unique ID (source-native).
    pub id: String,
    /// Sender identifier (email address).
    pub sender: String,
    /// Subject line.
    pub subject: String,
    /// Message body content.
    pub body: String,
    /// When the message was received.
    pub received_at: DateTime<Utc>,
}

// ── Suggested action ────────────────────────────────────────────────

/// Action the oracle suggests for an email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    /// Needs a response from the user.
    Reply,
    /// Noise or already handled; file it away.
    Archive,
    /// Needs human judgment; also the degraded fallback when
    /// summarization fails.
    Escalate,
    /// Hand off to someone else.
    Delegate,
}

impl SuggestedAction {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Reply => "reply",
            Self::Archive => "archive",
            Self::Escalate => "escalate",
            Self::Delegate => "delegate",
        }
    }

    /// Whether this action is gated behind human approval when the
    /// pipeline runs with `require_approval`. Archive and delegate are
    /// low-risk and reversible, so they always execute immediately.
    pub fn requires_approval(&self) -> bool {
        matches!(self, Self::Reply | Self::Escalate)
    }
}

impl std::fmt::Display for SuggestedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ── Summary result ──────────────────────────────────────────────────

/// Oracle output for one email. Consumed by the action stage and the
/// evaluators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryResult {
    /// ID of the email this summary describes.
    pub email_id: String,
    /// One-to-two sentence summary.
    pub summary: String,
    /// Suggested next action.
    pub suggested_action: SuggestedAction,
    /// Oracle confidence, clamped to [0, 1].
    pub confidence: f64,
    /// Why the oracle chose this action.
    pub reasoning: String,
    /// When the summary was produced.
    pub created_at: DateTime<Utc>,
}

impl SummaryResult {
    /// Build a summary result, clamping confidence to [0, 1]. Oracle
    /// confidences are never trusted as given.
    pub fn new(
        email_id: impl Into<String>,
        summary: impl Into<String>,
        suggested_action: SuggestedAction,
        confidence: f64,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            email_id: email_id.into(),
            summary: summary.into(),
            suggested_action,
            confidence: confidence.clamp(0.0, 1.0),
            reasoning: reasoning.into(),
            created_at: Utc::now(),
        }
    }

    /// Degraded entry for an email the oracle could not summarize: escalate
    /// with zero confidence so one bad item cannot abort the batch.
    pub fn failure_placeholder(email_id: impl Into<String>, reason: &str) -> Self {
        Self::new(
            email_id,
            "(summarization failed)",
            SuggestedAction::Escalate,
            0.0,
            format!("summarization failed: {reason}"),
        )
    }
}

// ── Action result ───────────────────────────────────────────────────

/// Execution status of a suggested action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    /// Action was carried out.
    Executed,
    /// Queued for human approval; nothing was sent.
    PendingApproval,
    /// Executor reported an error for this item.
    Failed,
}

impl ActionStatus {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Executed => "executed",
            Self::PendingApproval => "pending_approval",
            Self::Failed => "failed",
        }
    }
}

/// Outcome of executing (or deferring) one suggestion. Terminal once
/// recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    /// ID of the email the action applies to.
    pub email_id: String,
    /// The action that was attempted or deferred.
    pub action: SuggestedAction,
    /// How it ended up.
    pub status: ActionStatus,
    /// Human-readable detail (error text for failures).
    pub message: String,
    /// When the outcome was recorded.
    pub timestamp: DateTime<Utc>,
}

impl ActionResult {
    /// Record an outcome for a suggestion.
    pub fn new(
        email_id: impl Into<String>,
        action: SuggestedAction,
        status: ActionStatus,
        message: impl Into<String>,
    ) -> Self {
        Self {
            email_id: email_id.into(),
            action,
            status,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

// ── Summary outcome ─────────────────────────────────────────────────

/// Per-item outcome from a batch summarization call. Lets the oracle report
/// a single bad item without failing the whole batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SummaryOutcome {
    /// The item was summarized.
    Summarized(SummaryResult),
    /// The item failed; the pipeline records an escalation placeholder.
    Failed { email_id: String, reason: String },
}

impl SummaryOutcome {
    /// ID of the email this outcome belongs to.
    pub fn email_id(&self) -> &str {
        match self {
            Self::Summarized(s) => &s.email_id,
            Self::Failed { email_id, .. } => email_id,
        }
    }
}

// ── Pipeline result ─────────────────────────────────────────────────

/// Structured result of one `process_inbox` run. Always returned, even on
/// partial failure; only a source-unavailable condition raises instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    /// Number of emails fetched and processed.
    pub total_emails: usize,
    /// One summary per email that the oracle accounted for
    /// (including failure placeholders).
    pub summaries: Vec<SummaryResult>,
    /// One outcome per summary.
    pub actions: Vec<ActionResult>,
    /// Emails the oracle silently dropped from its batch response.
    /// `summaries.len() + dropped_summaries` always equals `total_emails`.
    pub dropped_summaries: usize,
    /// Trace recorded for this run; retrievable from the `RequestTracer`.
    pub trace_id: Uuid,
    /// When the run completed.
    pub timestamp: DateTime<Utc>,
}

// ── Capability traits ───────────────────────────────────────────────

/// Source of unread emails. Pure I/O, no triage logic. The hosting
/// application provides the real implementation (Gmail, IMAP, ...).
#[async_trait]
pub trait EmailSource: Send + Sync {
    /// Fetch up to `max_count` unread messages for a session.
    ///
    /// Fails with a `SourceError` on auth or network problems; returning
    /// fewer than `max_count` messages is normal.
    async fn fetch(
        &self,
        session_id: &str,
        max_count: usize,
    ) -> Result<Vec<EmailMessage>, SourceError>;
}

/// Summarization oracle (hosted LLM or otherwise). Called once per batch to
/// amortize latency, never once per email.
#[async_trait]
pub trait SummarizationOracle: Send + Sync {
    /// Summarize a batch of messages, returning outcomes aligned with the
    /// input order. May return fewer outcomes than inputs; the caller logs
    /// and counts dropped items.
    async fn summarize_batch(
        &self,
        messages: &[EmailMessage],
        context: &str,
    ) -> Result<Vec<SummaryOutcome>, OracleError>;
}

/// Executes one suggested action. Called once per item, never batched.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Execute the suggestion and report the outcome.
    async fn execute(&self, summary: &SummaryResult) -> Result<ActionResult, ActionError>;
}
