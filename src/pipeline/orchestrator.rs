//! Pipeline orchestrator: drives the fetch, summarize, act sequence.
//!
//! **Core invariant: only a source-unavailable condition aborts a run.**
//! Every other failure is absorbed into the `PipelineResult` so the caller
//! always gets a usable report of what happened, including what failed.
//!
//! Flow:
//! 1. Fetch stage: fatal on source error, no partial results
//! 2. Summarize stage: one batch call; failures degrade to placeholders
//! 3. Act stage: per item, independent; failures recorded and skipped past

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::config::TriageConfig;
use crate::error::PipelineError;
use crate::observe::{MetricsCollector, RequestTracer, Stage, attrs};
use crate::session::SessionStore;

use super::types::{
    ActionExecutor, ActionResult, ActionStatus, EmailSource, PipelineResult, SummarizationOracle,
    SummaryOutcome, SummaryResult,
};

/// Drives the three-stage triage sequence against injected collaborators,
/// feeding counts and latencies into the shared `MetricsCollector` and one
/// trace per run into the shared `RequestTracer`.
pub struct Orchestrator {
    source: Arc<dyn EmailSource>,
    oracle: Arc<dyn SummarizationOracle>,
    executor: Arc<dyn ActionExecutor>,
    sessions: Arc<dyn SessionStore>,
    metrics: Arc<MetricsCollector>,
    tracer: Arc<RequestTracer>,
    config: TriageConfig,
}

impl Orchestrator {
    /// Wire up an orchestrator from its collaborators.
    pub fn new(
        source: Arc<dyn EmailSource>,
        oracle: Arc<dyn SummarizationOracle>,
        executor: Arc<dyn ActionExecutor>,
        sessions: Arc<dyn SessionStore>,
        metrics: Arc<MetricsCollector>,
        tracer: Arc<RequestTracer>,
        config: TriageConfig,
    ) -> Self {
        Self {
            source,
            oracle,
            executor,
            sessions,
            metrics,
            tracer,
            config,
        }
    }

    /// Run the full pipeline for one session.
    ///
    /// `max_emails` caps the fetch; the source returning fewer is normal.
    /// With `require_approval`, reply and escalate suggestions are held as
    /// `PendingApproval` instead of being executed; archive and delegate
    /// execute immediately regardless. The call runs to completion once
    /// started; there is no cancellation and no internal retry.
    pub async fn process_inbox(
        &self,
        session_id: &str,
        max_emails: usize,
        require_approval: bool,
    ) -> Result<PipelineResult, PipelineError> {
        if session_id.is_empty() {
            return Err(PipelineError::InvalidSession {
                reason: "session_id must not be empty".into(),
            });
        }

        info!(
            session_id,
            max_emails, require_approval, "Starting inbox processing"
        );

        let trace_id = self.tracer.start_trace(
            "process_inbox",
            attrs([
                ("session_id", json!(session_id)),
                ("max_emails", json!(max_emails)),
                ("require_approval", json!(require_approval)),
            ]),
        );

        self.sessions.ensure_session(session_id).await;

        // ── Fetch stage ─────────────────────────────────────────────
        let started = Instant::now();
        let fetched = self.source.fetch(session_id, max_emails).await;
        let fetch_elapsed = started.elapsed();
        self.metrics.record_stage_latency(Stage::Fetch, fetch_elapsed);

        let mut emails = match fetched {
            Ok(emails) => emails,
            Err(e) => {
                error!(session_id, error = %e, "Email source failed, aborting run");
                self.add_span(
                    trace_id,
                    "fetch",
                    attrs([("error", json!(e.to_string()))]),
                    fetch_elapsed,
                );
                self.seal(trace_id);
                return Err(PipelineError::SourceUnavailable(e));
            }
        };
        // Defensive cap in case the source over-delivers.
        emails.truncate(max_emails);

        self.metrics.record_emails_processed(emails.len());
        self.add_span(
            trace_id,
            "fetch",
            attrs([("emails", json!(emails.len()))]),
            fetch_elapsed,
        );

        if emails.is_empty() {
            info!(session_id, "No emails to process");
            self.seal(trace_id);
            return Ok(PipelineResult {
                total_emails: 0,
                summaries: Vec::new(),
                actions: Vec::new(),
                dropped_summaries: 0,
                trace_id,
                timestamp: Utc::now(),
            });
        }

        // ── Summarize stage ─────────────────────────────────────────
        let context = self
            .sessions
            .context(session_id, self.config.context_notes)
            .await;

        let started = Instant::now();
        let batch = self.oracle.summarize_batch(&emails, &context).await;
        let summarize_elapsed = started.elapsed();
        self.metrics
            .record_stage_latency(Stage::Summarize, summarize_elapsed);

        let (summaries, dropped) = self.reconcile_summaries(&emails, batch);
        self.metrics.record_summaries(summaries.len(), dropped);
        self.add_span(
            trace_id,
            "summarize",
            attrs([
                ("summaries", json!(summaries.len())),
                ("dropped", json!(dropped)),
            ]),
            summarize_elapsed,
        );

        // ── Act stage ───────────────────────────────────────────────
        let started = Instant::now();
        let actions = self.execute_actions(&summaries, require_approval).await;
        let act_elapsed = started.elapsed();
        self.metrics.record_stage_latency(Stage::Act, act_elapsed);

        let pending = actions
            .iter()
            .filter(|a| a.status == ActionStatus::PendingApproval)
            .count();
        self.metrics.set_pending_approvals(pending as u64);
        self.add_span(
            trace_id,
            "act",
            attrs([
                ("actions", json!(actions.len())),
                ("pending_approval", json!(pending)),
            ]),
            act_elapsed,
        );

        self.seal(trace_id);

        self.sessions
            .record_note(
                session_id,
                format!(
                    "processed {} emails ({} pending approval, {} dropped)",
                    emails.len(),
                    pending,
                    dropped
                ),
            )
            .await;

        info!(
            session_id,
            total = emails.len(),
            summaries = summaries.len(),
            dropped,
            pending,
            "Inbox processing complete"
        );

        Ok(PipelineResult {
            total_emails: emails.len(),
            summaries,
            actions,
            dropped_summaries: dropped,
            trace_id,
            timestamp: Utc::now(),
        })
    }

    /// Reconcile the oracle's batch response against the fetched emails.
    ///
    /// - a whole-batch failure degrades every email to a placeholder;
    /// - a per-item failure degrades that item only;
    /// - outcomes for ids not in the batch are discarded with a warning;
    /// - fetched emails with no outcome are dropped and counted, so
    ///   `summaries.len() + dropped == emails.len()` always holds.
    fn reconcile_summaries(
        &self,
        emails: &[super::types::EmailMessage],
        batch: Result<Vec<SummaryOutcome>, crate::error::OracleError>,
    ) -> (Vec<SummaryResult>, usize) {
        let outcomes = match batch {
            Ok(outcomes) => outcomes,
            Err(e) => {
                warn!(error = %e, "Oracle batch failed, escalating every item");
                let summaries = emails
                    .iter()
                    .map(|email| SummaryResult::failure_placeholder(&email.id, &e.to_string()))
                    .collect();
                return (summaries, 0);
            }
        };

        let batch_ids: std::collections::HashSet<&str> =
            emails.iter().map(|e| e.id.as_str()).collect();
        let mut by_id: HashMap<String, SummaryOutcome> = HashMap::new();
        for outcome in outcomes {
            if !batch_ids.contains(outcome.email_id()) {
                warn!(
                    email_id = outcome.email_id(),
                    "Oracle returned summary for email not in batch, discarding"
                );
                continue;
            }
            by_id.insert(outcome.email_id().to_string(), outcome);
        }

        let mut summaries = Vec::with_capacity(emails.len());
        let mut dropped = 0;
        for email in emails {
            match by_id.remove(&email.id) {
                Some(SummaryOutcome::Summarized(summary)) => {
                    // Re-clamp: oracle output is not trusted as given.
                    let confidence = summary.confidence;
                    summaries.push(SummaryResult {
                        confidence: confidence.clamp(0.0, 1.0),
                        ..summary
                    });
                }
                Some(SummaryOutcome::Failed { reason, .. }) => {
                    warn!(email_id = %email.id, reason = %reason, "Oracle failed on item, escalating");
                    summaries.push(SummaryResult::failure_placeholder(&email.id, &reason));
                }
                None => {
                    warn!(email_id = %email.id, "Oracle dropped item from batch response");
                    dropped += 1;
                }
            }
        }
        (summaries, dropped)
    }

    /// Execute each suggestion independently. Approval-gated actions are
    /// held without touching the executor; executor errors become failed
    /// results and the loop continues.
    async fn execute_actions(
        &self,
        summaries: &[SummaryResult],
        require_approval: bool,
    ) -> Vec<ActionResult> {
        let mut actions = Vec::with_capacity(summaries.len());
        for summary in summaries {
            let result = if require_approval && summary.suggested_action.requires_approval() {
                debug!(
                    email_id = %summary.email_id,
                    action = summary.suggested_action.label(),
                    "Holding action for human approval"
                );
                ActionResult::new(
                    &summary.email_id,
                    summary.suggested_action,
                    ActionStatus::PendingApproval,
                    "Awaiting human approval",
                )
            } else {
                match self.executor.execute(summary).await {
                    Ok(result) => result,
                    Err(e) => {
                        error!(
                            email_id = %summary.email_id,
                            action = summary.suggested_action.label(),
                            error = %e,
                            "Action execution failed"
                        );
                        ActionResult::new(
                            &summary.email_id,
                            summary.suggested_action,
                            ActionStatus::Failed,
                            e.to_string(),
                        )
                    }
                }
            };

            self.metrics.record_action_executed(result.status);
            actions.push(result);
        }
        actions
    }

    fn add_span(
        &self,
        trace_id: uuid::Uuid,
        name: &str,
        attributes: serde_json::Map<String, serde_json::Value>,
        duration: std::time::Duration,
    ) {
        if let Err(e) = self.tracer.add_span(trace_id, name, attributes, duration) {
            warn!(trace_id = %trace_id, span = name, error = %e, "Failed to add span");
        }
    }

    fn seal(&self, trace_id: uuid::Uuid) {
        if let Err(e) = self.tracer.end_trace(trace_id) {
            warn!(trace_id = %trace_id, error = %e, "Failed to seal trace");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ActionError, OracleError, SourceError};
    use crate::pipeline::types::{EmailMessage, SuggestedAction};
    use crate::session::InMemorySessionStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn email(id: &str, subject: &str) -> EmailMessage {
        EmailMessage {
            id: id.into(),
            sender: "alice@example.com".into(),
            subject: subject.into(),
            body: "body".into(),
            received_at: Utc::now(),
        }
    }

    /// Source returning a fixed set of emails, or failing outright.
    struct StubSource {
        emails: Vec<EmailMessage>,
        fail: bool,
    }

    #[async_trait]
    impl EmailSource for StubSource {
        async fn fetch(
            &self,
            _session_id: &str,
            max_count: usize,
        ) -> Result<Vec<EmailMessage>, SourceError> {
            if self.fail {
                return Err(SourceError::Unavailable {
                    reason: "imap connection refused".into(),
                });
            }
            Ok(self.emails.iter().take(max_count).cloned().collect())
        }
    }

    /// Oracle that maps email ids to canned outcomes; unmapped ids are
    /// silently omitted (a "dropped" item). Records the context it was
    /// handed.
    struct StubOracle {
        outcomes: Vec<SummaryOutcome>,
        fail_batch: bool,
        seen_context: Mutex<Option<String>>,
    }

    impl StubOracle {
        fn with_actions(pairs: &[(&str, SuggestedAction, f64)]) -> Self {
            let outcomes = pairs
                .iter()
                .map(|(id, action, conf)| {
                    SummaryOutcome::Summarized(SummaryResult::new(
                        *id,
                        format!("summary of {id}"),
                        *action,
                        *conf,
                        "stub",
                    ))
                })
                .collect();
            Self {
                outcomes,
                fail_batch: false,
                seen_context: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl SummarizationOracle for StubOracle {
        async fn summarize_batch(
            &self,
            _messages: &[EmailMessage],
            context: &str,
        ) -> Result<Vec<SummaryOutcome>, OracleError> {
            *self.seen_context.lock().unwrap() = Some(context.to_string());
            if self.fail_batch {
                return Err(OracleError::BatchFailed {
                    reason: "model overloaded".into(),
                });
            }
            Ok(self.outcomes.clone())
        }
    }

    /// Executor that succeeds unless the email id is listed as failing.
    struct StubExecutor {
        fail_ids: Vec<String>,
        calls: Mutex<Vec<String>>,
    }

    impl StubExecutor {
        fn ok() -> Self {
            Self {
                fail_ids: Vec::new(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ActionExecutor for StubExecutor {
        async fn execute(&self, summary: &SummaryResult) -> Result<ActionResult, ActionError> {
            self.calls.lock().unwrap().push(summary.email_id.clone());
            if self.fail_ids.contains(&summary.email_id) {
                return Err(ActionError::ExecutionFailed {
                    email_id: summary.email_id.clone(),
                    reason: "smtp rejected".into(),
                });
            }
            Ok(ActionResult::new(
                &summary.email_id,
                summary.suggested_action,
                ActionStatus::Executed,
                "done",
            ))
        }
    }

    struct Harness {
        orchestrator: Orchestrator,
        metrics: Arc<MetricsCollector>,
        tracer: Arc<RequestTracer>,
        executor: Arc<StubExecutor>,
        oracle: Arc<StubOracle>,
        sessions: Arc<InMemorySessionStore>,
    }

    fn harness(source: StubSource, oracle: StubOracle, executor: StubExecutor) -> Harness {
        let metrics = Arc::new(MetricsCollector::new());
        let tracer = Arc::new(RequestTracer::new());
        let sessions = Arc::new(InMemorySessionStore::new(10));
        let executor = Arc::new(executor);
        let oracle = Arc::new(oracle);
        let orchestrator = Orchestrator::new(
            Arc::new(source),
            oracle.clone(),
            executor.clone(),
            sessions.clone(),
            metrics.clone(),
            tracer.clone(),
            TriageConfig::default(),
        );
        Harness {
            orchestrator,
            metrics,
            tracer,
            executor,
            oracle,
            sessions,
        }
    }

    #[tokio::test]
    async fn approval_gating_scenario() {
        // 3 emails → [reply, archive, escalate] with require_approval.
        let h = harness(
            StubSource {
                emails: vec![email("1", "a"), email("2", "b"), email("3", "c")],
                fail: false,
            },
            StubOracle::with_actions(&[
                ("1", SuggestedAction::Reply, 0.9),
                ("2", SuggestedAction::Archive, 0.8),
                ("3", SuggestedAction::Escalate, 0.7),
            ]),
            StubExecutor::ok(),
        );

        let result = h.orchestrator.process_inbox("s1", 10, true).await.unwrap();
        let statuses: Vec<ActionStatus> = result.actions.iter().map(|a| a.status).collect();
        assert_eq!(
            statuses,
            vec![
                ActionStatus::PendingApproval,
                ActionStatus::Executed,
                ActionStatus::PendingApproval,
            ]
        );

        // Only the archive should have reached the executor.
        assert_eq!(*h.executor.calls.lock().unwrap(), vec!["2".to_string()]);
        assert_eq!(h.metrics.snapshot().pending_approvals, 2);
    }

    #[tokio::test]
    async fn no_approval_executes_everything() {
        let h = harness(
            StubSource {
                emails: vec![email("1", "a"), email("2", "b")],
                fail: false,
            },
            StubOracle::with_actions(&[
                ("1", SuggestedAction::Reply, 0.9),
                ("2", SuggestedAction::Escalate, 0.6),
            ]),
            StubExecutor::ok(),
        );

        let result = h.orchestrator.process_inbox("s1", 10, false).await.unwrap();
        assert!(result
            .actions
            .iter()
            .all(|a| a.status == ActionStatus::Executed));
        assert_eq!(h.executor.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn source_failure_aborts_with_sealed_trace() {
        let h = harness(
            StubSource {
                emails: Vec::new(),
                fail: true,
            },
            StubOracle::with_actions(&[]),
            StubExecutor::ok(),
        );

        let err = h.orchestrator.process_inbox("s1", 5, true).await.unwrap_err();
        assert!(matches!(err, PipelineError::SourceUnavailable(_)));

        // The one trace opened for the run must be sealed even on the
        // error path, with the fetch span carrying the error.
        let traces = h.tracer.traces();
        assert_eq!(traces.len(), 1);
        let trace = &traces[0];
        assert!(trace.sealed);
        assert_eq!(trace.spans.len(), 1);
        assert_eq!(trace.spans[0].name, "fetch");
        assert!(trace.spans[0].attributes.contains_key("error"));
    }

    #[tokio::test]
    async fn empty_session_id_is_rejected() {
        let h = harness(
            StubSource {
                emails: Vec::new(),
                fail: false,
            },
            StubOracle::with_actions(&[]),
            StubExecutor::ok(),
        );

        let err = h.orchestrator.process_inbox("", 5, true).await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidSession { .. }));
        // No trace is opened for a rejected call.
        assert!(h.tracer.is_empty());
    }

    #[tokio::test]
    async fn empty_inbox_short_circuits() {
        let h = harness(
            StubSource {
                emails: Vec::new(),
                fail: false,
            },
            StubOracle::with_actions(&[]),
            StubExecutor::ok(),
        );

        let result = h.orchestrator.process_inbox("s1", 5, true).await.unwrap();
        assert_eq!(result.total_emails, 0);
        assert!(result.summaries.is_empty());
        assert!(result.actions.is_empty());

        let trace = h.tracer.get_trace(result.trace_id).unwrap();
        assert!(trace.sealed);
        assert_eq!(trace.spans.len(), 1); // fetch only
    }

    #[tokio::test]
    async fn per_item_oracle_failure_degrades_to_placeholder() {
        // Oracle fails on email 2 of 3; pipeline must not raise.
        let mut oracle = StubOracle::with_actions(&[
            ("1", SuggestedAction::Archive, 0.8),
            ("3", SuggestedAction::Archive, 0.7),
        ]);
        oracle.outcomes.push(SummaryOutcome::Failed {
            email_id: "2".into(),
            reason: "token limit".into(),
        });

        let h = harness(
            StubSource {
                emails: vec![email("1", "a"), email("2", "b"), email("3", "c")],
                fail: false,
            },
            oracle,
            StubExecutor::ok(),
        );

        let result = h.orchestrator.process_inbox("s1", 10, true).await.unwrap();
        assert_eq!(result.summaries.len(), 3);
        assert_eq!(result.dropped_summaries, 0);

        let failed = result
            .summaries
            .iter()
            .find(|s| s.email_id == "2")
            .unwrap();
        assert_eq!(failed.suggested_action, SuggestedAction::Escalate);
        assert!(failed.confidence.abs() < f64::EPSILON);
        assert!(failed.reasoning.contains("token limit"));
    }

    #[tokio::test]
    async fn whole_batch_failure_escalates_every_item() {
        let mut oracle = StubOracle::with_actions(&[]);
        oracle.fail_batch = true;

        let h = harness(
            StubSource {
                emails: vec![email("1", "a"), email("2", "b")],
                fail: false,
            },
            oracle,
            StubExecutor::ok(),
        );

        let result = h.orchestrator.process_inbox("s1", 10, true).await.unwrap();
        assert_eq!(result.summaries.len(), 2);
        assert!(result
            .summaries
            .iter()
            .all(|s| s.suggested_action == SuggestedAction::Escalate && s.confidence == 0.0));
    }

    #[tokio::test]
    async fn dropped_items_are_accounted() {
        // Oracle only answers for email 1; emails 2 and 3 are dropped.
        let h = harness(
            StubSource {
                emails: vec![email("1", "a"), email("2", "b"), email("3", "c")],
                fail: false,
            },
            StubOracle::with_actions(&[("1", SuggestedAction::Archive, 0.9)]),
            StubExecutor::ok(),
        );

        let result = h.orchestrator.process_inbox("s1", 10, true).await.unwrap();
        assert_eq!(result.summaries.len() + result.dropped_summaries, 3);
        assert_eq!(result.dropped_summaries, 2);

        let snap = h.metrics.snapshot();
        assert_eq!(snap.emails_processed, 3);
        assert_eq!(snap.summaries_generated, 1);
        assert_eq!(snap.summaries_dropped, 2);
    }

    #[tokio::test]
    async fn executor_failure_is_absorbed() {
        let h = harness(
            StubSource {
                emails: vec![email("1", "a"), email("2", "b")],
                fail: false,
            },
            StubOracle::with_actions(&[
                ("1", SuggestedAction::Archive, 0.8),
                ("2", SuggestedAction::Archive, 0.8),
            ]),
            StubExecutor {
                fail_ids: vec!["1".into()],
                calls: Mutex::new(Vec::new()),
            },
        );

        let result = h.orchestrator.process_inbox("s1", 10, true).await.unwrap();
        assert_eq!(result.actions[0].status, ActionStatus::Failed);
        assert!(result.actions[0].message.contains("smtp rejected"));
        assert_eq!(result.actions[1].status, ActionStatus::Executed);

        let snap = h.metrics.snapshot();
        assert_eq!(snap.actions_failed, 1);
        assert_eq!(snap.actions_succeeded, 1);
    }

    #[tokio::test]
    async fn max_emails_caps_fetch() {
        let h = harness(
            StubSource {
                emails: vec![email("1", "a"), email("2", "b"), email("3", "c")],
                fail: false,
            },
            StubOracle::with_actions(&[
                ("1", SuggestedAction::Archive, 0.8),
                ("2", SuggestedAction::Archive, 0.8),
            ]),
            StubExecutor::ok(),
        );

        let result = h.orchestrator.process_inbox("s1", 2, true).await.unwrap();
        assert_eq!(result.total_emails, 2);
    }

    #[tokio::test]
    async fn trace_covers_all_three_stages() {
        let h = harness(
            StubSource {
                emails: vec![email("1", "a")],
                fail: false,
            },
            StubOracle::with_actions(&[("1", SuggestedAction::Archive, 0.8)]),
            StubExecutor::ok(),
        );

        let result = h.orchestrator.process_inbox("s1", 10, true).await.unwrap();
        let trace = h.tracer.get_trace(result.trace_id).unwrap();
        assert!(trace.sealed);
        let names: Vec<&str> = trace.spans.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["fetch", "summarize", "act"]);
        assert!(trace.total_duration.is_some());
    }

    #[tokio::test]
    async fn session_context_flows_to_oracle() {
        let h = harness(
            StubSource {
                emails: vec![email("1", "a")],
                fail: false,
            },
            StubOracle::with_actions(&[("1", SuggestedAction::Archive, 0.8)]),
            StubExecutor::ok(),
        );

        h.sessions.ensure_session("s1").await;
        h.sessions
            .record_note("s1", "user prefers digests".into())
            .await;

        h.orchestrator.process_inbox("s1", 10, true).await.unwrap();
        let seen = h.oracle.seen_context.lock().unwrap().clone().unwrap();
        assert!(seen.contains("user prefers digests"));

        // The run itself leaves a note for the next run's context.
        let state = h.sessions.get("s1").await.unwrap();
        assert_eq!(state.notes.len(), 2);
    }
}
