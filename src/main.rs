//! Demo binary: runs the triage pipeline over a fixture inbox and prints the
//! result, metrics snapshot, trace, and evaluation report as JSON.
//!
//! Environment:
//! - `TRIAGE_MAX_EMAILS`     cap on fetched emails (default 10)
//! - `TRIAGE_REQUIRE_APPROVAL` hold reply/escalate for approval (default true)
//! - `TRIAGE_LOG_JSON`       emit JSON logs instead of compact (default false)

use std::sync::Arc;

use inbox_triage::config::TriageConfig;
use inbox_triage::eval::OverallEvaluator;
use inbox_triage::fixture::{FixtureSource, KeywordOracle, RecordingExecutor};
use inbox_triage::observe::{MetricsCollector, RequestTracer};
use inbox_triage::pipeline::{Orchestrator, SuggestedAction};
use inbox_triage::session::InMemorySessionStore;
use inbox_triage::{logging, session::SessionStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let log_json = std::env::var("TRIAGE_LOG_JSON")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    if log_json {
        logging::init_json();
    } else {
        logging::init();
    }

    let config = TriageConfig::default();
    let max_emails: usize = std::env::var("TRIAGE_MAX_EMAILS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(config.max_emails);
    let require_approval: bool = std::env::var("TRIAGE_REQUIRE_APPROVAL")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(config.require_approval);

    eprintln!("inbox-triage demo v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   max_emails: {max_emails}");
    eprintln!("   require_approval: {require_approval}\n");

    let metrics = Arc::new(MetricsCollector::new());
    let tracer = Arc::new(RequestTracer::new());
    let sessions: Arc<InMemorySessionStore> =
        Arc::new(InMemorySessionStore::new(config.session_history_limit));

    let orchestrator = Orchestrator::new(
        Arc::new(FixtureSource::new(FixtureSource::sample_inbox())),
        Arc::new(KeywordOracle::new()),
        Arc::new(RecordingExecutor::new()),
        sessions.clone() as Arc<dyn SessionStore>,
        metrics.clone(),
        tracer.clone(),
        config,
    );

    let result = orchestrator
        .process_inbox("demo-session", max_emails, require_approval)
        .await?;

    println!("{}", serde_json::to_string_pretty(&result)?);

    // Score the run against hand-labeled truth for the sample inbox.
    let mut evaluator = OverallEvaluator::new();
    for summary in &result.summaries {
        evaluator.add_prediction(
            &summary.email_id,
            summary.suggested_action,
            summary.confidence,
            Some("demo".into()),
        );
    }
    for action in &result.actions {
        evaluator.record_action(action);
    }
    evaluator.add_truth("msg-001", SuggestedAction::Reply);
    evaluator.add_truth("msg-002", SuggestedAction::Archive);
    evaluator.add_truth("msg-003", SuggestedAction::Escalate);
    evaluator.add_truth("msg-004", SuggestedAction::Delegate);

    println!("{}", serde_json::to_string_pretty(&evaluator.report())?);
    println!("{}", serde_json::to_string_pretty(&metrics.snapshot())?);

    if let Some(trace) = tracer.get_trace(result.trace_id) {
        println!("{}", serde_json::to_string_pretty(&trace)?);
    }

    Ok(())
}
