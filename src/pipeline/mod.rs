//! The triage pipeline: types, capability traits, and the orchestrator.

pub mod orchestrator;
pub mod types;

pub use orchestrator::Orchestrator;
pub use types::{
    ActionExecutor, ActionResult, ActionStatus, EmailMessage, EmailSource, PipelineResult,
    SuggestedAction, SummarizationOracle, SummaryOutcome, SummaryResult,
};
