//! Evaluators: classification metrics for the summarizer, outcome rates for
//! the action stage, and a merged overall report.

pub mod action;
pub mod overall;
pub mod summarizer;

pub use action::{ActionEvaluator, ActionReport};
pub use overall::{OverallEvaluator, OverallReport};
pub use summarizer::{LabelMetrics, PredictionRecord, SummarizerEvaluator, SummarizerReport};
