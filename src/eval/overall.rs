//! Combined evaluation report over both evaluators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pipeline::{ActionResult, SuggestedAction};

use super::action::{ActionEvaluator, ActionReport};
use super::summarizer::{SummarizerEvaluator, SummarizerReport};

/// Merged report: the two sub-reports side by side plus timing. Pure
/// aggregation: no metric is computed here that the sub-evaluators don't
/// already compute. Absent sub-reports serialize as `null`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverallReport {
    /// When the report was generated.
    pub generated_at: DateTime<Utc>,
    /// Seconds since the evaluator was created or last reset.
    pub elapsed_seconds: f64,
    /// Summarizer classification metrics, if any data overlapped.
    pub summarizer: Option<SummarizerReport>,
    /// Action outcome rates, if any actions were recorded.
    pub actions: Option<ActionReport>,
}

/// Owns one evaluator of each kind and merges their reports.
#[derive(Debug)]
pub struct OverallEvaluator {
    summarizer: SummarizerEvaluator,
    actions: ActionEvaluator,
    started_at: DateTime<Utc>,
}

impl Default for OverallEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl OverallEvaluator {
    /// Create a fresh evaluator pair.
    pub fn new() -> Self {
        Self {
            summarizer: SummarizerEvaluator::new(),
            actions: ActionEvaluator::new(),
            started_at: Utc::now(),
        }
    }

    /// Record a summarizer prediction.
    pub fn add_prediction(
        &mut self,
        email_id: impl Into<String>,
        predicted_action: SuggestedAction,
        confidence: f64,
        context: Option<String>,
    ) {
        self.summarizer
            .add_prediction(email_id, predicted_action, confidence, context);
    }

    /// Record a ground-truth label.
    pub fn add_truth(&mut self, email_id: impl Into<String>, true_action: SuggestedAction) {
        self.summarizer.add_truth(email_id, true_action);
    }

    /// Record an action outcome.
    pub fn record_action(&mut self, result: &ActionResult) {
        self.actions.record(result);
    }

    /// Merge both sub-reports into one mapping.
    pub fn report(&self) -> OverallReport {
        OverallReport {
            generated_at: Utc::now(),
            elapsed_seconds: (Utc::now() - self.started_at).num_milliseconds() as f64 / 1000.0,
            summarizer: self.summarizer.evaluate(),
            actions: self.actions.report(),
        }
    }

    /// Reset both evaluators and the clock.
    pub fn reset(&mut self) {
        self.summarizer.reset();
        self.actions.reset();
        self.started_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ActionStatus;

    #[test]
    fn merges_both_reports() {
        let mut eval = OverallEvaluator::new();
        eval.add_prediction("1", SuggestedAction::Reply, 0.9, None);
        eval.add_truth("1", SuggestedAction::Reply);
        eval.record_action(&ActionResult::new(
            "1",
            SuggestedAction::Reply,
            ActionStatus::PendingApproval,
            "",
        ));

        let report = eval.report();
        assert!((report.summarizer.unwrap().accuracy - 1.0).abs() < 1e-9);
        assert_eq!(report.actions.unwrap().pending_approval, 1);
    }

    #[test]
    fn empty_sub_reports_serialize_as_null() {
        let eval = OverallEvaluator::new();
        let json = serde_json::to_value(eval.report()).unwrap();
        assert!(json["summarizer"].is_null());
        assert!(json["actions"].is_null());
    }

    #[test]
    fn reset_clears_both() {
        let mut eval = OverallEvaluator::new();
        eval.add_prediction("1", SuggestedAction::Archive, 0.5, None);
        eval.add_truth("1", SuggestedAction::Archive);
        eval.record_action(&ActionResult::new(
            "1",
            SuggestedAction::Archive,
            ActionStatus::Executed,
            "",
        ));

        eval.reset();
        let report = eval.report();
        assert!(report.summarizer.is_none());
        assert!(report.actions.is_none());
    }
}
