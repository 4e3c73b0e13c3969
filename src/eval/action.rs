//! Action execution evaluation: outcome rates over the action stream.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::pipeline::{ActionResult, ActionStatus, SuggestedAction};

/// Rates over the recorded action stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionReport {
    /// Total actions recorded.
    pub total: usize,
    /// Actions that executed.
    pub executed: usize,
    /// Actions that failed.
    pub failed: usize,
    /// Actions held for human approval.
    pub pending_approval: usize,
    /// executed / (executed + failed); absent when nothing was attempted
    /// (all actions pending).
    pub success_rate: Option<f64>,
    /// pending_approval / total.
    pub approval_rate: f64,
    /// count(action == escalate) / total.
    pub escalation_rate: f64,
}

/// Accumulates `ActionResult`s and reports outcome rates.
#[derive(Debug, Default)]
pub struct ActionEvaluator {
    results: Vec<(SuggestedAction, ActionStatus)>,
}

impl ActionEvaluator {
    /// Create an empty evaluator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one action outcome.
    pub fn record(&mut self, result: &ActionResult) {
        self.results.push((result.action, result.status));
    }

    /// Number of outcomes recorded.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Whether anything has been recorded.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Compute outcome rates. Returns `None` when nothing was recorded.
    pub fn report(&self) -> Option<ActionReport> {
        if self.results.is_empty() {
            return None;
        }

        let total = self.results.len();
        let executed = self
            .results
            .iter()
            .filter(|(_, s)| *s == ActionStatus::Executed)
            .count();
        let failed = self
            .results
            .iter()
            .filter(|(_, s)| *s == ActionStatus::Failed)
            .count();
        let pending_approval = self
            .results
            .iter()
            .filter(|(_, s)| *s == ActionStatus::PendingApproval)
            .count();
        let escalations = self
            .results
            .iter()
            .filter(|(a, _)| *a == SuggestedAction::Escalate)
            .count();

        let attempted = executed + failed;
        let success_rate = (attempted > 0).then(|| executed as f64 / attempted as f64);

        let report = ActionReport {
            total,
            executed,
            failed,
            pending_approval,
            success_rate,
            approval_rate: pending_approval as f64 / total as f64,
            escalation_rate: escalations as f64 / total as f64,
        };

        info!(
            total = report.total,
            executed = report.executed,
            failed = report.failed,
            pending = report.pending_approval,
            "Action evaluation complete"
        );

        Some(report)
    }

    /// Drop all recorded outcomes.
    pub fn reset(&mut self) {
        self.results.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(action: SuggestedAction, status: ActionStatus) -> ActionResult {
        ActionResult::new("e1", action, status, "")
    }

    #[test]
    fn empty_stream_yields_no_report() {
        assert!(ActionEvaluator::new().report().is_none());
    }

    #[test]
    fn rates_over_mixed_stream() {
        let mut eval = ActionEvaluator::new();
        eval.record(&result(SuggestedAction::Archive, ActionStatus::Executed));
        eval.record(&result(SuggestedAction::Reply, ActionStatus::PendingApproval));
        eval.record(&result(SuggestedAction::Escalate, ActionStatus::PendingApproval));
        eval.record(&result(SuggestedAction::Delegate, ActionStatus::Failed));

        let report = eval.report().unwrap();
        assert_eq!(report.total, 4);
        assert_eq!(report.executed, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.pending_approval, 2);
        assert!((report.success_rate.unwrap() - 0.5).abs() < 1e-9);
        assert!((report.approval_rate - 0.5).abs() < 1e-9);
        assert!((report.escalation_rate - 0.25).abs() < 1e-9);
    }

    #[test]
    fn all_pending_has_no_success_rate() {
        let mut eval = ActionEvaluator::new();
        eval.record(&result(SuggestedAction::Reply, ActionStatus::PendingApproval));
        eval.record(&result(SuggestedAction::Escalate, ActionStatus::PendingApproval));

        let report = eval.report().unwrap();
        assert!(report.success_rate.is_none());
        assert!((report.approval_rate - 1.0).abs() < 1e-9);
    }

    #[test]
    fn reset_clears_stream() {
        let mut eval = ActionEvaluator::new();
        eval.record(&result(SuggestedAction::Archive, ActionStatus::Executed));
        eval.reset();
        assert!(eval.is_empty());
        assert!(eval.report().is_none());
    }
}
