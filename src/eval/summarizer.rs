//! Summarizer evaluation: predicted actions against ground truth.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::pipeline::SuggestedAction;

/// A recorded prediction. Immutable once stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRecord {
    /// Email the prediction applies to.
    pub email_id: String,
    /// Action the summarizer suggested.
    pub predicted_action: SuggestedAction,
    /// Predicted confidence, clamped to [0, 1].
    pub confidence: f64,
    /// Optional context tag (e.g. which run produced it).
    pub context: Option<String>,
}

/// One-vs-rest classification metrics for a single action label.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LabelMetrics {
    /// TP / (TP + FP); 0 when the label was never predicted.
    pub precision: f64,
    /// TP / (TP + FN); 0 when the label has no true instances.
    pub recall: f64,
    /// 2·P·R / (P + R); 0 when P + R is 0.
    pub f1: f64,
    /// Number of truth records with this label in the considered set.
    pub support: usize,
}

/// Metrics over the considered set: email ids present in both the
/// prediction and truth maps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizerReport {
    /// Size of the considered set.
    pub considered: usize,
    /// Predictions matching their truth label.
    pub correct: usize,
    /// correct / considered.
    pub accuracy: f64,
    /// Mean predicted confidence over the considered set.
    pub avg_confidence: f64,
    /// Unweighted mean of per-label F1 over labels present in the truth set.
    pub macro_f1: f64,
    /// Per-label metrics, one entry per action label present in the truth
    /// set. Labels that were predicted but never true are not scored.
    pub per_label: BTreeMap<SuggestedAction, LabelMetrics>,
}

/// Accumulates predictions and ground truth, then scores them.
///
/// `add_prediction` and `add_truth` are independent and commutative across
/// ids; for the same id the operations are keyed and last-write-wins, so a
/// second `add_truth("e1", ...)` replaces the first. Records with no
/// matching counterpart are excluded from scoring, not treated as errors.
#[derive(Debug, Default)]
pub struct SummarizerEvaluator {
    predictions: HashMap<String, PredictionRecord>,
    truths: HashMap<String, SuggestedAction>,
}

impl SummarizerEvaluator {
    /// Create an empty evaluator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a prediction. Confidence is clamped to [0, 1] before storage.
    pub fn add_prediction(
        &mut self,
        email_id: impl Into<String>,
        predicted_action: SuggestedAction,
        confidence: f64,
        context: Option<String>,
    ) {
        let email_id = email_id.into();
        self.predictions.insert(
            email_id.clone(),
            PredictionRecord {
                email_id,
                predicted_action,
                confidence: confidence.clamp(0.0, 1.0),
                context,
            },
        );
    }

    /// Record a ground-truth label. Last write wins for a repeated id.
    pub fn add_truth(&mut self, email_id: impl Into<String>, true_action: SuggestedAction) {
        self.truths.insert(email_id.into(), true_action);
    }

    /// Number of predictions recorded.
    pub fn prediction_count(&self) -> usize {
        self.predictions.len()
    }

    /// Number of truth records.
    pub fn truth_count(&self) -> usize {
        self.truths.len()
    }

    /// Score predictions against truth over the considered set.
    ///
    /// Returns `None` when the considered set is empty: there is no data,
    /// which is not the same thing as 0% accuracy.
    pub fn evaluate(&self) -> Option<SummarizerReport> {
        let considered: Vec<(&PredictionRecord, SuggestedAction)> = self
            .predictions
            .values()
            .filter_map(|pred| self.truths.get(&pred.email_id).map(|t| (pred, *t)))
            .collect();

        if considered.is_empty() {
            return None;
        }

        let total = considered.len();
        let correct = considered
            .iter()
            .filter(|(pred, truth)| pred.predicted_action == *truth)
            .count();
        let total_confidence: f64 = considered.iter().map(|(pred, _)| pred.confidence).sum();

        // One-vs-rest metrics per label present in the ground truth.
        let mut per_label = BTreeMap::new();
        let truth_labels: std::collections::BTreeSet<SuggestedAction> =
            considered.iter().map(|(_, truth)| *truth).collect();

        for label in truth_labels {
            let tp = considered
                .iter()
                .filter(|(pred, truth)| pred.predicted_action == label && *truth == label)
                .count() as f64;
            let fp = considered
                .iter()
                .filter(|(pred, truth)| pred.predicted_action == label && *truth != label)
                .count() as f64;
            let fn_ = considered
                .iter()
                .filter(|(pred, truth)| pred.predicted_action != label && *truth == label)
                .count() as f64;

            let precision = if tp + fp > 0.0 { tp / (tp + fp) } else { 0.0 };
            let recall = if tp + fn_ > 0.0 { tp / (tp + fn_) } else { 0.0 };
            let f1 = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };

            per_label.insert(
                label,
                LabelMetrics {
                    precision,
                    recall,
                    f1,
                    support: (tp + fn_) as usize,
                },
            );
        }

        let macro_f1 =
            per_label.values().map(|m| m.f1).sum::<f64>() / per_label.len() as f64;

        let report = SummarizerReport {
            considered: total,
            correct,
            accuracy: correct as f64 / total as f64,
            avg_confidence: total_confidence / total as f64,
            macro_f1,
            per_label,
        };

        info!(
            considered = report.considered,
            accuracy = report.accuracy,
            macro_f1 = report.macro_f1,
            "Summarizer evaluation complete"
        );

        Some(report)
    }

    /// Drop all recorded predictions and truths.
    pub fn reset(&mut self) {
        self.predictions.clear();
        self.truths.clear();
    }
}
