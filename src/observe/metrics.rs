//! Process-wide metrics accumulation.
//!
//! The collector is an explicitly injected component, never a hidden
//! module-level singleton, so tests construct a fresh instance per case.
//! All counters only ever increase; `pending_approvals` is the one gauge
//! and is overwritten with a current value instead.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::pipeline::ActionStatus;

/// Pipeline stage, used as the latency-sample key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Fetch,
    Summarize,
    Act,
}

impl Stage {
    /// Metric key for this stage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Summarize => "summarize",
            Self::Act => "act",
        }
    }
}

/// Accumulated latency for one stage.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StageLatency {
    /// Number of samples recorded.
    pub samples: u64,
    /// Sum of sample durations in milliseconds.
    pub total_ms: u64,
    /// Mean sample duration in milliseconds.
    pub avg_ms: f64,
}

/// Immutable copy of collector state at one point in time. Each counter is
/// read atomically, so a snapshot never contains a torn value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub emails_processed: u64,
    pub summaries_generated: u64,
    pub summaries_dropped: u64,
    pub actions_executed: u64,
    pub actions_succeeded: u64,
    pub actions_failed: u64,
    pub actions_pending_total: u64,
    /// Gauge: pending approvals observed by the most recent run.
    pub pending_approvals: u64,
    /// Per-stage latency accumulators, keyed by stage name.
    pub stage_latency: BTreeMap<String, StageLatency>,
}

#[derive(Debug, Default)]
struct LatencyCell {
    samples: u64,
    total_ms: u64,
}

/// Counter/timer accumulator shared by every concurrent pipeline invocation
/// in the process. All `record_*` and `set_*` operations are fire-and-forget
/// and never fail the caller.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    emails_processed: AtomicU64,
    summaries_generated: AtomicU64,
    summaries_dropped: AtomicU64,
    actions_executed: AtomicU64,
    actions_succeeded: AtomicU64,
    actions_failed: AtomicU64,
    actions_pending_total: AtomicU64,
    pending_approvals: AtomicU64,
    stage_latency: Mutex<BTreeMap<&'static str, LatencyCell>>,
}

impl MetricsCollector {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record emails entering the pipeline.
    pub fn record_emails_processed(&self, count: usize) {
        self.emails_processed
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Record summaries produced for a batch, and how many inputs the oracle
    /// dropped. Dropped items are accounted explicitly, never silently lost.
    pub fn record_summaries(&self, generated: usize, dropped: usize) {
        self.summaries_generated
            .fetch_add(generated as u64, Ordering::Relaxed);
        self.summaries_dropped
            .fetch_add(dropped as u64, Ordering::Relaxed);
    }

    /// Record one action outcome.
    pub fn record_action_executed(&self, status: ActionStatus) {
        self.actions_executed.fetch_add(1, Ordering::Relaxed);
        match status {
            ActionStatus::Executed => {
                self.actions_succeeded.fetch_add(1, Ordering::Relaxed);
            }
            ActionStatus::Failed => {
                self.actions_failed.fetch_add(1, Ordering::Relaxed);
            }
            ActionStatus::PendingApproval => {
                self.actions_pending_total.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Overwrite the pending-approvals gauge with a current value.
    pub fn set_pending_approvals(&self, value: u64) {
        self.pending_approvals.store(value, Ordering::Relaxed);
    }

    /// Record one latency sample for a stage.
    pub fn record_stage_latency(&self, stage: Stage, duration: Duration) {
        let Ok(mut guard) = self.stage_latency.lock() else {
            warn!(stage = stage.as_str(), "Failed to acquire latency lock");
            return;
        };
        let cell = guard.entry(stage.as_str()).or_default();
        cell.samples += 1;
        cell.total_ms += duration.as_millis() as u64;
    }

    /// Take an immutable copy of current values.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let stage_latency = match self.stage_latency.lock() {
            Ok(guard) => guard
                .iter()
                .map(|(name, cell)| {
                    let avg_ms = if cell.samples > 0 {
                        cell.total_ms as f64 / cell.samples as f64
                    } else {
                        0.0
                    };
                    (
                        (*name).to_string(),
                        StageLatency {
                            samples: cell.samples,
                            total_ms: cell.total_ms,
                            avg_ms,
                        },
                    )
                })
                .collect(),
            Err(_) => {
                warn!("Failed to acquire latency lock for snapshot");
                BTreeMap::new()
            }
        };

        MetricsSnapshot {
            emails_processed: self.emails_processed.load(Ordering::Relaxed),
            summaries_generated: self.summaries_generated.load(Ordering::Relaxed),
            summaries_dropped: self.summaries_dropped.load(Ordering::Relaxed),
            actions_executed: self.actions_executed.load(Ordering::Relaxed),
            actions_succeeded: self.actions_succeeded.load(Ordering::Relaxed),
            actions_failed: self.actions_failed.load(Ordering::Relaxed),
            actions_pending_total: self.actions_pending_total.load(Ordering::Relaxed),
            pending_approvals: self.pending_approvals.load(Ordering::Relaxed),
            stage_latency,
        }
    }
}
