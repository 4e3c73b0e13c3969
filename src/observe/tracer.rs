//! Per-request tracing: a tree of named, timed spans per pipeline run.
//!
//! State machine per trace: `open → (span append)* → sealed`. Appending a
//! span to a sealed trace is a caller bug and always fails with
//! `TraceError::InvalidState`, never silently accepted.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::TraceError;

/// One timed, named unit of work inside a trace. Sealed on creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    /// Span name (stage name for pipeline spans).
    pub name: String,
    /// When the span started.
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration.
    pub duration: Duration,
    /// Scalar attributes attached at creation.
    pub attributes: serde_json::Map<String, Value>,
}

/// One end-to-end request. Spans are appended while the trace is open;
/// sealing computes the total duration and freezes the trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    /// Unique trace ID.
    pub trace_id: Uuid,
    /// Trace name (the operation being traced).
    pub name: String,
    /// Attributes attached at trace start.
    pub attributes: serde_json::Map<String, Value>,
    /// Ordered spans.
    pub spans: Vec<Span>,
    /// When the trace was opened.
    pub started_at: DateTime<Utc>,
    /// Sum of span durations; set when the trace is sealed.
    pub total_duration: Option<Duration>,
    /// Whether the trace has been sealed.
    pub sealed: bool,
}

/// In-memory trace store shared across concurrent pipeline invocations.
#[derive(Debug, Default)]
pub struct RequestTracer {
    traces: Mutex<HashMap<Uuid, Trace>>,
}

impl RequestTracer {
    /// Create an empty tracer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new trace and return its ID.
    pub fn start_trace(
        &self,
        name: impl Into<String>,
        attributes: serde_json::Map<String, Value>,
    ) -> Uuid {
        let trace_id = Uuid::new_v4();
        let trace = Trace {
            trace_id,
            name: name.into(),
            attributes,
            spans: Vec::new(),
            started_at: Utc::now(),
            total_duration: None,
            sealed: false,
        };

        debug!(trace_id = %trace_id, name = %trace.name, "Trace started");

        let Ok(mut traces) = self.traces.lock() else {
            warn!(trace_id = %trace_id, "Failed to acquire trace lock");
            return trace_id;
        };
        traces.insert(trace_id, trace);
        trace_id
    }

    /// Append a sealed span to an open trace. The duration is supplied
    /// directly (measure with `std::time::Instant` at the call site).
    pub fn add_span(
        &self,
        trace_id: Uuid,
        name: impl Into<String>,
        attributes: serde_json::Map<String, Value>,
        duration: Duration,
    ) -> Result<(), TraceError> {
        let Ok(mut traces) = self.traces.lock() else {
            warn!(trace_id = %trace_id, "Failed to acquire trace lock");
            return Err(TraceError::NotFound { trace_id });
        };

        let trace = traces
            .get_mut(&trace_id)
            .ok_or(TraceError::NotFound { trace_id })?;

        if trace.sealed {
            return Err(TraceError::InvalidState {
                trace_id,
                operation: "add_span".into(),
            });
        }

        let name = name.into();
        debug!(trace_id = %trace_id, span = %name, duration_ms = duration.as_millis() as u64, "Span added");

        trace.spans.push(Span {
            name,
            started_at: Utc::now()
                - chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero()),
            duration,
            attributes,
        });
        Ok(())
    }

    /// Seal a trace: compute the total duration as the sum of span durations
    /// and freeze it. Returns the sealed trace.
    pub fn end_trace(&self, trace_id: Uuid) -> Result<Trace, TraceError> {
        let Ok(mut traces) = self.traces.lock() else {
            warn!(trace_id = %trace_id, "Failed to acquire trace lock");
            return Err(TraceError::NotFound { trace_id });
        };

        let trace = traces
            .get_mut(&trace_id)
            .ok_or(TraceError::NotFound { trace_id })?;

        if trace.sealed {
            return Err(TraceError::InvalidState {
                trace_id,
                operation: "end_trace".into(),
            });
        }

        trace.total_duration = Some(
            trace
                .spans
                .iter()
                .map(|s| s.duration)
                .fold(Duration::ZERO, |acc, d| acc + d),
        );
        trace.sealed = true;

        debug!(
            trace_id = %trace_id,
            spans = trace.spans.len(),
            total_ms = trace.total_duration.unwrap_or_default().as_millis() as u64,
            "Trace sealed"
        );

        Ok(trace.clone())
    }

    /// Retrieve a trace by ID.
    pub fn get_trace(&self, trace_id: Uuid) -> Option<Trace> {
        let Ok(traces) = self.traces.lock() else {
            warn!(trace_id = %trace_id, "Failed to acquire trace lock");
            return None;
        };
        traces.get(&trace_id).cloned()
    }

    /// Snapshot of all stored traces, in no particular order.
    pub fn traces(&self) -> Vec<Trace> {
        let Ok(traces) = self.traces.lock() else {
            warn!("Failed to acquire trace lock");
            return Vec::new();
        };
        traces.values().cloned().collect()
    }

    /// Number of traces held in memory.
    pub fn len(&self) -> usize {
        self.traces.lock().map(|t| t.len()).unwrap_or(0)
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all stored traces.
    pub fn clear(&self) {
        if let Ok(mut traces) = self.traces.lock() {
            traces.clear();
        }
    }
}

/// Build a span/trace attribute map from `(key, scalar)` pairs.
pub fn attrs<I, K>(pairs: I) -> serde_json::Map<String, Value>
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}
