//! Observability: metrics accumulation and per-request tracing.

pub mod metrics;
pub mod tracer;

pub use metrics::{MetricsCollector, MetricsSnapshot, Stage, StageLatency};
pub use tracer::{RequestTracer, Span, Trace, attrs};
