//! inbox-triage: email triage pipeline core.
//!
//! A three-stage linear pipeline (fetch → summarize → act) driven by
//! injected capability interfaces, with process-wide metrics, per-request
//! tracing, and evaluators for scoring suggestions against ground truth.
//! OAuth, HTTP routing, and persistence belong to the hosting application.

pub mod config;
pub mod error;
pub mod eval;
pub mod fixture;
pub mod logging;
pub mod observe;
pub mod pipeline;
pub mod session;
