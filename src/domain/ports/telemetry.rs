//! Telemetry port - spans, metrics, and structured logs.
//!
//! The interface is synchronous: emitting telemetry is never a suspension
//! point for the core loop. Backends that buffer or ship records elsewhere
//! do so behind this boundary.

use serde_json::Value;
use uuid::Uuid;

use crate::domain::models::{LogLevel, SpanStatus};

/// Trait for telemetry backends.
pub trait Telemetry: Send + Sync {
    /// Open a span and return its opaque id.
    fn start_span(&self, name: &str, attributes: &Value) -> Uuid;

    /// Close a span with its terminal status.
    fn end_span(&self, span_id: Uuid, status: SpanStatus, error: Option<&str>);

    /// Record a named metric sample.
    fn record_metric(&self, name: &str, value: f64, tags: &Value);

    /// Emit a structured log record.
    fn log(&self, level: LogLevel, message: &str, context: &Value);
}

/// Telemetry sink that drops everything. Useful as a default and in tests
/// that do not assert on observability output.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTelemetry;

impl Telemetry for NullTelemetry {
    fn start_span(&self, _name: &str, _attributes: &Value) -> Uuid {
        Uuid::new_v4()
    }

    fn end_span(&self, _span_id: Uuid, _status: SpanStatus, _error: Option<&str>) {}

    fn record_metric(&self, _name: &str, _value: f64, _tags: &Value) {}

    fn log(&self, _level: LogLevel, _message: &str, _context: &Value) {}
}
