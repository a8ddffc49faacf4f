//! Telemetry adapter backed by the `tracing` ecosystem.

use serde_json::Value;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::models::{LogLevel, SpanStatus};
use crate::domain::ports::Telemetry;

/// Forwards the core's structured records to `tracing` macros.
///
/// Span lifecycle is reported as debug records rather than real tracing
/// spans: the core hands out opaque span ids across await points, which
/// does not map onto tracing's scoped guards.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetry;

impl TracingTelemetry {
    pub fn new() -> Self {
        Self
    }
}

impl Telemetry for TracingTelemetry {
    fn start_span(&self, name: &str, attributes: &Value) -> Uuid {
        let span_id = Uuid::new_v4();
        debug!(span = name, %span_id, %attributes, "span started");
        span_id
    }

    fn end_span(&self, span_id: Uuid, status: SpanStatus, error: Option<&str>) {
        match status {
            SpanStatus::Ok => debug!(%span_id, "span ended"),
            SpanStatus::Error => {
                warn!(%span_id, error = error.unwrap_or(""), "span ended with error")
            }
        }
    }

    fn record_metric(&self, name: &str, value: f64, tags: &Value) {
        debug!(metric = name, value, %tags, "metric");
    }

    fn log(&self, level: LogLevel, message: &str, context: &Value) {
        match level {
            LogLevel::Debug => debug!(%context, "{message}"),
            LogLevel::Info => info!(%context, "{message}"),
            LogLevel::Warn => warn!(%context, "{message}"),
            LogLevel::Error => error!(%context, "{message}"),
        }
    }
}
