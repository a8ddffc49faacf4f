//! Infrastructure adapters implementing the domain ports.

pub mod mock;
pub mod sqlite;
pub mod telemetry;

pub use telemetry::TracingTelemetry;
