//! Port trait definitions (hexagonal architecture).
//!
//! These async trait interfaces are the only way the core touches the
//! outside world: the LLM backend, telemetry, the event log, the
//! checkpoint approver, and the toolchain. Adapters implement them;
//! the interpreter consumes them.

pub mod checkpoint;
pub mod event_store;
pub mod llm;
pub mod telemetry;
pub mod toolchain;

pub use checkpoint::{ApprovalDecision, CheckpointAdapter, CheckpointError};
pub use event_store::{EventStore, EventStoreError, InMemoryEventStore, Snapshot};
pub use llm::{estimate_tokens, LlmAdapter, LlmError, LlmRequest};
pub use telemetry::{NullTelemetry, Telemetry};
pub use toolchain::{SchemaReport, Toolchain, ToolchainError, TypeCheckReport};
