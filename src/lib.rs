//! Turbine - autonomous generation orchestrator.
//!
//! A long-running control loop that drives an LLM agent through a
//! multi-phase workflow (requirements through verification), evaluates
//! objective signals of progress, and converges when the produced
//! artifacts clear measurable quality gates - or halts when a phase's
//! turn budget runs out.
//!
//! The crate is built functional-core / imperative-shell:
//!
//! - [`domain::decide`] and [`domain::evolve`] are the pure pair that
//!   choose effects and fold events into state.
//! - [`services::EffectInterpreter`] performs the effects against the
//!   adapter ports in [`domain::ports`].
//! - The event log ([`adapters::sqlite::SqliteEventStore`] in production)
//!   is canonical; state is always reconstructible by replay.
//! - [`services::Orchestrator`] ties the cycle together and supervises
//!   budgets, checkpoints, and convergence.

pub mod adapters;
pub mod domain;
pub mod services;

use std::sync::Arc;

use adapters::sqlite::SqliteEventStore;
use adapters::TracingTelemetry;
use domain::ports::{CheckpointAdapter, LlmAdapter, Toolchain};
use services::orchestrator::{Adapters, Orchestrator, RunOptions, RunOutcome};

pub use services::orchestrator::RunSummary;

/// Errors surfaced by the top-level [`run`] entry point.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    OpenStore(#[from] adapters::sqlite::OpenError),
    #[error(transparent)]
    Orchestrator(#[from] services::OrchestratorError),
}

/// Run a full session with the default SQLite event store and tracing
/// telemetry.
///
/// The LLM backend, checkpoint approver, and toolchain have no sensible
/// defaults and must be supplied. The event database lives at
/// `options.db_path`, falling back to `turbine.db` inside the work
/// directory; pointing two sessions at the same `work_dir` or database is
/// not supported.
pub async fn run(
    options: RunOptions,
    llm: Arc<dyn LlmAdapter>,
    checkpoint: Arc<dyn CheckpointAdapter>,
    toolchain: Arc<dyn Toolchain>,
) -> Result<RunOutcome, RunError> {
    let db_path = options
        .db_path
        .clone()
        .unwrap_or_else(|| options.work_dir.join("turbine.db"));
    let store = Arc::new(SqliteEventStore::open(&db_path).await?);

    let adapters = Adapters {
        llm,
        telemetry: Arc::new(TracingTelemetry::new()),
        store,
        checkpoint,
        toolchain,
    };

    let mut orchestrator = Orchestrator::new(options, adapters);
    Ok(orchestrator.run().await?)
}
