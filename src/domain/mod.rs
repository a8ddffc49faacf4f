//! The functional core: models, ports, and the pure decide/evolve pair.

pub mod decider;
pub mod evolver;
pub mod models;
pub mod ports;
pub mod prompts;

pub use decider::decide;
pub use evolver::{evolve, replay, replay_until};
