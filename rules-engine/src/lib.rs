//! Governance rules engine.
//!
//! Holds validated policies keyed by name and evaluates cloud resources
//! against every policy targeting their type. Single resources evaluate
//! synchronously; batches fan out on the tokio blocking pool.

pub mod config;
mod engine;
pub mod loader;

pub use config::{load_from_env, ConfigError, EngineConfig};
pub use engine::{
    CompiledPolicy, EngineError, EvaluationResult, Registration, Resource, RulesEngine, Violation,
};
pub use loader::{LoadSummary, LoadedPolicy};
