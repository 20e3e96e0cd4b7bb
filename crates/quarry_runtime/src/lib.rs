//! Quarry Runtime
//!
//! Executes validated pipelines edge by edge: opens extract sources, turns
//! transform operations into table steps, forces materialization for the
//! cross-table operations, writes load targets, and cleans up every
//! temporary artifact it created.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod artifact;
pub mod audit;
pub mod catalog;
pub mod config;
pub mod cross;
pub mod engine;
pub mod resolve;

// Re-exports
pub use artifact::{artifact_path, artifact_prefix, TempArtifact};
pub use audit::{AuditEntry, AuditTrail};
pub use catalog::{generate_steps, Generated};
pub use config::{EdgeOrder, EngineConfig, MaterializeMode};
pub use engine::{ExecutionEngine, ExecutionError, PipelineState, RunReport};
