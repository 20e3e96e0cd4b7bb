//! Quarry Pipeline Plans
//!
//! The pipeline graph (extract, transform and load nodes joined by edges),
//! the operation vocabulary carried by transform nodes, the arithmetic
//! formula language, and the graph validator.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod formula;
pub mod graph;
pub mod operation;
pub mod validate;

// Re-exports
pub use formula::{BinaryOp, Expr, Formula};
pub use graph::{Edge, FileRef, Node, NodeKind, Pipeline};
pub use operation::{
    parse_date_param, parse_time_param, BackdatingReference, DataSourceRef, FilterOperator,
    GroupAggregate, OperationSpec, WEEKDAY_NAMES,
};
pub use validate::{topological_edges, Validator};
