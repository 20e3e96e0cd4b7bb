//! Quarry Tables
//!
//! Typed in-memory tables, the declarative step vocabulary that transforms
//! them, and the stores they are read from and written to.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod aggregate;
pub mod csv_store;
pub mod join;
pub mod row;
pub mod schema;
pub mod step;
pub mod store;
pub mod table;
pub mod value;

// Re-exports
pub use aggregate::{Aggregation, Reducer};
pub use csv_store::CsvStore;
pub use join::JoinMode;
pub use row::{BoundFn, FieldFn, Record, Row, RowFn, RowPredicate};
pub use schema::{canonical_field_name, Field, FieldType, Schema};
pub use step::Step;
pub use store::{MemoryStore, StoreStats, TableStore};
pub use table::{infer_column_type, Table};
pub use value::Value;
