//! Quarry Core Types
//!
//! This crate contains pure types and logic with no I/O: the shared error
//! type, identifiers, the spreadsheet-style node labeler, row digests and
//! audit timestamps.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod hash;
pub mod id;
pub mod label;
pub mod time;

// Re-exports
pub use error::{CoreError, CoreResult};
pub use hash::Hash;
pub use id::{EdgeId, NodeId, RunId};
pub use label::node_label;
pub use time::{format_elapsed, Timestamp, AUDIT_TIME_FORMAT};
