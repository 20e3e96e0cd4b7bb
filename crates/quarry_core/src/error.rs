//! Core error types for Quarry.

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error type
///
/// Shared by every crate in the workspace so that a failure raised deep in a
/// table step surfaces unchanged through the engine to the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// Edge endpoints and declared nodes disagree
    #[error(
        "Disconnected graph: undeclared nodes {undeclared:?}, nodes without edges {unconnected:?}"
    )]
    DisconnectedGraph {
        /// Ids referenced by an edge but never declared
        undeclared: Vec<String>,
        /// Declared ids that no edge touches
        unconnected: Vec<String>,
    },

    /// The edge relation contains a cycle
    #[error("Cycle detected involving nodes: {nodes:?}")]
    CycleDetected {
        /// Nodes on the recursion stack when the back-edge was found
        nodes: Vec<String>,
    },

    /// Missing or incompatible parameters for an operation
    #[error("Invalid {operation} operation: {reason}")]
    InvalidOperationSpec {
        /// Operation kind
        operation: String,
        /// What is wrong
        reason: String,
    },

    /// A value could not be converted or compared
    #[error("Type error on {column}: {reason}")]
    TypeCoercion {
        /// Column being processed
        column: String,
        /// What is wrong
        reason: String,
    },

    /// Unparsable, unbound or failing formula
    #[error("Formula error: {reason}")]
    Formula {
        /// What is wrong
        reason: String,
    },

    /// A compare/overlap datasource reference cannot be resolved
    #[error("Cannot resolve datasource {reference}: {reason}")]
    CrossTableResolution {
        /// The path or node id as written
        reference: String,
        /// What is wrong
        reason: String,
    },

    /// A sink or artifact cannot be written or removed
    #[error("Cannot write {path}: {reason}")]
    Write {
        /// Target path
        path: String,
        /// Underlying cause
        reason: String,
    },

    /// A source cannot be opened or decoded
    #[error("Cannot read {path}: {reason}")]
    Read {
        /// Source path
        path: String,
        /// Underlying cause
        reason: String,
    },

    /// Column missing from a table schema
    #[error("Column not found: {column}")]
    ColumnNotFound {
        /// Requested column
        column: String,
    },

    /// Not found
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Entity kind
        kind: String,
        /// Entity id
        id: String,
    },

    /// Already exists
    #[error("{kind} already exists: {id}")]
    AlreadyExists {
        /// Entity kind
        kind: String,
        /// Entity id
        id: String,
    },

    /// An edge is declared before the edges that feed its source node
    #[error("Edge {edge} is declared before an edge feeding its source node {node}")]
    UnorderedEdges {
        /// Offending edge id
        edge: String,
        /// Its source node id
        node: String,
    },

    /// Invalid encoding
    #[error("Invalid encoding: {reason}")]
    InvalidEncoding {
        /// Decoder message
        reason: String,
    },
}

impl CoreError {
    /// Shorthand for an operation parameter error
    #[must_use]
    pub fn invalid_operation(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidOperationSpec {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a type error on a column
    #[must_use]
    pub fn type_coercion(column: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TypeCoercion {
            column: column.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a formula error
    #[must_use]
    pub fn formula(reason: impl Into<String>) -> Self {
        Self::Formula {
            reason: reason.into(),
        }
    }

    /// Whether this error is raised by graph validation, before any I/O
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::DisconnectedGraph { .. } | Self::CycleDetected { .. } | Self::UnorderedEdges { .. }
        )
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidEncoding {
            reason: err.to_string(),
        }
    }
}
