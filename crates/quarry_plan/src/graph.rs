//! Pipeline graph: nodes, edges and the pipeline that owns them.

use indexmap::IndexMap;
use quarry_core::{node_label, CoreError, CoreResult, EdgeId, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use crate::operation::OperationSpec;

/// File location of an Extract source or Load sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    /// Full path of the file
    pub file_path: String,
    /// File name, the last component of `file_path` for extracts
    pub file_name: String,
}

impl FileRef {
    /// Create a new file reference
    #[must_use]
    pub fn new(file_path: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            file_name: file_name.into(),
        }
    }

    /// Path as a `Path`
    #[must_use]
    pub fn path(&self) -> &Path {
        Path::new(&self.file_path)
    }

    fn validate(&self, kind: &str) -> CoreResult<()> {
        if self.file_path.trim().is_empty() || self.file_name.trim().is_empty() {
            return Err(CoreError::invalid_operation(
                kind,
                "file_path and file_name are required",
            ));
        }
        Ok(())
    }
}

/// What a node does
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    /// Opens a table from a file
    Extract {
        /// Source file
        file: FileRef,
    },
    /// Transforms its incoming table
    Transform {
        /// Operation and parameters
        operation: OperationSpec,
    },
    /// Writes its incoming table to a file
    Load {
        /// Target file
        file: FileRef,
    },
}

impl NodeKind {
    /// Kind name
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Extract { .. } => "extract",
            Self::Transform { .. } => "transform",
            Self::Load { .. } => "load",
        }
    }
}

/// A pipeline node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique id
    pub id: NodeId,
    /// Kind and parameters
    #[serde(flatten)]
    pub kind: NodeKind,
    /// Label assigned by the pipeline
    #[serde(skip)]
    label: String,
}

impl Node {
    /// Extract node
    #[must_use]
    pub fn extract(id: impl Into<String>, file_path: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self::with_kind(
            id,
            NodeKind::Extract {
                file: FileRef::new(file_path, file_name),
            },
        )
    }

    /// Transform node
    ///
    /// # Errors
    ///
    /// Returns error if the operation parameters are invalid
    pub fn transform(id: impl Into<String>, operation: OperationSpec) -> CoreResult<Self> {
        operation.validate()?;
        Ok(Self::with_kind(id, NodeKind::Transform { operation }))
    }

    /// Load node
    #[must_use]
    pub fn load(id: impl Into<String>, file_path: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self::with_kind(
            id,
            NodeKind::Load {
                file: FileRef::new(file_path, file_name),
            },
        )
    }

    fn with_kind(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: NodeId::new(id),
            kind,
            label: String::new(),
        }
    }

    /// Label, empty until the node joins a pipeline
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Operation, for transform nodes
    #[must_use]
    pub fn operation(&self) -> Option<&OperationSpec> {
        match &self.kind {
            NodeKind::Transform { operation } => Some(operation),
            _ => None,
        }
    }

    /// Check kind-specific parameters
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperationSpec` or `Formula`
    pub fn validate(&self) -> CoreResult<()> {
        match &self.kind {
            NodeKind::Extract { file } | NodeKind::Load { file } => file.validate(self.kind.name()),
            NodeKind::Transform { operation } => operation.validate(),
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            NodeKind::Extract { file } => write!(f, "Extract: {} ({})", file.file_path, file.file_name),
            NodeKind::Transform { operation } => write!(f, "Transform: {}", operation),
            NodeKind::Load { file } => write!(f, "Load: {}", file.file_path),
        }
    }
}

/// Directed edge between two nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// Unique id
    pub id: EdgeId,
    /// Upstream node
    pub source: NodeId,
    /// Downstream node
    pub target: NodeId,
}

impl Edge {
    /// Create a new edge
    #[must_use]
    pub fn new(id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: EdgeId::new(id),
            source: NodeId::new(source),
            target: NodeId::new(target),
        }
    }
}

/// Wire form of a pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PipelineDef {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

/// A set of nodes and the edges between them
///
/// Construction checks ids and node parameters and assigns labels; graph
/// shape is checked separately by [`Validator`](crate::Validator).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PipelineDef", into = "PipelineDef")]
pub struct Pipeline {
    nodes: IndexMap<NodeId, Node>,
    edges: Vec<Edge>,
}

impl Pipeline {
    /// Build a pipeline
    ///
    /// # Errors
    ///
    /// Returns `AlreadyExists` on a duplicate node or edge id, or the
    /// first node parameter error
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> CoreResult<Self> {
        let mut by_id = IndexMap::with_capacity(nodes.len());
        for (index, mut node) in nodes.into_iter().enumerate() {
            node.validate()?;
            node.label = node_label(index);
            if by_id.contains_key(&node.id) {
                return Err(CoreError::AlreadyExists {
                    kind: "Node".to_string(),
                    id: node.id.to_string(),
                });
            }
            by_id.insert(node.id.clone(), node);
        }
        let mut seen = HashSet::with_capacity(edges.len());
        for edge in &edges {
            if !seen.insert(&edge.id) {
                return Err(CoreError::AlreadyExists {
                    kind: "Edge".to_string(),
                    id: edge.id.to_string(),
                });
            }
        }
        Ok(Self { nodes: by_id, edges })
    }

    /// Parse from JSON
    ///
    /// # Errors
    ///
    /// Returns `InvalidEncoding` on malformed JSON, or any construction error
    pub fn from_json(json: &str) -> CoreResult<Self> {
        let def: PipelineDef = serde_json::from_str(json)?;
        Self::try_from(def)
    }

    /// Read a JSON pipeline file
    ///
    /// # Errors
    ///
    /// Returns `Read` if the file cannot be read, otherwise as [`Self::from_json`]
    pub fn from_file(path: &Path) -> CoreResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| CoreError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json(&json)
    }

    /// Serialize to pretty JSON
    ///
    /// # Errors
    ///
    /// Returns `InvalidEncoding` if serialization fails
    pub fn to_json(&self) -> CoreResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Nodes in declaration order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Look up a node
    #[must_use]
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Look up a node or fail with `NotFound`
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no node has this id
    pub fn require_node(&self, id: &str) -> CoreResult<&Node> {
        self.node(id).ok_or_else(|| CoreError::NotFound {
            kind: "Node".to_string(),
            id: id.to_string(),
        })
    }

    /// Position of a node in declaration order
    #[must_use]
    pub fn node_index(&self, id: &str) -> Option<usize> {
        self.nodes.get_index_of(id)
    }

    /// Edges in declaration order
    #[must_use]
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Number of nodes
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of edges
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Targets of edges leaving `id`, in edge order
    #[must_use]
    pub fn dependents(&self, id: &str) -> Vec<&NodeId> {
        self.edges
            .iter()
            .filter(|e| e.source.as_str() == id)
            .map(|e| &e.target)
            .collect()
    }

    /// Sources of edges entering `id`, in edge order
    #[must_use]
    pub fn dependencies(&self, id: &str) -> Vec<&NodeId> {
        self.edges
            .iter()
            .filter(|e| e.target.as_str() == id)
            .map(|e| &e.source)
            .collect()
    }
}

impl TryFrom<PipelineDef> for Pipeline {
    type Error = CoreError;

    fn try_from(def: PipelineDef) -> CoreResult<Self> {
        Self::new(def.nodes, def.edges)
    }
}

impl From<Pipeline> for PipelineDef {
    fn from(pipeline: Pipeline) -> Self {
        Self {
            nodes: pipeline.nodes.into_values().collect(),
            edges: pipeline.edges,
        }
    }
}
