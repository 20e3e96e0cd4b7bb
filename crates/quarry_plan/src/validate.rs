//! Pipeline graph validator.
//!
//! Checks run in a fixed order and stop at the first failure: connectivity,
//! then cycles, then (when enabled) the declared edge order.

use indexmap::IndexSet;
use quarry_core::{CoreError, CoreResult, NodeId};
use std::collections::BTreeSet;

use super::graph::{Edge, Pipeline};

/// Validator for pipeline graph properties
#[derive(Debug, Clone)]
pub struct Validator {
    /// Require every edge to be declared after the edges feeding its source
    pub require_ordered_edges: bool,
}

impl Validator {
    /// Create a new validator
    #[must_use]
    pub fn new() -> Self {
        Self {
            require_ordered_edges: false,
        }
    }

    /// Set whether declared edge order must be a valid execution order
    #[must_use]
    pub fn with_ordered_edges(mut self, require: bool) -> Self {
        self.require_ordered_edges = require;
        self
    }

    /// Validate a pipeline
    ///
    /// # Errors
    ///
    /// Returns `DisconnectedGraph`, `CycleDetected` or `UnorderedEdges`
    pub fn validate(&self, pipeline: &Pipeline) -> CoreResult<()> {
        self.check_connected(pipeline)?;
        self.check_cycles(pipeline)?;
        if self.require_ordered_edges {
            self.check_edge_order(pipeline)?;
        }
        Ok(())
    }

    /// Edge endpoints must be exactly the declared nodes
    fn check_connected(&self, pipeline: &Pipeline) -> CoreResult<()> {
        let mut touched: IndexSet<&str> = IndexSet::new();
        for edge in pipeline.edges() {
            touched.insert(edge.source.as_str());
            touched.insert(edge.target.as_str());
        }

        let undeclared: Vec<String> = touched
            .iter()
            .filter(|id| pipeline.node(id).is_none())
            .map(|id| id.to_string())
            .collect();
        let unconnected: Vec<String> = pipeline
            .nodes()
            .filter(|n| !touched.contains(n.id.as_str()))
            .map(|n| n.id.to_string())
            .collect();

        if undeclared.is_empty() && unconnected.is_empty() {
            Ok(())
        } else {
            Err(CoreError::DisconnectedGraph {
                undeclared,
                unconnected,
            })
        }
    }

    /// Check for cycles in the edge relation
    fn check_cycles(&self, pipeline: &Pipeline) -> CoreResult<()> {
        let mut visited = IndexSet::new();
        let mut rec_stack = IndexSet::new();

        for node in pipeline.nodes() {
            if let Some(at) = self.dfs_cycle(&node.id, pipeline, &mut visited, &mut rec_stack) {
                let start = rec_stack.get_index_of(at).unwrap_or(0);
                return Err(CoreError::CycleDetected {
                    nodes: rec_stack
                        .iter()
                        .skip(start)
                        .map(|id| id.to_string())
                        .collect(),
                });
            }
        }

        Ok(())
    }

    /// DFS cycle detection, returning the node closing the cycle
    fn dfs_cycle<'p>(
        &self,
        node_id: &'p NodeId,
        pipeline: &'p Pipeline,
        visited: &mut IndexSet<&'p NodeId>,
        rec_stack: &mut IndexSet<&'p NodeId>,
    ) -> Option<&'p NodeId> {
        if rec_stack.contains(node_id) {
            return Some(node_id);
        }
        if visited.contains(node_id) {
            return None;
        }

        visited.insert(node_id);
        rec_stack.insert(node_id);

        for next in pipeline.dependents(node_id.as_str()) {
            if let Some(at) = self.dfs_cycle(next, pipeline, visited, rec_stack) {
                return Some(at);
            }
        }

        rec_stack.shift_remove(node_id);
        None
    }

    /// Every edge feeding a node must be declared before any edge leaving it
    fn check_edge_order(&self, pipeline: &Pipeline) -> CoreResult<()> {
        let edges = pipeline.edges();
        for (i, edge) in edges.iter().enumerate() {
            if edges[i + 1..].iter().any(|later| later.target == edge.source) {
                return Err(CoreError::UnorderedEdges {
                    edge: edge.id.to_string(),
                    node: edge.source.to_string(),
                });
            }
        }
        Ok(())
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

/// Edges sorted into a valid execution order.
///
/// Nodes are ranked with Kahn's algorithm, ties broken by declaration order;
/// edges are then stably sorted by the rank of their source node.
///
/// # Errors
///
/// Returns `CycleDetected` if the graph is not acyclic
pub fn topological_edges(pipeline: &Pipeline) -> CoreResult<Vec<&Edge>> {
    let n = pipeline.node_count();
    let mut indegree = vec![0usize; n];
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); n];
    for edge in pipeline.edges() {
        let source = pipeline.node_index(edge.source.as_str());
        let target = pipeline.node_index(edge.target.as_str());
        if let (Some(s), Some(t)) = (source, target) {
            successors[s].push(t);
            indegree[t] += 1;
        }
    }

    let mut ready: BTreeSet<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
    let mut rank = vec![usize::MAX; n];
    let mut next_rank = 0;
    while let Some(i) = ready.pop_first() {
        rank[i] = next_rank;
        next_rank += 1;
        for &t in &successors[i] {
            indegree[t] -= 1;
            if indegree[t] == 0 {
                ready.insert(t);
            }
        }
    }

    if next_rank < n {
        let nodes = pipeline
            .nodes()
            .zip(&rank)
            .filter(|(_, r)| **r == usize::MAX)
            .map(|(node, _)| node.id.to_string())
            .collect();
        return Err(CoreError::CycleDetected { nodes });
    }

    let mut edges: Vec<&Edge> = pipeline.edges().iter().collect();
    edges.sort_by_key(|e| {
        pipeline
            .node_index(e.source.as_str())
            .map_or(usize::MAX, |i| rank[i])
    });
    Ok(edges)
}
