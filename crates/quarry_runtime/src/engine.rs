//! Execution engine for pipeline graphs.
//!
//! Runs a validated pipeline edge by edge. Extract sources are opened once,
//! transform steps accumulate lazily along linear chains, cross-table
//! operations are forced into temp artifacts, and each load applies the
//! queued chain and writes its target. Artifacts are swept after every load
//! and at teardown, on success and on failure.

use chrono::TimeDelta;
use indexmap::IndexMap;
use quarry_core::{format_elapsed, CoreError, CoreResult, NodeId, RunId, Timestamp};
use quarry_plan::{topological_edges, Edge, FileRef, Node, NodeKind, OperationSpec, Pipeline, Validator};
use quarry_table::{Step, Table, TableStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::artifact::TempArtifact;
use crate::audit::AuditTrail;
use crate::catalog::{generate_steps, Generated};
use crate::config::{EdgeOrder, EngineConfig};
use crate::resolve::{open_extract, Resolver};

/// Pipeline lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Node state reset, labels assigned
    Initiated,
    /// Graph checks running
    Validating,
    /// Edges being processed
    Running,
    /// Every edge processed
    Completed,
    /// Validation or execution failed
    Failed,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Initiated => "INITIATED",
            Self::Validating => "VALIDATING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Execution engine error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionError {
    /// The pipeline was rejected before any table I/O
    #[error("invalid pipeline: {0}")]
    Validation(CoreError),
    /// An operation or write failed mid-run
    #[error("error in processing pipeline: {cause}")]
    PipelineFailed {
        /// Underlying failure
        cause: CoreError,
    },
}

impl ExecutionError {
    /// Underlying error
    #[must_use]
    pub fn cause(&self) -> &CoreError {
        match self {
            Self::Validation(cause) | Self::PipelineFailed { cause } => cause,
        }
    }
}

/// Outcome of a successful run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Run identifier
    pub run_id: RunId,
    /// Terminal state
    pub state: PipelineState,
    /// Load targets written, in order
    pub outputs: Vec<PathBuf>,
    /// Wall clock duration
    pub elapsed: TimeDelta,
}

impl RunReport {
    /// One-line summary
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{} {}: {} output(s) in {}",
            self.run_id,
            self.state,
            self.outputs.len(),
            format_elapsed(self.elapsed)
        )
    }
}

/// Per-node execution state, owned by the engine
#[derive(Debug, Default)]
pub(crate) struct NodeState {
    pub(crate) label: String,
    pub(crate) processed: bool,
    pub(crate) table: Option<Table>,
    pub(crate) pending_steps: Vec<Step>,
    pub(crate) artifacts: Vec<TempArtifact>,
}

impl NodeState {
    fn for_node(node: &Node) -> Self {
        Self {
            label: node.label().to_string(),
            ..Self::default()
        }
    }

    fn accept(&mut self, generated: Generated, inherited: Option<(Vec<Step>, Option<Table>)>) {
        match generated {
            Generated::Steps(steps) => {
                if let Some((mut chain, table)) = inherited {
                    chain.extend(steps);
                    self.pending_steps = chain;
                    self.table = table;
                } else {
                    self.pending_steps = steps;
                }
            }
            Generated::Forced { table, artifacts } => {
                self.table = Some(table);
                self.pending_steps.clear();
                self.artifacts.extend(artifacts);
            }
        }
        self.processed = true;
    }
}

/// Execution engine for pipeline graphs
///
/// A pipeline must not be run by two engines at once; the engine owns all
/// per-node state for the duration of [`ExecutionEngine::run`].
pub struct ExecutionEngine {
    /// Table store for sources, targets and artifacts
    store: Arc<dyn TableStore>,
    /// Configuration
    config: EngineConfig,
    /// Current state
    state: PipelineState,
    /// Audit trail of the last run
    audit: AuditTrail,
    /// Node arena, indexed by id
    nodes: IndexMap<NodeId, NodeState>,
    /// Current run ID
    run_id: RunId,
}

impl ExecutionEngine {
    /// Create a new execution engine
    #[must_use]
    pub fn new(store: Arc<dyn TableStore>, config: EngineConfig) -> Self {
        Self {
            store,
            config,
            state: PipelineState::Initiated,
            audit: AuditTrail::new(),
            nodes: IndexMap::new(),
            run_id: RunId::new(),
        }
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Audit trail of the current or last run
    #[must_use]
    pub fn audit(&self) -> &AuditTrail {
        &self.audit
    }

    /// Current run ID
    #[must_use]
    pub const fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Configuration
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Validator matching the configured edge order
    #[must_use]
    pub fn validator(&self) -> Validator {
        Validator::new().with_ordered_edges(self.config.edge_order == EdgeOrder::Declared)
    }

    /// Validate without running
    ///
    /// # Errors
    ///
    /// Returns `DisconnectedGraph`, `CycleDetected` or `UnorderedEdges`
    pub fn validate(&self, pipeline: &Pipeline) -> CoreResult<()> {
        self.validator().validate(pipeline)
    }

    /// Run a pipeline to completion
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the graph is rejected (no table I/O is
    /// performed), or `PipelineFailed` with the first operation, read or
    /// write error
    pub fn run(&mut self, pipeline: &Pipeline) -> Result<RunReport, ExecutionError> {
        let started = Timestamp::now();
        self.initiate(pipeline);

        self.state = PipelineState::Validating;
        self.audit.record("Validating Pipeline");
        let edges = match self.validate(pipeline).and_then(|()| self.ordered_edges(pipeline)) {
            Ok(edges) => edges,
            Err(e) => {
                self.fail(&e);
                return Err(ExecutionError::Validation(e));
            }
        };
        self.audit.record("Pipeline Validated");

        self.state = PipelineState::Running;
        self.audit.record(format!("Total edges to process: {}", edges.len()));
        let mut outputs = Vec::new();
        let total = edges.len();
        let result = edges
            .iter()
            .enumerate()
            .try_for_each(|(i, edge)| self.process_edge(pipeline, edge, i + 1, total, &mut outputs));
        self.teardown();

        if let Err(cause) = result {
            self.fail(&cause);
            return Err(ExecutionError::PipelineFailed { cause });
        }

        let elapsed = Timestamp::now().duration_since(&started);
        self.audit
            .record(format!("{} | pipeline process completed", self.config.title));
        self.audit
            .record(format!("Time taken: {}", format_elapsed(elapsed)));
        self.state = PipelineState::Completed;
        Ok(RunReport {
            run_id: self.run_id,
            state: self.state,
            outputs,
            elapsed,
        })
    }

    /// Reset node state and start a fresh audit trail
    fn initiate(&mut self, pipeline: &Pipeline) {
        self.state = PipelineState::Initiated;
        self.run_id = RunId::new();
        self.audit.clear();
        self.nodes = pipeline
            .nodes()
            .map(|node| (node.id.clone(), NodeState::for_node(node)))
            .collect();
        self.audit
            .record(format!("{} | pipeline process initiated", self.config.title));
    }

    fn ordered_edges<'p>(&self, pipeline: &'p Pipeline) -> CoreResult<Vec<&'p Edge>> {
        match self.config.edge_order {
            EdgeOrder::Declared => Ok(pipeline.edges().iter().collect()),
            EdgeOrder::Topological => topological_edges(pipeline),
        }
    }

    fn fail(&mut self, error: &CoreError) {
        self.state = PipelineState::Failed;
        self.audit.record(format!("Error: {}", error));
        self.audit
            .record(format!("{} | pipeline process failed", self.config.title));
    }

    fn node_state(&mut self, id: &NodeId) -> CoreResult<&mut NodeState> {
        self.nodes.get_mut(id).ok_or_else(|| CoreError::NotFound {
            kind: "node".to_string(),
            id: id.to_string(),
        })
    }

    fn is_processed(&self, id: &NodeId) -> bool {
        self.nodes.get(id).is_some_and(|s| s.processed)
    }

    fn process_edge(
        &mut self,
        pipeline: &Pipeline,
        edge: &Edge,
        index: usize,
        total: usize,
        outputs: &mut Vec<PathBuf>,
    ) -> CoreResult<()> {
        let source = pipeline.require_node(edge.source.as_str())?;
        let target = pipeline.require_node(edge.target.as_str())?;
        self.audit.record(format!(
            "Processing edge, {} -> {} ({} of {})",
            source.label(),
            target.label(),
            index,
            total
        ));

        if !self.is_processed(&source.id) {
            match &source.kind {
                NodeKind::Extract { file } => self.open_source(source, file)?,
                NodeKind::Transform { operation } => {
                    let generated = self.generate(pipeline, source, operation)?;
                    self.node_state(&source.id)?.accept(generated, None);
                }
                NodeKind::Load { .. } => {}
            }
        }

        if !self.is_processed(&target.id) {
            match &target.kind {
                NodeKind::Transform { operation } => {
                    let generated = self.generate(pipeline, target, operation)?;
                    let upstream = self.node_state(&source.id)?;
                    let chain = match source.kind {
                        NodeKind::Transform { .. } => upstream.pending_steps.clone(),
                        _ => Vec::new(),
                    };
                    let inherited = Some((chain, upstream.table.clone()));
                    self.node_state(&target.id)?.accept(generated, inherited);
                }
                NodeKind::Load { file } => {
                    self.audit.record(target.to_string());
                    let written = self.load(source, file);
                    self.sweep();
                    written?;
                    self.audit.record(format!(
                        "Output file saved at {} ({})",
                        file.file_path, file.file_name
                    ));
                    outputs.push(file.path().to_path_buf());
                    self.node_state(&target.id)?.processed = true;
                }
                NodeKind::Extract { .. } => {}
            }
        }
        Ok(())
    }

    fn open_source(&mut self, node: &Node, file: &FileRef) -> CoreResult<()> {
        self.audit.record(node.to_string());
        let table = open_extract(self.store.as_ref(), file)?;
        let state = self.node_state(&node.id)?;
        state.table = Some(table);
        state.processed = true;
        self.audit.record("Pointer created for the source file");
        self.audit.record("Extract node process complete");
        Ok(())
    }

    fn generate(
        &mut self,
        pipeline: &Pipeline,
        node: &Node,
        operation: &OperationSpec,
    ) -> CoreResult<Generated> {
        self.audit.record(node.to_string());
        if operation.is_cross_table() {
            let mut resolver = Resolver {
                pipeline,
                arena: &mut self.nodes,
                store: &self.store,
                config: &self.config,
                run_id: self.run_id,
            };
            resolver.force(operation)
        } else {
            generate_steps(operation).map(Generated::Steps)
        }
    }

    /// Apply the source's queued chain after canonicalization and write it
    fn load(&mut self, source: &Node, file: &FileRef) -> CoreResult<()> {
        let state = self.nodes.get(&source.id).ok_or_else(|| CoreError::NotFound {
            kind: "node".to_string(),
            id: source.id.to_string(),
        })?;
        self.audit
            .record(format!("Applying {} steps", state.pending_steps.len()));
        let table = state.table.as_ref().ok_or_else(|| CoreError::NotFound {
            kind: "table for node".to_string(),
            id: source.id.to_string(),
        })?;
        let mut steps = vec![Step::normalize(), Step::fill_numeric_nulls()];
        steps.extend(state.pending_steps.iter().cloned());
        debug!(node = %source.id, steps = steps.len(), "applying chain");
        let output = table.apply(&steps)?;
        self.store.write(&output, file.path())
    }

    /// Release every artifact whose file still exists
    fn sweep(&mut self) {
        for (id, state) in &mut self.nodes {
            state.artifacts.retain_mut(|artifact| !artifact.release());
            if !state.artifacts.is_empty() {
                warn!(node = %id, label = %state.label, remaining = state.artifacts.len(), "artifacts left after sweep");
            }
        }
    }

    /// Final sweep; dropping the arena releases anything left
    fn teardown(&mut self) {
        self.sweep();
        self.nodes.clear();
    }
}
