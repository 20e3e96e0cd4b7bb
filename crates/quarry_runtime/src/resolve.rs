//! Cross-table resolution and forced materialization.
//!
//! A compare/overlap datasource is either a literal path or the id of
//! another node. Extract nodes contribute their raw table. Transform nodes
//! have their queued chain forced into a temp artifact, which is re-opened
//! so both sides of the operation are realized tables.

use quarry_core::{CoreError, CoreResult, NodeId, RunId};
use quarry_plan::{DataSourceRef, FileRef, NodeKind, OperationSpec, Pipeline};
use quarry_table::{Step, Table, TableStore};
use std::sync::Arc;
use tracing::debug;

use crate::artifact::{artifact_path, TempArtifact};
use crate::catalog::Generated;
use crate::config::{EngineConfig, MaterializeMode};
use crate::cross::{self, distinct_prefixes, prefix_fields};
use crate::engine::NodeState;

/// Open an extract node's file.
///
/// # Errors
///
/// Returns `Read` if the path does not end with the declared file name or
/// the store cannot open it
pub fn open_extract(store: &dyn TableStore, file: &FileRef) -> CoreResult<Table> {
    if !file.file_path.ends_with(&file.file_name) {
        return Err(CoreError::Read {
            path: file.file_path.clone(),
            reason: format!("invalid file path for '{}'", file.file_name),
        });
    }
    store.infer(file.path())
}

/// A resolved datasource: its table and its namespace label
struct Resolved {
    table: Table,
    label: String,
}

/// Resolves datasources against the engine's node arena
pub(crate) struct Resolver<'a> {
    pub(crate) pipeline: &'a Pipeline,
    pub(crate) arena: &'a mut indexmap::IndexMap<NodeId, NodeState>,
    pub(crate) store: &'a Arc<dyn TableStore>,
    pub(crate) config: &'a EngineConfig,
    pub(crate) run_id: RunId,
}

impl Resolver<'_> {
    /// Run a cross-table operation to a realized, artifact-backed table
    pub(crate) fn force(&mut self, op: &OperationSpec) -> CoreResult<Generated> {
        let mut artifacts = Vec::new();
        match op {
            OperationSpec::Compare {
                source_1,
                source_2,
                matching_columns,
                compare_columns,
            } => {
                let (first, second, (p1, p2)) = self.resolve_pair(source_1, source_2, &mut artifacts)?;
                let table = cross::compare(&first, &second, (&p1, &p2), matching_columns, compare_columns)?;
                self.materialize(&table, "compare", artifacts)
            }
            OperationSpec::Overlap { source_1, source_2 } => {
                let (first, second, _) = self.resolve_pair(source_1, source_2, &mut artifacts)?;
                let table = cross::overlap(&first, &second)?;
                self.materialize(&table, "overlap", artifacts)
            }
            other => Err(CoreError::invalid_operation(
                other.name(),
                "not a cross-table operation",
            )),
        }
    }

    fn resolve_pair(
        &mut self,
        source_1: &DataSourceRef,
        source_2: &DataSourceRef,
        artifacts: &mut Vec<TempArtifact>,
    ) -> CoreResult<(Table, Table, (String, String))> {
        let first = self.resolve(source_1, 1, artifacts)?;
        let second = self.resolve(source_2, 2, artifacts)?;
        let prefixes = distinct_prefixes(&first.label, &second.label);
        let first = prefix_fields(&first.table, &prefixes.0)?;
        let second = prefix_fields(&second.table, &prefixes.1)?;
        Ok((first, second, prefixes))
    }

    fn resolve(
        &mut self,
        reference: &DataSourceRef,
        position: usize,
        artifacts: &mut Vec<TempArtifact>,
    ) -> CoreResult<Resolved> {
        let unresolved = |reason: String| CoreError::CrossTableResolution {
            reference: reference.to_string(),
            reason,
        };

        let id = match reference {
            DataSourceRef::Path(path) => {
                let table = self
                    .store
                    .infer(std::path::Path::new(path))
                    .map_err(|e| unresolved(e.to_string()))?;
                return Ok(Resolved {
                    table,
                    label: format!("SRC{}", position),
                });
            }
            DataSourceRef::Node(id) => id,
        };

        let node = self
            .pipeline
            .node(id)
            .ok_or_else(|| unresolved("no node with this id".to_string()))?;
        let state = self
            .arena
            .get_mut(id.as_str())
            .ok_or_else(|| unresolved("node has no execution state".to_string()))?;
        let label = node.label().to_string();

        let table = match &node.kind {
            NodeKind::Extract { file } => match &state.table {
                Some(table) => table.clone(),
                None => {
                    let table = open_extract(self.store.as_ref(), file)
                        .map_err(|e| unresolved(e.to_string()))?;
                    state.table = Some(table.clone());
                    state.processed = true;
                    table
                }
            },
            NodeKind::Transform { .. } => {
                let source = state.table.clone().ok_or_else(|| {
                    unresolved("transform has no input table yet".to_string())
                })?;
                let mut steps = vec![Step::normalize()];
                match self.config.materialize {
                    MaterializeMode::FirstStep => steps.extend(state.pending_steps.first().cloned()),
                    MaterializeMode::FullChain => steps.extend(state.pending_steps.iter().cloned()),
                }
                debug!(node = %id, steps = steps.len(), "forcing materialization");
                let realized = source.apply(&steps)?;
                let role = format!("source{}", position);
                let artifact = TempArtifact::create(
                    Arc::clone(self.store),
                    &realized,
                    artifact_path(&self.config.temp_dir, &self.run_id, &role),
                )?;
                let table = artifact.open()?;
                artifacts.push(artifact);
                table
            }
            NodeKind::Load { .. } => {
                return Err(unresolved("a load node cannot be a datasource".to_string()));
            }
        };
        Ok(Resolved { table, label })
    }

    fn materialize(
        &self,
        table: &Table,
        role: &str,
        mut artifacts: Vec<TempArtifact>,
    ) -> CoreResult<Generated> {
        let artifact = TempArtifact::create(
            Arc::clone(self.store),
            table,
            artifact_path(&self.config.temp_dir, &self.run_id, role),
        )?;
        let table = artifact.open()?;
        artifacts.push(artifact);
        Ok(Generated::Forced { table, artifacts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_table::MemoryStore;

    #[test]
    fn test_open_extract_checks_file_name() {
        let store = MemoryStore::new()
            .with_table("data/gl.csv", Table::from_text(&["A"], &[vec!["1"]]).unwrap());
        let good = FileRef::new("data/gl.csv", "gl.csv");
        assert_eq!(open_extract(&store, &good).unwrap().row_count(), 1);

        let bad = FileRef::new("data/gl.csv", "tb.csv");
        match open_extract(&store, &bad) {
            Err(CoreError::Read { reason, .. }) => assert!(reason.contains("invalid file path")),
            other => panic!("unexpected {:?}", other),
        }
    }
}
