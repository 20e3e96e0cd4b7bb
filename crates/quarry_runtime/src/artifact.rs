//! Temporary artifacts created by forced materialization.
//!
//! Every artifact is owned by exactly one [`TempArtifact`] guard. The guard
//! is released explicitly during the engine's sweep; a guard dropped before
//! that deletes its file on a best-effort basis.

use quarry_core::{CoreResult, RunId};
use quarry_table::{Table, TableStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// File name prefix shared by every artifact of a run
#[must_use]
pub fn artifact_prefix(run_id: &RunId) -> String {
    format!("quarry_{}_", run_id.short())
}

/// Fresh artifact path: `<dir>/quarry_<run>_<unique>_<role>.csv`
#[must_use]
pub fn artifact_path(dir: &Path, run_id: &RunId, role: &str) -> PathBuf {
    let unique = Uuid::new_v4().simple().to_string();
    dir.join(format!("{}{}_{}.csv", artifact_prefix(run_id), &unique[..8], role))
}

/// Guard over one temporary table file
pub struct TempArtifact {
    path: PathBuf,
    store: Arc<dyn TableStore>,
    released: bool,
}

impl TempArtifact {
    /// Write `table` to `path` and take ownership of the file
    ///
    /// # Errors
    ///
    /// Returns `Write` if the store cannot write the table
    pub fn create(store: Arc<dyn TableStore>, table: &Table, path: PathBuf) -> CoreResult<Self> {
        store.write(table, &path)?;
        debug!(path = %path.display(), "temp artifact created");
        Ok(Self {
            path,
            store,
            released: false,
        })
    }

    /// Path of the artifact
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-open the artifact as a table
    ///
    /// # Errors
    ///
    /// Returns `Read` if the store cannot decode the file
    pub fn open(&self) -> CoreResult<Table> {
        self.store.infer(&self.path)
    }

    /// Whether the file has been confirmed gone
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Delete the file if it still exists. Returns whether it is gone.
    pub fn release(&mut self) -> bool {
        if self.released {
            return true;
        }
        if self.store.exists(&self.path) {
            if let Err(e) = self.store.remove(&self.path) {
                warn!(path = %self.path.display(), error = %e, "failed to remove temp artifact");
                return false;
            }
            debug!(path = %self.path.display(), "temp artifact removed");
        }
        self.released = true;
        true
    }
}

impl std::fmt::Debug for TempArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TempArtifact")
            .field("path", &self.path)
            .field("released", &self.released)
            .finish()
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        self.release();
    }
}
