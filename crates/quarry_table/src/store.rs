//! Table storage backends.
//!
//! The engine only talks to a [`TableStore`]; [`CsvStore`](crate::CsvStore)
//! backs it with files and [`MemoryStore`] keeps everything in a map.

use quarry_core::{CoreError, CoreResult};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::table::Table;

/// Where tables are read from and written to
pub trait TableStore: Send + Sync {
    /// Open a table, discovering its columns and types
    ///
    /// # Errors
    ///
    /// Returns `Read` if the source cannot be opened or decoded
    fn infer(&self, path: &Path) -> CoreResult<Table>;

    /// Write a table, replacing anything at `path`
    ///
    /// # Errors
    ///
    /// Returns `Write` if the target cannot be written
    fn write(&self, table: &Table, path: &Path) -> CoreResult<()>;

    /// Whether something exists at `path`
    fn exists(&self, path: &Path) -> bool;

    /// Delete whatever is at `path`
    ///
    /// # Errors
    ///
    /// Returns `Write` if it exists and cannot be removed
    fn remove(&self, path: &Path) -> CoreResult<()>;
}

/// Store statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Successful reads
    pub read_count: u64,
    /// Successful writes
    pub write_count: u64,
    /// Successful removals
    pub remove_count: u64,
}

/// In-memory table store
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// Tables indexed by path
    tables: RwLock<HashMap<PathBuf, Table>>,
    /// Store statistics
    stats: RwLock<StoreStats>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a table at `path`
    #[must_use]
    pub fn with_table(self, path: impl Into<PathBuf>, table: Table) -> Self {
        if let Ok(mut tables) = self.tables.write() {
            tables.insert(path.into(), table);
        }
        self
    }

    /// Read back a table without counting it as a read
    #[must_use]
    pub fn get(&self, path: &Path) -> Option<Table> {
        self.tables.read().ok()?.get(path).cloned()
    }

    /// All stored paths, sorted
    #[must_use]
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .tables
            .read()
            .map(|t| t.keys().cloned().collect())
            .unwrap_or_default();
        paths.sort();
        paths
    }

    /// Current statistics
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        self.stats.read().map(|s| *s).unwrap_or_default()
    }

    fn bump(&self, f: impl FnOnce(&mut StoreStats)) {
        if let Ok(mut stats) = self.stats.write() {
            f(&mut stats);
        }
    }
}

impl TableStore for MemoryStore {
    fn infer(&self, path: &Path) -> CoreResult<Table> {
        let table = self.get(path).ok_or_else(|| CoreError::Read {
            path: path.display().to_string(),
            reason: "no such table".to_string(),
        })?;
        self.bump(|s| s.read_count += 1);
        Ok(table)
    }

    fn write(&self, table: &Table, path: &Path) -> CoreResult<()> {
        let mut tables = self.tables.write().map_err(|_| CoreError::Write {
            path: path.display().to_string(),
            reason: "store lock poisoned".to_string(),
        })?;
        tables.insert(path.to_path_buf(), table.copy());
        drop(tables);
        self.bump(|s| s.write_count += 1);
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.tables
            .read()
            .map(|t| t.contains_key(path))
            .unwrap_or(false)
    }

    fn remove(&self, path: &Path) -> CoreResult<()> {
        let mut tables = self.tables.write().map_err(|_| CoreError::Write {
            path: path.display().to_string(),
            reason: "store lock poisoned".to_string(),
        })?;
        if tables.remove(path).is_some() {
            drop(tables);
            self.bump(|s| s.remove_count += 1);
        }
        Ok(())
    }
}
