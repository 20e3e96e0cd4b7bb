//! CSV files as tables.

use csv::{ReaderBuilder, Trim, WriterBuilder};
use quarry_core::{CoreError, CoreResult};
use std::path::Path;
use tempfile::NamedTempFile;

use crate::store::TableStore;
use crate::table::Table;

/// Filesystem-backed store reading and writing delimited text
#[derive(Debug, Clone)]
pub struct CsvStore {
    /// Field delimiter
    delimiter: u8,
    /// Create missing parent directories on write
    create_dirs: bool,
}

impl CsvStore {
    /// Comma-delimited store
    #[must_use]
    pub fn new() -> Self {
        Self {
            delimiter: b',',
            create_dirs: true,
        }
    }

    /// Set the field delimiter
    #[must_use]
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Set whether missing parent directories are created on write
    #[must_use]
    pub fn with_create_dirs(mut self, create: bool) -> Self {
        self.create_dirs = create;
        self
    }
}

impl Default for CsvStore {
    fn default() -> Self {
        Self::new()
    }
}

fn read_error(path: &Path, reason: impl std::fmt::Display) -> CoreError {
    CoreError::Read {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

fn write_error(path: &Path, reason: impl std::fmt::Display) -> CoreError {
    CoreError::Write {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

impl TableStore for CsvStore {
    fn infer(&self, path: &Path) -> CoreResult<Table> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .delimiter(self.delimiter)
            .trim(Trim::All)
            .flexible(true)
            .from_path(path)
            .map_err(|e| read_error(path, e))?;

        let header: Vec<String> = reader
            .headers()
            .map_err(|e| read_error(path, e))?
            .iter()
            .map(str::to_string)
            .collect();
        let mut rows = Vec::new();
        for (i, record) in reader.records().enumerate() {
            let record = record.map_err(|e| read_error(path, e))?;
            if record.len() > header.len() {
                return Err(read_error(
                    path,
                    format!(
                        "row {} has {} cells but the header has {}",
                        i + 1,
                        record.len(),
                        header.len()
                    ),
                ));
            }
            rows.push(record.iter().map(str::to_string).collect::<Vec<_>>());
        }
        Table::from_text(&header, &rows).map_err(|e| read_error(path, e))
    }

    /// Rows are streamed to a temporary file beside `path`, which replaces
    /// `path` only once every row is written.
    fn write(&self, table: &Table, path: &Path) -> CoreResult<()> {
        let dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => {
                if self.create_dirs {
                    std::fs::create_dir_all(parent).map_err(|e| write_error(path, e))?;
                }
                parent
            }
            None => Path::new("."),
        };
        let temp = NamedTempFile::new_in(dir).map_err(|e| write_error(path, e))?;
        let mut writer = WriterBuilder::new()
            .delimiter(self.delimiter)
            .from_writer(temp);
        writer
            .write_record(table.header())
            .map_err(|e| write_error(path, e))?;
        for row in table.rows() {
            writer
                .write_record(row.values().iter().map(ToString::to_string))
                .map_err(|e| write_error(path, e))?;
        }
        let temp = writer
            .into_inner()
            .map_err(|e| write_error(path, e.error()))?;
        temp.persist(path).map_err(|e| write_error(path, e.error))?;
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn remove(&self, path: &Path) -> CoreResult<()> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(write_error(path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldType;
    use crate::value::Value;

    #[test]
    fn test_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("t.csv");
        let table = Table::from_text(
            &["ID", "NAME", "WHEN"],
            &[vec!["1", "ann", "2023-01-02"], vec!["2", "", "2023-01-03"]],
        )
        .unwrap();

        let store = CsvStore::new();
        store.write(&table, &path).unwrap();
        assert!(store.exists(&path));

        let back = store.infer(&path).unwrap();
        assert_eq!(back.header(), vec!["ID", "NAME", "WHEN"]);
        assert_eq!(back.schema().field("WHEN").unwrap().field_type, FieldType::Date);
        assert_eq!(back.read_rows()[1]["NAME"], Value::Null);
    }

    #[test]
    fn test_trims_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv");
        std::fs::write(&path, "A, B\n 1 , x \n").unwrap();
        let table = CsvStore::new().infer(&path).unwrap();
        assert_eq!(table.header(), vec!["A", "B"]);
        assert_eq!(table.read_rows()[0]["A"], Value::Integer(1));
        assert_eq!(table.read_rows()[0]["B"], Value::from("x"));
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = CsvStore::new().infer(Path::new("/definitely/not/here.csv")).unwrap_err();
        assert!(matches!(err, CoreError::Read { .. }));
    }

    #[test]
    fn test_remove_missing_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.csv");
        assert!(CsvStore::new().remove(&path).is_ok());
    }

    #[test]
    fn test_semicolon_delimiter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv");
        std::fs::write(&path, "A;B\n1;2\n").unwrap();
        let table = CsvStore::new().with_delimiter(b';').infer(&path).unwrap();
        assert_eq!(table.header(), vec!["A", "B"]);
    }

    #[test]
    fn test_overwrite_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv");
        std::fs::write(&path, "OLD\nstale\nstale\n").unwrap();

        let table = Table::from_text(&["A"], &[vec!["1"]]).unwrap();
        CsvStore::new().write(&table, &path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "A\n1\n");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_failed_write_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taken");
        std::fs::create_dir(&path).unwrap();

        let table = Table::from_text(&["A"], &[vec!["1"]]).unwrap();
        let err = CsvStore::new().write(&table, &path).unwrap_err();
        assert!(matches!(err, CoreError::Write { .. }));
        assert!(path.is_dir());
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("taken")]);
    }

    #[test]
    fn test_missing_parent_without_create_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent").join("t.csv");
        let table = Table::from_text(&["A"], &[vec!["1"]]).unwrap();
        let err = CsvStore::new()
            .with_create_dirs(false)
            .write(&table, &path)
            .unwrap_err();
        assert!(matches!(err, CoreError::Write { .. }));
        assert!(!dir.path().join("absent").exists());
    }
}
