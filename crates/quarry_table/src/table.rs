//! In-memory typed tables.

use quarry_core::{CoreError, CoreResult};
use std::sync::Arc;

use crate::row::{Record, Row};
use crate::schema::{Field, FieldType, Schema};
use crate::step::Step;
use crate::value::Value;

/// A typed table with immutable, shared row storage
///
/// Cloning is cheap and shares rows; every transformation builds new rows,
/// so two handles can never observe each other's changes.
#[derive(Debug, Clone, Default)]
pub struct Table {
    schema: Schema,
    rows: Arc<Vec<Vec<Value>>>,
}

impl Table {
    /// Create a table, checking that no row is wider than the schema
    ///
    /// # Errors
    ///
    /// Returns error if a row has more cells than the schema has fields
    pub fn new(schema: Schema, rows: Vec<Vec<Value>>) -> CoreResult<Self> {
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() > schema.len()) {
            return Err(CoreError::InvalidEncoding {
                reason: format!(
                    "row {} has {} cells but the schema has {} fields",
                    i,
                    row.len(),
                    schema.len()
                ),
            });
        }
        Ok(Self::from_parts(schema, rows))
    }

    /// Build a table from string columns and rows, typing each column by
    /// inference.
    ///
    /// # Errors
    ///
    /// Returns error if a row is wider than the header
    pub fn from_text<S: AsRef<str>>(header: &[S], rows: &[Vec<S>]) -> CoreResult<Self> {
        let columns: Vec<Vec<&str>> = (0..header.len())
            .map(|c| {
                rows.iter()
                    .map(|r| r.get(c).map_or("", |s| s.as_ref()))
                    .collect()
            })
            .collect();
        let fields: Vec<Field> = header
            .iter()
            .zip(&columns)
            .map(|(name, cells)| Field::new(name.as_ref(), infer_column_type(cells)))
            .collect();
        let mut typed = Vec::with_capacity(rows.len());
        for (ri, row) in rows.iter().enumerate() {
            if row.len() > header.len() {
                return Err(CoreError::InvalidEncoding {
                    reason: format!("row {} is wider than the header", ri),
                });
            }
            let values = fields
                .iter()
                .enumerate()
                .map(|(c, f)| {
                    let text = row.get(c).map_or("", |s| s.as_ref());
                    f.field_type.parse(text).unwrap_or_else(|_| Value::from(text))
                })
                .collect();
            typed.push(values);
        }
        Ok(Self::from_parts(Schema::new(fields), typed))
    }

    pub(crate) fn from_parts(schema: Schema, rows: Vec<Vec<Value>>) -> Self {
        Self {
            schema,
            rows: Arc::new(rows),
        }
    }

    pub(crate) fn with_schema(&self, schema: Schema) -> Self {
        Self {
            schema,
            rows: Arc::clone(&self.rows),
        }
    }

    /// Column names in order
    #[must_use]
    pub fn header(&self) -> Vec<String> {
        self.schema.names()
    }

    /// Schema
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Number of rows
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Iterate rows as borrowed views
    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.rows.iter().map(|values| Row::new(&self.schema, values))
    }

    pub(crate) fn row_values(&self, index: usize) -> &[Value] {
        self.rows.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Materialize all rows as ordered maps
    #[must_use]
    pub fn read_rows(&self) -> Vec<Record> {
        self.rows().map(|r| r.to_record()).collect()
    }

    /// All values of one column
    ///
    /// # Errors
    ///
    /// Returns `ColumnNotFound` if the column does not exist
    pub fn column(&self, name: &str) -> CoreResult<Vec<Value>> {
        let i = self.schema.require(name)?;
        Ok(self.rows().map(|r| r.at(i).clone()).collect())
    }

    /// Apply steps in order, producing a new table
    ///
    /// # Errors
    ///
    /// Returns the first step failure
    pub fn apply(&self, steps: &[Step]) -> CoreResult<Table> {
        let mut current = self.clone();
        for step in steps {
            current = step.apply_to(&current)?;
        }
        Ok(current)
    }

    /// Deep copy with its own row storage
    #[must_use]
    pub fn copy(&self) -> Table {
        Self::from_parts(self.schema.clone(), self.rows.as_ref().clone())
    }
}

/// Narrowest type accepting every non-empty cell of a text column
#[must_use]
pub fn infer_column_type(cells: &[&str]) -> FieldType {
    let present: Vec<&str> = cells
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .collect();
    if present.is_empty() {
        return FieldType::String;
    }
    FieldType::INFERENCE_ORDER
        .into_iter()
        .find(|t| present.iter().all(|c| t.parse(c).is_ok()))
        .unwrap_or(FieldType::String)
}
