//! Row views and row functions.

use indexmap::IndexMap;
use quarry_core::{CoreError, CoreResult};
use std::sync::Arc;

use crate::schema::Schema;
use crate::value::Value;

/// A row materialized as an ordered map of column name to value
pub type Record = IndexMap<String, Value>;

/// Borrowed view of one row against its schema
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    schema: &'a Schema,
    values: &'a [Value],
}

impl<'a> Row<'a> {
    /// Create a row view
    #[must_use]
    pub fn new(schema: &'a Schema, values: &'a [Value]) -> Self {
        Self { schema, values }
    }

    /// Value of a column, if present
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&'a Value> {
        self.schema.index_of(name).and_then(|i| self.values.get(i))
    }

    /// Value of a column
    ///
    /// # Errors
    ///
    /// Returns `ColumnNotFound` if the schema lacks the column
    pub fn value(&self, name: &str) -> CoreResult<&'a Value> {
        self.get(name).ok_or_else(|| CoreError::ColumnNotFound {
            column: name.to_string(),
        })
    }

    /// Value at a position; short rows read as null
    #[must_use]
    pub fn at(&self, index: usize) -> &'a Value {
        const NULL: &Value = &Value::Null;
        self.values.get(index).unwrap_or(NULL)
    }

    /// All values in schema order
    #[must_use]
    pub fn values(&self) -> &'a [Value] {
        self.values
    }

    /// Schema this row is read against
    #[must_use]
    pub fn schema(&self) -> &'a Schema {
        self.schema
    }

    /// Copy into an ordered map
    #[must_use]
    pub fn to_record(&self) -> Record {
        self.schema
            .fields()
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.clone(), self.at(i).clone()))
            .collect()
    }
}

/// A row function bound to a concrete schema
pub type BoundFn<T> = Box<dyn FnMut(&Row<'_>) -> CoreResult<T>>;

type Binder<T> = dyn Fn(&Schema) -> CoreResult<BoundFn<T>> + Send + Sync;

/// A per-row computation, bound against the incoming schema when a step runs.
///
/// Binding happens once per application, so a bound function may keep state
/// across rows (for example a set of already-seen digests) and may resolve
/// column positions or declared types up front.
pub struct RowFn<T>(Arc<Binder<T>>);

/// Computes a new cell
pub type FieldFn = RowFn<Value>;

/// Decides whether a row is kept
pub type RowPredicate = RowFn<bool>;

impl<T: 'static> RowFn<T> {
    /// Stateless function of the row
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Row<'_>) -> CoreResult<T> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Self(Arc::new(move |_schema: &Schema| {
            let f = Arc::clone(&f);
            Ok(Box::new(move |row: &Row<'_>| f(row)) as BoundFn<T>)
        }))
    }

    /// Function built from the schema at apply time
    pub fn with_schema<F>(bind: F) -> Self
    where
        F: Fn(&Schema) -> CoreResult<BoundFn<T>> + Send + Sync + 'static,
    {
        Self(Arc::new(bind))
    }

    /// Bind against a schema
    ///
    /// # Errors
    ///
    /// Returns whatever the binder reports, typically `ColumnNotFound`
    pub fn bind(&self, schema: &Schema) -> CoreResult<BoundFn<T>> {
        (self.0)(schema)
    }
}

impl<T> Clone for RowFn<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> std::fmt::Debug for RowFn<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RowFn(..)")
    }
}
