//! Declarative table steps.
//!
//! A step describes one transformation; [`Table::apply`] runs a list of them
//! and returns a new table, leaving the input untouched.

use indexmap::IndexMap;
use quarry_core::{CoreError, CoreResult};

use crate::aggregate::{aggregate, Aggregation};
use crate::join::{join, JoinMode};
use crate::row::{FieldFn, RowPredicate};
use crate::schema::{Field, FieldType, Schema};
use crate::table::Table;
use crate::value::Value;

/// One table transformation
#[derive(Debug, Clone)]
pub enum Step {
    /// Append (or replace) a computed column
    AddField {
        /// Column name
        name: String,
        /// Cell function
        compute: FieldFn,
        /// Declared type; inferred from the computed cells when absent
        field_type: Option<FieldType>,
    },
    /// Drop columns; unknown names are ignored
    RemoveFields {
        /// Columns to drop
        names: Vec<String>,
    },
    /// Keep only these columns, in schema order; unknown names are ignored
    FilterFields {
        /// Columns to keep
        names: Vec<String>,
    },
    /// Keep rows for which the predicate holds
    FilterRows {
        /// Row predicate
        predicate: RowPredicate,
    },
    /// Keep the first `head` rows
    SliceRows {
        /// Row count
        head: usize,
    },
    /// Coerce every cell to its declared type and square up ragged rows
    Normalize,
    /// Replace nulls in numeric columns with zero
    FillNumericNulls,
    /// Rename columns; unknown names are ignored
    RenameFields {
        /// Old name to new name
        mapping: IndexMap<String, String>,
    },
    /// Grouped aggregate
    Aggregate {
        /// Key columns; empty means a single group
        group_key: Vec<String>,
        /// Output column name to aggregation
        aggregations: IndexMap<String, Aggregation>,
    },
    /// Join with another table
    Join {
        /// Right-hand table
        other: Table,
        /// Pairing mode
        mode: JoinMode,
        /// Key columns of this table
        left_keys: Vec<String>,
        /// Key columns of `other`
        right_keys: Vec<String>,
    },
}

impl Step {
    /// Computed column with an inferred type
    #[must_use]
    pub fn add_field(name: impl Into<String>, compute: FieldFn) -> Self {
        Self::AddField {
            name: name.into(),
            compute,
            field_type: None,
        }
    }

    /// Computed column with a declared type
    #[must_use]
    pub fn add_typed_field(name: impl Into<String>, field_type: FieldType, compute: FieldFn) -> Self {
        Self::AddField {
            name: name.into(),
            compute,
            field_type: Some(field_type),
        }
    }

    /// Drop columns
    #[must_use]
    pub fn remove_fields<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        Self::RemoveFields {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Project columns
    #[must_use]
    pub fn filter_fields<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        Self::FilterFields {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Filter rows
    #[must_use]
    pub fn filter_rows(predicate: RowPredicate) -> Self {
        Self::FilterRows { predicate }
    }

    /// Head slice
    #[must_use]
    pub fn slice_rows(head: usize) -> Self {
        Self::SliceRows { head }
    }

    /// Type normalization
    #[must_use]
    pub fn normalize() -> Self {
        Self::Normalize
    }

    /// Numeric null filling
    #[must_use]
    pub fn fill_numeric_nulls() -> Self {
        Self::FillNumericNulls
    }

    /// Column renaming
    #[must_use]
    pub fn rename_fields(mapping: IndexMap<String, String>) -> Self {
        Self::RenameFields { mapping }
    }

    /// Grouped aggregate
    #[must_use]
    pub fn aggregate(group_key: Vec<String>, aggregations: IndexMap<String, Aggregation>) -> Self {
        Self::Aggregate {
            group_key,
            aggregations,
        }
    }

    /// Join
    #[must_use]
    pub fn join(other: Table, mode: JoinMode, left_keys: Vec<String>, right_keys: Vec<String>) -> Self {
        Self::Join {
            other,
            mode,
            left_keys,
            right_keys,
        }
    }

    /// Short name, for logging
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AddField { .. } => "add_field",
            Self::RemoveFields { .. } => "remove_fields",
            Self::FilterFields { .. } => "filter_fields",
            Self::FilterRows { .. } => "filter_rows",
            Self::SliceRows { .. } => "slice_rows",
            Self::Normalize => "normalize",
            Self::FillNumericNulls => "fill_numeric_nulls",
            Self::RenameFields { .. } => "rename_fields",
            Self::Aggregate { .. } => "aggregate",
            Self::Join { .. } => "join",
        }
    }

    /// Run this step against a table
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a row function, a missing column,
    /// or a value that does not fit its declared type
    pub fn apply_to(&self, table: &Table) -> CoreResult<Table> {
        match self {
            Self::AddField {
                name,
                compute,
                field_type,
            } => add_field(table, name, compute, *field_type),
            Self::RemoveFields { names } => {
                let keep: Vec<usize> = (0..table.schema().len())
                    .filter(|&i| !names.contains(&table.schema().fields()[i].name))
                    .collect();
                Ok(project(table, &keep))
            }
            Self::FilterFields { names } => {
                let keep: Vec<usize> = (0..table.schema().len())
                    .filter(|&i| names.contains(&table.schema().fields()[i].name))
                    .collect();
                Ok(project(table, &keep))
            }
            Self::FilterRows { predicate } => {
                let mut keep = predicate.bind(table.schema())?;
                let mut rows = Vec::new();
                for row in table.rows() {
                    if keep(&row)? {
                        rows.push(row.values().to_vec());
                    }
                }
                Ok(Table::from_parts(table.schema().clone(), rows))
            }
            Self::SliceRows { head } => {
                let rows = table.rows().take(*head).map(|r| r.values().to_vec()).collect();
                Ok(Table::from_parts(table.schema().clone(), rows))
            }
            Self::Normalize => normalize(table),
            Self::FillNumericNulls => Ok(fill_numeric_nulls(table)),
            Self::RenameFields { mapping } => {
                let mut schema = table.schema().clone();
                for field in schema.fields_mut() {
                    if let Some(new_name) = mapping.get(&field.name) {
                        field.name = new_name.clone();
                    }
                }
                Ok(table.with_schema(schema))
            }
            Self::Aggregate {
                group_key,
                aggregations,
            } => aggregate(table, group_key, aggregations),
            Self::Join {
                other,
                mode,
                left_keys,
                right_keys,
            } => join(table, other, *mode, left_keys, right_keys),
        }
    }
}

fn add_field(
    table: &Table,
    name: &str,
    compute: &FieldFn,
    field_type: Option<FieldType>,
) -> CoreResult<Table> {
    let schema = table.schema();
    let mut f = compute.bind(schema)?;
    let mut cells = Vec::with_capacity(table.row_count());
    for row in table.rows() {
        cells.push(f(&row)?);
    }
    let field_type = field_type.unwrap_or_else(|| match FieldType::infer_from(&cells) {
        FieldType::Any => FieldType::String,
        t => t,
    });

    let width = schema.len();
    let existing = schema.index_of(name);
    let mut out_schema = schema.clone();
    match existing {
        Some(i) => out_schema.fields_mut()[i].field_type = field_type,
        None => out_schema.push(Field::new(name, field_type)),
    }
    let rows = table
        .rows()
        .zip(cells)
        .map(|(row, cell)| {
            let mut values = row.values().to_vec();
            values.resize(width, Value::Null);
            match existing {
                Some(i) => values[i] = cell,
                None => values.push(cell),
            }
            values
        })
        .collect();
    Ok(Table::from_parts(out_schema, rows))
}

fn project(table: &Table, keep: &[usize]) -> Table {
    let fields = keep
        .iter()
        .map(|&i| table.schema().fields()[i].clone())
        .collect();
    let rows = table
        .rows()
        .map(|row| keep.iter().map(|&i| row.at(i).clone()).collect())
        .collect();
    Table::from_parts(Schema::new(fields), rows)
}

fn normalize(table: &Table) -> CoreResult<Table> {
    let schema = table.schema();
    let mut rows = Vec::with_capacity(table.row_count());
    for row in table.rows() {
        let mut out = Vec::with_capacity(schema.len());
        for (i, field) in schema.fields().iter().enumerate() {
            let cell = row
                .at(i)
                .coerce(field.field_type)
                .map_err(|reason| CoreError::type_coercion(&field.name, reason))?;
            out.push(cell);
        }
        rows.push(out);
    }
    Ok(Table::from_parts(schema.clone(), rows))
}

fn fill_numeric_nulls(table: &Table) -> Table {
    let zeros: Vec<Option<Value>> = table
        .schema()
        .fields()
        .iter()
        .map(|f| match f.field_type {
            FieldType::Integer => Some(Value::Integer(0)),
            FieldType::Number => Some(Value::Number(0.0)),
            _ => None,
        })
        .collect();
    let rows = table
        .rows()
        .map(|row| {
            zeros
                .iter()
                .enumerate()
                .map(|(i, zero)| match (row.at(i), zero) {
                    (Value::Null, Some(z)) => z.clone(),
                    (v, _) => v.clone(),
                })
                .collect()
        })
        .collect();
    Table::from_parts(table.schema().clone(), rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::{Row, RowFn};

    fn people() -> Table {
        Table::from_parts(
            Schema::new(vec![
                Field::new("NAME", FieldType::String),
                Field::new("AGE", FieldType::Integer),
                Field::new("SCORE", FieldType::Number),
            ]),
            vec![
                vec![Value::from("ann"), Value::Integer(30), Value::Number(1.5)],
                vec![Value::from("bob"), Value::Null, Value::Null],
                vec![Value::from("cy"), Value::Integer(41), Value::Number(2.0)],
            ],
        )
    }

    #[test]
    fn test_add_field_infers_type() {
        let step = Step::add_field(
            "AGE2",
            RowFn::new(|row: &Row<'_>| {
                Ok(match row.value("AGE")? {
                    Value::Integer(a) => Value::Integer(a * 2),
                    _ => Value::Null,
                })
            }),
        );
        let out = step.apply_to(&people()).unwrap();
        assert_eq!(out.header(), vec!["NAME", "AGE", "SCORE", "AGE2"]);
        assert_eq!(out.schema().field("AGE2").unwrap().field_type, FieldType::Integer);
        assert_eq!(out.read_rows()[2]["AGE2"], Value::Integer(82));
    }

    #[test]
    fn test_add_field_replaces_existing() {
        let step = Step::add_typed_field("AGE", FieldType::String, RowFn::new(|_row: &Row<'_>| Ok(Value::from("x"))));
        let out = step.apply_to(&people()).unwrap();
        assert_eq!(out.header().len(), 3);
        assert_eq!(out.read_rows()[0]["AGE"], Value::from("x"));
    }

    #[test]
    fn test_remove_unknown_field_is_noop() {
        let out = Step::remove_fields(["MISSING"]).apply_to(&people()).unwrap();
        assert_eq!(out.header(), people().header());
        assert_eq!(out.row_count(), 3);
    }

    #[test]
    fn test_filter_fields_keeps_schema_order() {
        let out = Step::filter_fields(["SCORE", "NAME", "NOPE"]).apply_to(&people()).unwrap();
        assert_eq!(out.header(), vec!["NAME", "SCORE"]);
    }

    #[test]
    fn test_filter_rows_and_slice() {
        let adults = Step::filter_rows(RowFn::new(|row: &Row<'_>| {
            Ok(matches!(row.value("AGE")?, Value::Integer(a) if *a > 35))
        }));
        let out = people().apply(&[adults]).unwrap();
        assert_eq!(out.row_count(), 1);
        let out = people().apply(&[Step::slice_rows(2)]).unwrap();
        assert_eq!(out.row_count(), 2);
    }

    #[test]
    fn test_fill_numeric_nulls() {
        let out = Step::fill_numeric_nulls().apply_to(&people()).unwrap();
        let rows = out.read_rows();
        assert_eq!(rows[1]["AGE"], Value::Integer(0));
        assert_eq!(rows[1]["SCORE"], Value::Number(0.0));
    }

    #[test]
    fn test_normalize_coerces_strings() {
        let table = Table::from_parts(
            Schema::new(vec![Field::new("N", FieldType::Integer)]),
            vec![vec![Value::from("5")], vec![]],
        );
        let out = Step::normalize().apply_to(&table).unwrap();
        assert_eq!(out.read_rows()[0]["N"], Value::Integer(5));
        assert_eq!(out.read_rows()[1]["N"], Value::Null);

        let bad = Table::from_parts(
            Schema::new(vec![Field::new("N", FieldType::Integer)]),
            vec![vec![Value::from("five")]],
        );
        assert!(matches!(
            Step::normalize().apply_to(&bad),
            Err(CoreError::TypeCoercion { .. })
        ));
    }

    #[test]
    fn test_rename_fields() {
        let mapping: IndexMap<String, String> =
            [("NAME".to_string(), "A_NAME".to_string())].into_iter().collect();
        let out = Step::rename_fields(mapping).apply_to(&people()).unwrap();
        assert_eq!(out.header()[0], "A_NAME");
    }

    #[test]
    fn test_apply_does_not_mutate_input() {
        let input = people();
        let _ = input.apply(&[Step::remove_fields(["NAME"])]).unwrap();
        assert_eq!(input.header().len(), 3);
    }
}
