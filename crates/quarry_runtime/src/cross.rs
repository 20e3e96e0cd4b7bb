//! Cross-table operations: `compare` and `overlap`.
//!
//! Both work on two realized tables whose fields have been canonicalized
//! and prefixed with a per-source label (see [`prefix_fields`]).

use indexmap::IndexMap;
use quarry_core::CoreResult;
use quarry_table::{
    canonical_field_name, BoundFn, FieldType, JoinMode, Row, RowFn, Schema, Step, Table, Value,
};
use std::collections::HashSet;

/// Column added by `overlap`
pub const OVERLAP_COLUMN: &str = "overlap";

/// `<prefix>_<canonical name>`
#[must_use]
pub fn prefixed(prefix: &str, column: &str) -> String {
    format!("{}_{}", prefix, canonical_field_name(column))
}

/// Canonicalize every field name and prefix it
///
/// # Errors
///
/// Propagates step failures; renaming itself cannot fail
pub fn prefix_fields(table: &Table, prefix: &str) -> CoreResult<Table> {
    let mapping: IndexMap<String, String> = table
        .header()
        .into_iter()
        .map(|name| {
            let renamed = prefixed(prefix, &name);
            (name, renamed)
        })
        .collect();
    Step::rename_fields(mapping).apply_to(table)
}

/// Distinct prefixes for two sources; identical labels get `_1`/`_2`
#[must_use]
pub fn distinct_prefixes(first: &str, second: &str) -> (String, String) {
    if first == second {
        (format!("{}_1", first), format!("{}_2", second))
    } else {
        (first.to_string(), second.to_string())
    }
}

/// Difference of two cells: numeric difference when both are numbers,
/// otherwise `True`/`False` for textual equality
fn compare_cells(left: &Value, right: &Value) -> Value {
    match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => match a.checked_sub(*b) {
            Some(d) => Value::from(d.to_string()),
            None => Value::from((*a as f64 - *b as f64).to_string()),
        },
        (a, b) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => Value::from((x - y).to_string()),
            _ => {
                let equal = a.to_string() == b.to_string();
                Value::from(if equal { "True" } else { "False" })
            }
        },
    }
}

/// Outer-join two prefixed tables on the matching columns and add one
/// `compare_<column>` per compare column.
///
/// # Errors
///
/// Returns `ColumnNotFound` if a matching or compare column is missing from
/// either side, or `TypeCoercion` if normalization fails
pub fn compare(
    first: &Table,
    second: &Table,
    prefixes: (&str, &str),
    matching_columns: &[String],
    compare_columns: &[String],
) -> CoreResult<Table> {
    let (p1, p2) = prefixes;
    let left_keys: Vec<String> = matching_columns.iter().map(|c| prefixed(p1, c)).collect();
    let right_keys: Vec<String> = matching_columns.iter().map(|c| prefixed(p2, c)).collect();

    let mut steps = vec![
        Step::normalize(),
        Step::join(second.clone(), JoinMode::Outer, left_keys, right_keys),
    ];
    for column in compare_columns {
        let left = prefixed(p1, column);
        let right = prefixed(p2, column);
        steps.push(Step::add_typed_field(
            format!("compare_{}", canonical_field_name(column)),
            FieldType::String,
            RowFn::with_schema(move |schema: &Schema| {
                let l = schema.require(&left)?;
                let r = schema.require(&right)?;
                Ok(Box::new(move |row: &Row<'_>| Ok(compare_cells(row.at(l), row.at(r))))
                    as BoundFn<Value>)
            }),
        ));
    }
    first.apply(&steps)
}

/// Flag each row of `first` whose full tuple appears anywhere in `second`
///
/// # Errors
///
/// Returns `TypeCoercion` if normalization of `first` fails
pub fn overlap(first: &Table, second: &Table) -> CoreResult<Table> {
    let tuples: HashSet<Vec<String>> = second.rows().map(|row| rendered(&row)).collect();
    first.apply(&[
        Step::normalize(),
        Step::add_typed_field(
            OVERLAP_COLUMN,
            FieldType::String,
            RowFn::new(move |row| {
                let found = tuples.contains(&rendered(row));
                Ok(Value::from(if found { "Y" } else { "N" }))
            }),
        ),
    ])
}

fn rendered(row: &Row<'_>) -> Vec<String> {
    row.values().iter().map(ToString::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_core::CoreError;

    fn set_1() -> Table {
        Table::from_text(
            &["ID", "CATEGORY", "AMOUNT"],
            &[vec!["1", "a", "10"], vec!["2", "b", "20"], vec!["3", "c", "30"]],
        )
        .unwrap()
    }

    fn set_2() -> Table {
        Table::from_text(
            &["ID", "CATEGORY", "AMOUNT"],
            &[vec!["2", "b", "25"], vec!["3", "x", "30"], vec!["4", "d", "40"]],
        )
        .unwrap()
    }

    #[test]
    fn test_prefix_fields_canonicalizes() {
        let table = Table::from_text(&["Posting Date", "a/b.c"], &[vec!["x", "y"]]).unwrap();
        let out = prefix_fields(&table, "B").unwrap();
        assert_eq!(out.header(), vec!["B_Posting_Date", "B_a_b_c"]);
    }

    #[test]
    fn test_distinct_prefixes() {
        assert_eq!(distinct_prefixes("A", "B"), ("A".to_string(), "B".to_string()));
        assert_eq!(distinct_prefixes("A", "A"), ("A_1".to_string(), "A_2".to_string()));
    }

    #[test]
    fn test_compare() {
        let a = prefix_fields(&set_1(), "A").unwrap();
        let b = prefix_fields(&set_2(), "B").unwrap();
        let out = compare(
            &a,
            &b,
            ("A", "B"),
            &["ID".to_string()],
            &["AMOUNT".to_string(), "CATEGORY".to_string()],
        )
        .unwrap();
        assert_eq!(out.row_count(), 4);
        let rows = out.read_rows();
        let row2 = rows.iter().find(|r| r["A_ID"] == Value::Integer(2)).unwrap();
        assert_eq!(row2["compare_AMOUNT"], Value::from("-5"));
        assert_eq!(row2["compare_CATEGORY"], Value::from("True"));
        let row3 = rows.iter().find(|r| r["A_ID"] == Value::Integer(3)).unwrap();
        assert_eq!(row3["compare_AMOUNT"], Value::from("0"));
        assert_eq!(row3["compare_CATEGORY"], Value::from("False"));
    }

    #[test]
    fn test_compare_symmetric_row_count() {
        let a = prefix_fields(&set_1(), "A").unwrap();
        let b = prefix_fields(&set_2(), "B").unwrap();
        let id = ["ID".to_string()];
        let forward = compare(&a, &b, ("A", "B"), &id, &["AMOUNT".to_string()]).unwrap();
        let backward = compare(&b, &a, ("B", "A"), &id, &["AMOUNT".to_string()]).unwrap();
        assert_eq!(forward.row_count(), backward.row_count());
    }

    #[test]
    fn test_compare_missing_column() {
        let a = prefix_fields(&set_1(), "A").unwrap();
        let b = prefix_fields(&set_2(), "B").unwrap();
        let err = compare(&a, &b, ("A", "B"), &["ID".to_string()], &["NOPE".to_string()])
            .unwrap_err();
        assert!(matches!(err, CoreError::ColumnNotFound { .. }));
    }

    #[test]
    fn test_overlap() {
        let first = Table::from_text(
            &["ID", "CATEGORY"],
            &[vec!["1", "a"], vec!["2", "b"], vec!["3", "c"]],
        )
        .unwrap();
        let second = Table::from_text(
            &["KEY", "NAME"],
            &[vec!["2", "b"], vec!["3", "z"]],
        )
        .unwrap();
        let out = overlap(&first, &second).unwrap();
        let flags: Vec<String> = out.read_rows().iter().map(|r| r[OVERLAP_COLUMN].to_string()).collect();
        assert_eq!(flags, vec!["N", "Y", "N"]);
    }

    #[test]
    fn test_overlap_commas_inside_cells() {
        let first = Table::from_text(&["A", "B"], &[vec!["a,b", "c"], vec!["a", "b,c"]]).unwrap();
        let second = Table::from_text(&["A", "B"], &[vec!["a", "b,c"]]).unwrap();
        let out = overlap(&first, &second).unwrap();
        let flags: Vec<String> = out.read_rows().iter().map(|r| r[OVERLAP_COLUMN].to_string()).collect();
        assert_eq!(flags, vec!["N", "Y"]);
    }
}
