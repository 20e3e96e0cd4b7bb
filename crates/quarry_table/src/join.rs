//! Relational joins between two tables.

use quarry_core::{CoreError, CoreResult};
use std::collections::BTreeMap;

use crate::aggregate::KeyValue;
use crate::schema::{Field, Schema};
use crate::table::Table;
use crate::value::Value;

/// How rows of the two tables are paired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinMode {
    /// Matching pairs only
    Inner,
    /// Every left row, matched or padded
    Left,
    /// Every right row, matched or padded
    Right,
    /// Every row of both sides
    Outer,
    /// Cartesian product, keys ignored
    Cross,
    /// Left rows with no match (anti-join)
    Negate,
}

impl std::fmt::Display for JoinMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Inner => "inner",
            Self::Left => "left",
            Self::Right => "right",
            Self::Outer => "outer",
            Self::Cross => "cross",
            Self::Negate => "negate",
        };
        f.write_str(name)
    }
}

/// Join `left` with `right`.
///
/// Output header is the left header followed by the right header minus the
/// right key fields; a right field whose name is already taken gets a `_2`
/// suffix. Rows present only on the right carry their key values in the
/// left key columns. Null keys never match.
pub(crate) fn join(
    left: &Table,
    right: &Table,
    mode: JoinMode,
    left_keys: &[String],
    right_keys: &[String],
) -> CoreResult<Table> {
    if mode != JoinMode::Cross && (left_keys.is_empty() || left_keys.len() != right_keys.len()) {
        return Err(CoreError::invalid_operation(
            "join",
            format!(
                "{} left keys and {} right keys",
                left_keys.len(),
                right_keys.len()
            ),
        ));
    }

    let lschema = left.schema();
    let rschema = right.schema();
    let lkeys = resolve(lschema, left_keys)?;
    let rkeys = if mode == JoinMode::Cross {
        Vec::new()
    } else {
        resolve(rschema, right_keys)?
    };

    if mode == JoinMode::Negate {
        let index = index_rows(right, &rkeys);
        let rows = left
            .rows()
            .filter(|row| match key_of(row.values(), &lkeys) {
                Some(key) => !index.contains_key(&key),
                None => true,
            })
            .map(|row| row.values().to_vec())
            .collect();
        return Ok(Table::from_parts(lschema.clone(), rows));
    }

    // Right columns carried into the output
    let carried: Vec<usize> = (0..rschema.len()).filter(|i| !rkeys.contains(i)).collect();
    let mut fields: Vec<Field> = lschema.fields().to_vec();
    for &i in &carried {
        let mut field = rschema.fields()[i].clone();
        while fields.iter().any(|f| f.name == field.name) {
            field.name = format!("{}_2", field.name);
        }
        fields.push(field);
    }
    let width = lschema.len();

    let right_part = |values: &[Value]| -> Vec<Value> {
        carried
            .iter()
            .map(|&i| values.get(i).cloned().unwrap_or_default())
            .collect()
    };

    let mut rows = Vec::new();
    if mode == JoinMode::Cross {
        for l in left.rows() {
            for r in right.rows() {
                let mut out = padded(l.values(), width);
                out.extend(right_part(r.values()));
                rows.push(out);
            }
        }
        return Ok(Table::from_parts(Schema::new(fields), rows));
    }

    let index = index_rows(right, &rkeys);
    let mut matched = vec![false; right.row_count()];
    let keep_left = matches!(mode, JoinMode::Left | JoinMode::Outer);
    let keep_right = matches!(mode, JoinMode::Right | JoinMode::Outer);

    for l in left.rows() {
        let hits = key_of(l.values(), &lkeys).and_then(|k| index.get(&k));
        match hits {
            Some(hits) => {
                for &ri in hits {
                    matched[ri] = true;
                    let mut out = padded(l.values(), width);
                    out.extend(right_part(right.row_values(ri)));
                    rows.push(out);
                }
            }
            None if keep_left => {
                let mut out = padded(l.values(), width);
                out.extend(carried.iter().map(|_| Value::Null));
                rows.push(out);
            }
            None => {}
        }
    }

    if keep_right {
        for (ri, seen) in matched.iter().enumerate() {
            if *seen {
                continue;
            }
            let values = right.row_values(ri);
            let mut out = vec![Value::Null; width];
            for (&li, &rk) in lkeys.iter().zip(&rkeys) {
                out[li] = values.get(rk).cloned().unwrap_or_default();
            }
            out.extend(right_part(values));
            rows.push(out);
        }
    }

    Ok(Table::from_parts(Schema::new(fields), rows))
}

fn resolve(schema: &Schema, keys: &[String]) -> CoreResult<Vec<usize>> {
    keys.iter().map(|k| schema.require(k)).collect()
}

fn key_of(values: &[Value], idx: &[usize]) -> Option<Vec<KeyValue>> {
    idx.iter()
        .map(|&i| match values.get(i) {
            None | Some(Value::Null) => None,
            Some(v) => Some(KeyValue(v.clone())),
        })
        .collect()
}

fn index_rows(table: &Table, idx: &[usize]) -> BTreeMap<Vec<KeyValue>, Vec<usize>> {
    let mut index: BTreeMap<Vec<KeyValue>, Vec<usize>> = BTreeMap::new();
    for (pos, row) in table.rows().enumerate() {
        if let Some(key) = key_of(row.values(), idx) {
            index.entry(key).or_default().push(pos);
        }
    }
    index
}

fn padded(values: &[Value], width: usize) -> Vec<Value> {
    let mut out = values.to_vec();
    out.resize(width, Value::Null);
    out
}
