//! Grouped aggregation.

use indexmap::IndexMap;
use quarry_core::{CoreError, CoreResult};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use crate::schema::{Field, FieldType, Schema};
use crate::table::Table;
use crate::value::Value;

/// Reduce function applied to the values of one group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reducer {
    /// Sum of numeric values
    Sum,
    /// Smallest value
    Min,
    /// Largest value
    Max,
    /// Arithmetic mean rounded to `precision` decimal places
    Avg {
        /// Decimal places kept
        precision: u32,
    },
    /// Number of non-null values
    Count,
    /// Number of distinct non-null values
    CountDistinct,
}

/// One output column of an aggregate step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregation {
    /// Source column
    pub source: String,
    /// Reduce function
    pub reducer: Reducer,
}

impl Aggregation {
    /// Create a new aggregation
    #[must_use]
    pub fn new(source: impl Into<String>, reducer: Reducer) -> Self {
        Self {
            source: source.into(),
            reducer,
        }
    }
}

/// Values ordered by [`Value::total_cmp`], usable as map keys
#[derive(Debug, Clone)]
pub(crate) struct KeyValue(pub Value);

impl PartialEq for KeyValue {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}

impl Eq for KeyValue {}

impl PartialOrd for KeyValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for KeyValue {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Group rows by `group_key` and reduce each aggregation per group.
///
/// Output has the key columns followed by one column per aggregation, one
/// row per distinct key tuple, ordered by key. An empty key puts every row
/// in a single group.
pub(crate) fn aggregate(
    table: &Table,
    group_key: &[String],
    aggregations: &IndexMap<String, Aggregation>,
) -> CoreResult<Table> {
    let schema = table.schema();
    let key_idx = group_key
        .iter()
        .map(|k| schema.require(k))
        .collect::<CoreResult<Vec<_>>>()?;
    let source_idx = aggregations
        .values()
        .map(|a| schema.require(&a.source))
        .collect::<CoreResult<Vec<_>>>()?;

    let mut groups: BTreeMap<Vec<KeyValue>, Vec<Vec<Value>>> = BTreeMap::new();
    if group_key.is_empty() {
        groups.insert(Vec::new(), vec![Vec::new(); source_idx.len()]);
    }
    for row in table.rows() {
        let key = key_idx.iter().map(|&i| KeyValue(row.at(i).clone())).collect();
        let columns = groups
            .entry(key)
            .or_insert_with(|| vec![Vec::new(); source_idx.len()]);
        for (column, &i) in columns.iter_mut().zip(&source_idx) {
            column.push(row.at(i).clone());
        }
    }

    let mut rows = Vec::with_capacity(groups.len());
    for (key, columns) in groups {
        let mut out: Vec<Value> = key.into_iter().map(|k| k.0).collect();
        for (agg, values) in aggregations.values().zip(columns) {
            out.push(reduce(&agg.source, agg.reducer, values)?);
        }
        rows.push(out);
    }

    let mut fields: Vec<Field> = key_idx
        .iter()
        .map(|&i| schema.fields()[i].clone())
        .collect();
    for (pos, name) in aggregations.keys().enumerate() {
        let column = rows.iter().map(|r| &r[key_idx.len() + pos]);
        let field_type = match FieldType::infer_from(column) {
            FieldType::Any => FieldType::Number,
            t => t,
        };
        fields.push(Field::new(name.clone(), field_type));
    }

    Ok(Table::from_parts(Schema::new(fields), rows))
}

/// Reduce one group's values
fn reduce(column: &str, reducer: Reducer, values: Vec<Value>) -> CoreResult<Value> {
    let present = values.into_iter().filter(|v| !v.is_null());
    match reducer {
        Reducer::Sum => sum(column, present),
        Reducer::Avg { precision } => {
            let mut total = 0.0;
            let mut n = 0usize;
            for v in present {
                total += numeric(column, &v, "average")?;
                n += 1;
            }
            if n == 0 {
                return Ok(Value::Number(0.0));
            }
            let scale = 10f64.powi(precision as i32);
            Ok(Value::Number((total / n as f64 * scale).round() / scale))
        }
        Reducer::Min => extreme(column, present, Ordering::Less),
        Reducer::Max => extreme(column, present, Ordering::Greater),
        Reducer::Count => Ok(Value::Integer(present.count() as i64)),
        Reducer::CountDistinct => {
            let distinct: BTreeSet<KeyValue> = present.map(KeyValue).collect();
            Ok(Value::Integer(distinct.len() as i64))
        }
    }
}

fn numeric(column: &str, value: &Value, verb: &str) -> CoreResult<f64> {
    value.as_f64().ok_or_else(|| {
        CoreError::type_coercion(
            column,
            format!("cannot {} {} value '{}'", verb, value.type_name(), value),
        )
    })
}

fn sum(column: &str, values: impl Iterator<Item = Value>) -> CoreResult<Value> {
    let mut int_total: Option<i64> = Some(0);
    let mut float_total = 0.0;
    for v in values {
        float_total += numeric(column, &v, "sum")?;
        int_total = match (int_total, &v) {
            (Some(acc), Value::Integer(i)) => acc.checked_add(*i),
            _ => None,
        };
    }
    Ok(match int_total {
        Some(total) => Value::Integer(total),
        None => Value::Number(float_total),
    })
}

fn extreme(
    column: &str,
    values: impl Iterator<Item = Value>,
    keep: Ordering,
) -> CoreResult<Value> {
    let mut best: Option<Value> = None;
    for v in values {
        best = match best {
            None => Some(v),
            Some(current) => {
                let ord = v.try_cmp(&current).ok_or_else(|| {
                    CoreError::type_coercion(
                        column,
                        format!(
                            "cannot compare {} with {}",
                            v.type_name(),
                            current.type_name()
                        ),
                    )
                })?;
                if ord == keep { Some(v) } else { Some(current) }
            }
        };
    }
    Ok(best.unwrap_or(Value::Null))
}
