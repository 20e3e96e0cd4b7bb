//! Operation catalog: turns an [`OperationSpec`] into table steps.
//!
//! Single-table operations become an ordered list of [`Step`]s that the
//! engine queues lazily. The cross-table operations (`compare`, `overlap`)
//! need two realized tables and are forced by the engine instead; see
//! [`crate::resolve`].

use chrono::{Datelike, NaiveDate, NaiveTime};
use indexmap::IndexMap;
use quarry_core::{CoreError, CoreResult, Hash};
use quarry_plan::{
    parse_date_param, parse_time_param, BackdatingReference, FilterOperator, Formula,
    GroupAggregate, OperationSpec,
};
use quarry_table::value::{parse_date, parse_datetime, parse_time};
use quarry_table::{
    Aggregation, BoundFn, FieldType, Reducer, Row, RowFn, RowPredicate, Schema, Step, Table,
    Value,
};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};
use tracing::debug;

use crate::artifact::TempArtifact;

/// Decimal places kept by `avg`
pub const AVG_PRECISION: u32 = 5;

/// What a transform node produces
#[derive(Debug)]
pub enum Generated {
    /// Steps to queue on the incoming table
    Steps(Vec<Step>),
    /// An already-realized table and the artifacts backing it
    Forced {
        /// Result table
        table: Table,
        /// Temp files to clean up
        artifacts: Vec<TempArtifact>,
    },
}

/// Steps for a single-table operation
///
/// # Errors
///
/// Returns `InvalidOperationSpec` for malformed parameters or for a
/// cross-table operation, and `Formula` for an unparsable formula
pub fn generate_steps(op: &OperationSpec) -> CoreResult<Vec<Step>> {
    let steps = match op {
        OperationSpec::Sum { column } => constant_group("sum", column, Reducer::Sum, format!("sum_{}", column)),
        OperationSpec::Min { column } => constant_group("min", column, Reducer::Min, format!("min_{}", column)),
        OperationSpec::Max { column } => constant_group("max", column, Reducer::Max, format!("max_{}", column)),
        OperationSpec::Avg { column } => {
            let mut aggregations = IndexMap::new();
            aggregations.insert(
                format!("avg_{}", column),
                Aggregation::new(column, Reducer::Avg { precision: AVG_PRECISION }),
            );
            vec![Step::aggregate(Vec::new(), aggregations)]
        }
        OperationSpec::Count { column, unique } => {
            if *unique {
                constant_group("count", column, Reducer::CountDistinct, format!("count_unique_{}", column))
            } else {
                constant_group("count", column, Reducer::Count, format!("count_{}", column))
            }
        }
        OperationSpec::Net { amount, indicator } => vec![net(amount, indicator)],
        OperationSpec::MultipleCalculation { formula, variables } => {
            vec![multiple_calculation(Formula::parse(formula)?, variables.clone())]
        }
        OperationSpec::Duplicate => vec![duplicate()],
        OperationSpec::DeleteColumn { columns } => vec![Step::remove_fields(columns.iter().cloned())],
        OperationSpec::Filter {
            column,
            operator,
            value,
        } => vec![filter(column, *operator, value)],
        OperationSpec::GroupBy {
            keys,
            column,
            aggregate,
        } => vec![group_by(keys, column, *aggregate)],
        OperationSpec::NonWorkingDay {
            column,
            weekdays,
            custom_dates,
        } => {
            let dates = custom_dates
                .iter()
                .map(|d| parse_date_param(op.name(), d))
                .collect::<CoreResult<BTreeSet<_>>>()?;
            vec![non_working_day(column, weekdays.iter().copied().collect(), dates)]
        }
        OperationSpec::OutsideWorkingHours { column, start, end } => vec![outside_working_hours(
            column,
            parse_time_param(op.name(), start)?,
            parse_time_param(op.name(), end)?,
        )],
        OperationSpec::Backdating { column, reference } => {
            let reference = match reference {
                BackdatingReference::Column { column } => DateReference::Column(column.clone()),
                BackdatingReference::Custom { date } => {
                    DateReference::Fixed(parse_date_param(op.name(), date)?)
                }
            };
            vec![backdating(column, reference)]
        }
        OperationSpec::Compare { .. } | OperationSpec::Overlap { .. } => {
            return Err(CoreError::invalid_operation(
                op.name(),
                "cross-table operations are materialized by the engine",
            ));
        }
    };
    debug!(operation = op.name(), steps = steps.len(), "steps generated");
    Ok(steps)
}

/// Tag every row with one constant key, aggregate, drop the key
fn constant_group(op: &str, column: &str, reducer: Reducer, output: String) -> Vec<Step> {
    let key = format!("{}_group", op);
    let tag = Value::from(op.to_uppercase());
    let mut aggregations = IndexMap::new();
    aggregations.insert(output, Aggregation::new(column, reducer));
    vec![
        Step::add_typed_field(&key, FieldType::String, RowFn::new(move |_| Ok(tag.clone()))),
        Step::aggregate(vec![key.clone()], aggregations),
        Step::remove_fields([key]),
    ]
}

fn net(amount: &str, indicator: &str) -> Step {
    let name = format!("net_{}_{}", amount, indicator);
    let amount = amount.to_string();
    let indicator = indicator.to_string();
    Step::add_typed_field(
        name,
        FieldType::Number,
        RowFn::with_schema(move |schema: &Schema| {
            let a = schema.require(&amount)?;
            let d = schema.require(&indicator)?;
            let amount = amount.clone();
            Ok(Box::new(move |row: &Row<'_>| {
                let cell = row.at(a);
                if cell.is_null() {
                    return Ok(Value::Null);
                }
                let value = cell.as_f64().ok_or_else(|| {
                    CoreError::type_coercion(&amount, format!("'{}' is not numeric", cell))
                })?;
                let debit = row.at(d).to_string().trim() == "D";
                Ok(Value::Number(if debit { value } else { -value }))
            }) as BoundFn<Value>)
        }),
    )
}

/// Numeric view used by formulas: falsy and non-numeric cells are 0
fn formula_operand(value: &Value) -> f64 {
    if !value.is_truthy() {
        return 0.0;
    }
    match value {
        Value::Bool(_) => 1.0,
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        v => v.as_f64().unwrap_or(0.0),
    }
}

fn multiple_calculation(formula: Formula, variables: IndexMap<String, String>) -> Step {
    let name = format!(
        "maths_{}",
        variables.values().cloned().collect::<Vec<_>>().join("_")
    );
    Step::add_typed_field(
        name,
        FieldType::Number,
        RowFn::with_schema(move |schema: &Schema| {
            let bound = variables
                .iter()
                .map(|(var, col)| Ok((var.clone(), schema.require(col)?)))
                .collect::<CoreResult<Vec<(String, usize)>>>()?;
            let formula = formula.clone();
            Ok(Box::new(move |row: &Row<'_>| {
                let values: IndexMap<&str, f64> = bound
                    .iter()
                    .map(|(var, i)| (var.as_str(), formula_operand(row.at(*i))))
                    .collect();
                formula
                    .eval(|name| values.get(name).copied())
                    .map(Value::Number)
            }) as BoundFn<Value>)
        }),
    )
}

fn duplicate() -> Step {
    Step::add_typed_field(
        "is_duplicate",
        FieldType::String,
        RowFn::with_schema(|_schema: &Schema| {
            let mut seen: HashSet<Hash> = HashSet::new();
            Ok(Box::new(move |row: &Row<'_>| {
                let digest = Hash::of_cells(row.values().iter().map(|v| v.to_string()));
                Ok(flag(!seen.insert(digest)))
            }) as BoundFn<Value>)
        }),
    )
}

fn flag(set: bool) -> Value {
    Value::from(if set { "Y" } else { "N" })
}

enum FilterTarget {
    Column(usize),
    Literal(Value),
    AnyOf(Vec<Value>),
}

fn coerce_literal(column: &str, field_type: FieldType, literal: &str) -> CoreResult<Value> {
    match field_type {
        FieldType::String | FieldType::Any => Ok(Value::from(literal)),
        t => t
            .parse(literal)
            .map_err(|reason| CoreError::type_coercion(column, reason)),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        _ => a.try_cmp(b) == Some(Ordering::Equal),
    }
}

fn satisfies(column: &str, operator: FilterOperator, cell: &Value, target: &Value) -> CoreResult<bool> {
    let ordering = |keep: fn(Ordering) -> bool| -> CoreResult<bool> {
        if cell.is_null() || target.is_null() {
            return Ok(false);
        }
        cell.try_cmp(target).map(keep).ok_or_else(|| {
            CoreError::type_coercion(
                column,
                format!("cannot compare {} with {}", cell.type_name(), target.type_name()),
            )
        })
    };
    match operator {
        FilterOperator::Eq | FilterOperator::In => Ok(values_equal(cell, target)),
        FilterOperator::Ne => Ok(!values_equal(cell, target)),
        FilterOperator::Gt => ordering(|o| o == Ordering::Greater),
        FilterOperator::Lt => ordering(|o| o == Ordering::Less),
        FilterOperator::Ge => ordering(|o| o != Ordering::Less),
        FilterOperator::Le => ordering(|o| o != Ordering::Greater),
    }
}

fn filter(column: &str, operator: FilterOperator, literal: &str) -> Step {
    let column = column.to_string();
    let literal = literal.to_string();
    Step::filter_rows(RowPredicate::with_schema(move |schema: &Schema| {
        let idx = schema.require(&column)?;
        let field_type = schema.fields()[idx].field_type;
        let target = match (operator, schema.index_of(&literal)) {
            (FilterOperator::In, _) => FilterTarget::AnyOf(
                literal
                    .split(',')
                    .map(|part| coerce_literal(&column, field_type, part.trim()))
                    .collect::<CoreResult<_>>()?,
            ),
            (_, Some(other)) => FilterTarget::Column(other),
            (_, None) => FilterTarget::Literal(coerce_literal(&column, field_type, &literal)?),
        };
        let column = column.clone();
        Ok(Box::new(move |row: &Row<'_>| {
            let cell = row.at(idx);
            match &target {
                FilterTarget::Column(other) => satisfies(&column, operator, cell, row.at(*other)),
                FilterTarget::Literal(value) => satisfies(&column, operator, cell, value),
                FilterTarget::AnyOf(values) => Ok(values.iter().any(|v| values_equal(cell, v))),
            }
        }) as BoundFn<bool>)
    }))
}

fn group_by(keys: &[String], column: &str, aggregate: GroupAggregate) -> Step {
    let reducer = match aggregate {
        GroupAggregate::Sum => Reducer::Sum,
        GroupAggregate::Min => Reducer::Min,
        GroupAggregate::Max => Reducer::Max,
        GroupAggregate::Avg => Reducer::Avg { precision: AVG_PRECISION },
        GroupAggregate::Count => Reducer::Count,
        GroupAggregate::CountUnique => Reducer::CountDistinct,
    };
    let mut aggregations = IndexMap::new();
    aggregations.insert(
        format!("{}_{}", aggregate, column),
        Aggregation::new(column, reducer),
    );
    Step::aggregate(keys.to_vec(), aggregations)
}

/// Calendar date of a cell; null and blank cells have none
fn date_cell(column: &str, value: &Value) -> CoreResult<Option<NaiveDate>> {
    let not_a_date = || {
        CoreError::type_coercion(
            column,
            format!("{} value '{}' is not a date", value.type_name(), value),
        )
    };
    match value {
        Value::Null => Ok(None),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => parse_date(s)
            .or_else(|| parse_datetime(s).map(|dt| dt.date()))
            .map(Some)
            .ok_or_else(not_a_date),
        v => v.as_date().map(Some).ok_or_else(not_a_date),
    }
}

/// Time of day of a cell; required to be present
fn time_cell(column: &str, value: &Value) -> CoreResult<NaiveTime> {
    let parsed = match value {
        Value::String(s) => parse_datetime(s).map(|dt| dt.time()).or_else(|| parse_time(s)),
        v => v.as_time(),
    };
    parsed.ok_or_else(|| {
        CoreError::type_coercion(
            column,
            format!("{} value '{}' has no time of day", value.type_name(), value),
        )
    })
}

fn non_working_day(column: &str, weekdays: BTreeSet<u8>, custom_dates: BTreeSet<NaiveDate>) -> Step {
    let name = format!("nwd_{}", column);
    let column = column.to_string();
    Step::add_typed_field(
        name,
        FieldType::String,
        RowFn::with_schema(move |schema: &Schema| {
            let idx = schema.require(&column)?;
            let column = column.clone();
            let weekdays = weekdays.clone();
            let custom_dates = custom_dates.clone();
            Ok(Box::new(move |row: &Row<'_>| {
                let flagged = date_cell(&column, row.at(idx))?.is_some_and(|date| {
                    weekdays.contains(&(date.weekday().num_days_from_monday() as u8))
                        || custom_dates.contains(&date)
                });
                Ok(flag(flagged))
            }) as BoundFn<Value>)
        }),
    )
}

fn outside_working_hours(column: &str, start: NaiveTime, end: NaiveTime) -> Step {
    let name = format!("owh_{}", column);
    let column = column.to_string();
    Step::add_typed_field(
        name,
        FieldType::String,
        RowFn::with_schema(move |schema: &Schema| {
            let idx = schema.require(&column)?;
            let column = column.clone();
            Ok(Box::new(move |row: &Row<'_>| {
                let t = time_cell(&column, row.at(idx))?;
                Ok(flag(t < start || t > end))
            }) as BoundFn<Value>)
        }),
    )
}

#[derive(Clone)]
enum DateReference {
    Column(String),
    Fixed(NaiveDate),
}

enum BoundReference {
    Column(String, usize),
    Fixed(NaiveDate),
}

fn backdating(column: &str, reference: DateReference) -> Step {
    let name = format!("bkd_{}", column);
    let column = column.to_string();
    Step::add_typed_field(
        name,
        FieldType::Integer,
        RowFn::with_schema(move |schema: &Schema| {
            let idx = schema.require(&column)?;
            let column = column.clone();
            let reference = match &reference {
                DateReference::Column(c) => BoundReference::Column(c.clone(), schema.require(c)?),
                DateReference::Fixed(d) => BoundReference::Fixed(*d),
            };
            Ok(Box::new(move |row: &Row<'_>| {
                let date = date_cell(&column, row.at(idx))?;
                let delta = match &reference {
                    BoundReference::Column(ref_column, r) => {
                        match (date, date_cell(ref_column, row.at(*r))?) {
                            (Some(d), Some(reference)) => Value::Integer((reference - d).num_days()),
                            _ => Value::Integer(0),
                        }
                    }
                    BoundReference::Fixed(fixed) => match date {
                        Some(d) => Value::Integer((*fixed - d).num_days()),
                        None => Value::Null,
                    },
                };
                Ok(delta)
            }) as BoundFn<Value>)
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_table::Record;

    fn staff() -> Table {
        Table::from_text(
            &["NAME", "DEPT", "SALARY", "BONUS", "DC"],
            &[
                vec!["ann", "10", "100", "5", "D"],
                vec!["bob", "20", "250", "", "C"],
                vec!["cy", "10", "50", "1.5", "D"],
                vec!["dee", "30", "", "0", "C"],
            ],
        )
        .unwrap()
    }

    fn run(table: &Table, op: OperationSpec) -> CoreResult<Vec<Record>> {
        op.validate()?;
        Ok(table.apply(&generate_steps(&op)?)?.read_rows())
    }

    #[test]
    fn test_sum() {
        let rows = run(&staff(), OperationSpec::Sum { column: "SALARY".into() }).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].len(), 1);
        assert_eq!(rows[0]["sum_SALARY"], Value::Integer(400));
    }

    #[test]
    fn test_sum_of_text_fails() {
        let err = run(&staff(), OperationSpec::Sum { column: "NAME".into() }).unwrap_err();
        assert!(matches!(err, CoreError::TypeCoercion { .. }));
    }

    #[test]
    fn test_min_max_on_strings() {
        let rows = run(&staff(), OperationSpec::Min { column: "NAME".into() }).unwrap();
        assert_eq!(rows[0]["min_NAME"], Value::from("ann"));
        let rows = run(&staff(), OperationSpec::Max { column: "SALARY".into() }).unwrap();
        assert_eq!(rows[0]["max_SALARY"], Value::Integer(250));
    }

    #[test]
    fn test_avg() {
        let rows = run(&staff(), OperationSpec::Avg { column: "BONUS".into() }).unwrap();
        assert_eq!(rows[0]["avg_BONUS"], Value::Number(2.16667));
        let err = run(&staff(), OperationSpec::Avg { column: "NAME".into() }).unwrap_err();
        assert!(matches!(err, CoreError::TypeCoercion { .. }));
    }

    #[test]
    fn test_count() {
        let rows = run(&staff(), OperationSpec::Count { column: "SALARY".into(), unique: false }).unwrap();
        assert_eq!(rows[0]["count_SALARY"], Value::Integer(3));
        let rows = run(&staff(), OperationSpec::Count { column: "DEPT".into(), unique: true }).unwrap();
        assert_eq!(rows[0]["count_unique_DEPT"], Value::Integer(3));
    }

    #[test]
    fn test_net() {
        let rows = run(
            &staff(),
            OperationSpec::Net { amount: "SALARY".into(), indicator: "DC".into() },
        )
        .unwrap();
        let net: Vec<Value> = rows.iter().map(|r| r["net_SALARY_DC"].clone()).collect();
        assert_eq!(
            net,
            vec![Value::Number(100.0), Value::Number(-250.0), Value::Number(50.0), Value::Null]
        );
    }

    #[test]
    fn test_multiple_calculation() {
        let variables: IndexMap<String, String> = [("a", "SALARY"), ("b", "BONUS")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let rows = run(
            &staff(),
            OperationSpec::MultipleCalculation { formula: "a * 2 + b".into(), variables },
        )
        .unwrap();
        assert_eq!(rows[0]["maths_SALARY_BONUS"], Value::Number(205.0));
        assert_eq!(rows[1]["maths_SALARY_BONUS"], Value::Number(500.0));
        assert_eq!(rows[3]["maths_SALARY_BONUS"], Value::Number(0.0));
    }

    #[test]
    fn test_multiple_calculation_division_by_zero_at_row_time() {
        let variables: IndexMap<String, String> = [("a", "SALARY"), ("b", "BONUS")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let err = run(
            &staff(),
            OperationSpec::MultipleCalculation { formula: "a / b".into(), variables },
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::Formula { .. }));
    }

    #[test]
    fn test_duplicate_flags_later_rows() {
        let table = Table::from_text(
            &["A", "B"],
            &[vec!["1", "x"], vec!["2", "y"], vec!["1", "x"], vec!["1", "x"]],
        )
        .unwrap();
        let rows = run(&table, OperationSpec::Duplicate).unwrap();
        let flags: Vec<String> = rows.iter().map(|r| r["is_duplicate"].to_string()).collect();
        assert_eq!(flags, vec!["N", "N", "Y", "Y"]);
    }

    #[test]
    fn test_duplicate_commas_inside_cells() {
        let table = Table::from_text(&["A", "B"], &[vec!["a,b", "c"], vec!["a", "b,c"]]).unwrap();
        let rows = run(&table, OperationSpec::Duplicate).unwrap();
        let flags: Vec<String> = rows.iter().map(|r| r["is_duplicate"].to_string()).collect();
        assert_eq!(flags, vec!["N", "N"]);
    }

    #[test]
    fn test_duplicate_state_resets_per_application() {
        let table = Table::from_text(&["A"], &[vec!["1"]]).unwrap();
        let steps = generate_steps(&OperationSpec::Duplicate).unwrap();
        let first = table.apply(&steps).unwrap();
        let second = table.apply(&steps).unwrap();
        assert_eq!(first.read_rows(), second.read_rows());
    }

    #[test]
    fn test_delete_unknown_column_is_noop() {
        let table = staff();
        let rows = run(
            &table,
            OperationSpec::DeleteColumn { columns: vec!["NOPE".into()] },
        )
        .unwrap();
        assert_eq!(rows, table.read_rows());

        let rows = run(
            &table,
            OperationSpec::DeleteColumn { columns: vec!["BONUS".into(), "NOPE".into()] },
        )
        .unwrap();
        assert_eq!(rows[0].keys().cloned().collect::<Vec<_>>(), vec!["NAME", "DEPT", "SALARY", "DC"]);
    }

    fn filter_op(column: &str, operator: FilterOperator, value: &str) -> OperationSpec {
        OperationSpec::Filter {
            column: column.into(),
            operator,
            value: value.into(),
        }
    }

    #[test]
    fn test_filter_literal_coerced() {
        let rows = run(&staff(), filter_op("SALARY", FilterOperator::Ge, "100")).unwrap();
        assert_eq!(rows.len(), 2);
        let rows = run(&staff(), filter_op("SALARY", FilterOperator::Lt, "100")).unwrap();
        assert_eq!(rows.len(), 1, "null salary never satisfies an ordering");
        let rows = run(&staff(), filter_op("NAME", FilterOperator::Ne, "bob")).unwrap();
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn test_filter_bad_literal() {
        let err = run(&staff(), filter_op("SALARY", FilterOperator::Gt, "lots")).unwrap_err();
        assert!(matches!(err, CoreError::TypeCoercion { .. }));
    }

    #[test]
    fn test_filter_in_list() {
        let rows = run(&staff(), filter_op("DEPT", FilterOperator::In, "10, 30")).unwrap();
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn test_filter_column_to_column() {
        let table = Table::from_text(
            &["A", "B"],
            &[vec!["1", "2"], vec!["5", "3"], vec!["4", "4"]],
        )
        .unwrap();
        let rows = run(&table, filter_op("A", FilterOperator::Gt, "B")).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["A"], Value::Integer(5));
        let rows = run(&table, filter_op("A", FilterOperator::Eq, "B")).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_group_by() {
        let op = OperationSpec::GroupBy {
            keys: vec!["DEPT".into()],
            column: "SALARY".into(),
            aggregate: GroupAggregate::Sum,
        };
        let rows = run(&staff(), op).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["DEPT"], Value::Integer(10));
        assert_eq!(rows[0]["sum_SALARY"], Value::Integer(150));

        let op = OperationSpec::GroupBy {
            keys: vec!["DEPT".into()],
            column: "NAME".into(),
            aggregate: GroupAggregate::CountUnique,
        };
        let rows = run(&staff(), op).unwrap();
        assert_eq!(rows[0]["count_unique_NAME"], Value::Integer(2));
    }

    fn dates() -> Table {
        Table::from_text(
            &["POSTED", "EFFECTIVE"],
            &[
                vec!["2024-03-09 08:30:00", "2024-03-01"],
                vec!["2024-03-11 19:15:00", "2024-03-12"],
                vec!["2024-12-25 12:00:00", ""],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_non_working_day() {
        let op = OperationSpec::NonWorkingDay {
            column: "POSTED".into(),
            weekdays: vec![5, 6],
            custom_dates: vec!["2024-12-25".into()],
        };
        let rows = run(&dates(), op).unwrap();
        let flags: Vec<String> = rows.iter().map(|r| r["nwd_POSTED"].to_string()).collect();
        assert_eq!(flags, vec!["Y", "N", "Y"]);
    }

    #[test]
    fn test_non_working_day_null_is_no() {
        let op = OperationSpec::NonWorkingDay {
            column: "EFFECTIVE".into(),
            weekdays: vec![0, 1, 2, 3, 4, 5, 6],
            custom_dates: vec![],
        };
        let rows = run(&dates(), op).unwrap();
        assert_eq!(rows[2]["nwd_EFFECTIVE"], Value::from("N"));
    }

    #[test]
    fn test_outside_working_hours() {
        let op = OperationSpec::OutsideWorkingHours {
            column: "POSTED".into(),
            start: "09:00".into(),
            end: "17:00".into(),
        };
        let rows = run(&dates(), op).unwrap();
        let flags: Vec<String> = rows.iter().map(|r| r["owh_POSTED"].to_string()).collect();
        assert_eq!(flags, vec!["Y", "Y", "N"]);
    }

    #[test]
    fn test_outside_working_hours_needs_time() {
        let op = OperationSpec::OutsideWorkingHours {
            column: "EFFECTIVE".into(),
            start: "09:00".into(),
            end: "17:00".into(),
        };
        assert!(matches!(run(&dates(), op), Err(CoreError::TypeCoercion { .. })));
    }

    #[test]
    fn test_backdating_column_reference() {
        let op = OperationSpec::Backdating {
            column: "POSTED".into(),
            reference: BackdatingReference::Column { column: "EFFECTIVE".into() },
        };
        let rows = run(&dates(), op).unwrap();
        let deltas: Vec<Value> = rows.iter().map(|r| r["bkd_POSTED"].clone()).collect();
        assert_eq!(deltas, vec![Value::Integer(-8), Value::Integer(1), Value::Integer(0)]);
    }

    #[test]
    fn test_backdating_custom_reference() {
        let op = OperationSpec::Backdating {
            column: "EFFECTIVE".into(),
            reference: BackdatingReference::Custom { date: "2024-03-02".into() },
        };
        let rows = run(&dates(), op).unwrap();
        let deltas: Vec<Value> = rows.iter().map(|r| r["bkd_EFFECTIVE"].clone()).collect();
        assert_eq!(deltas, vec![Value::Integer(1), Value::Integer(-10), Value::Null]);
    }

    #[test]
    fn test_cross_table_ops_not_generated_here() {
        let op = OperationSpec::Overlap {
            source_1: "a".into(),
            source_2: "b".into(),
        };
        assert!(matches!(generate_steps(&op), Err(CoreError::InvalidOperationSpec { .. })));
    }

    proptest::proptest! {
        #[test]
        fn test_aggregates_ignore_row_order(
            mut values in proptest::collection::vec(-10_000i64..10_000, 1..30),
            rotate in 0usize..30,
        ) {
            let build = |vals: &[i64]| {
                let rows: Vec<Vec<String>> = vals.iter().map(|v| vec![v.to_string()]).collect();
                Table::from_text(&["X".to_string()], &rows).unwrap()
            };
            let ops = [
                OperationSpec::Sum { column: "X".into() },
                OperationSpec::Avg { column: "X".into() },
                OperationSpec::Min { column: "X".into() },
                OperationSpec::Max { column: "X".into() },
                OperationSpec::Count { column: "X".into(), unique: true },
            ];
            let before: Vec<_> = ops.iter().map(|op| run(&build(&values), op.clone()).unwrap()).collect();
            let len = values.len();
            values.rotate_left(rotate % len);
            values.reverse();
            let after: Vec<_> = ops.iter().map(|op| run(&build(&values), op.clone()).unwrap()).collect();
            proptest::prop_assert_eq!(before, after);
        }
    }
}
