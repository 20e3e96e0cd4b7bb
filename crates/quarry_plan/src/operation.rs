//! Transform operations and their parameters.
//!
//! Every operation a Transform node can carry is one variant of
//! [`OperationSpec`]. Parameters are checked by [`OperationSpec::validate`]
//! when the node is built, so a pipeline that constructs successfully only
//! fails at run time on data problems.

use chrono::{NaiveDate, NaiveTime};
use indexmap::IndexMap;
use quarry_core::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::formula::Formula;

/// Names of weekdays, Monday first
pub const WEEKDAY_NAMES: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/// Comparison used by `filter`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOperator {
    /// Equal
    #[serde(rename = "==")]
    Eq,
    /// Not equal
    #[serde(rename = "!=")]
    Ne,
    /// Greater than
    #[serde(rename = ">")]
    Gt,
    /// Less than
    #[serde(rename = "<")]
    Lt,
    /// Greater or equal
    #[serde(rename = ">=")]
    Ge,
    /// Less or equal
    #[serde(rename = "<=")]
    Le,
    /// Member of a comma-separated list
    #[serde(rename = "in")]
    In,
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Ge => ">=",
            Self::Le => "<=",
            Self::In => "in",
        };
        f.write_str(symbol)
    }
}

/// Aggregation applied per group by `group_by`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupAggregate {
    /// Sum
    Sum,
    /// Minimum
    Min,
    /// Maximum
    Max,
    /// Mean
    Avg,
    /// Non-null count
    Count,
    /// Distinct non-null count
    CountUnique,
}

impl fmt::Display for GroupAggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Sum => "sum",
            Self::Min => "min",
            Self::Max => "max",
            Self::Avg => "avg",
            Self::Count => "count",
            Self::CountUnique => "count_unique",
        };
        f.write_str(name)
    }
}

/// Reference date for `backdating`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum BackdatingReference {
    /// Compare with another column of the same row
    Column {
        /// Reference column
        column: String,
    },
    /// Compare with one fixed date
    Custom {
        /// ISO date
        date: String,
    },
}

/// A compare/overlap datasource: a literal file path or another node's id
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DataSourceRef {
    /// External file
    Path(String),
    /// Node in the same pipeline
    Node(String),
}

impl DataSourceRef {
    /// Classify a reference: text containing both `/` and `.` is a path,
    /// anything else a node id.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        if text.contains('/') && text.contains('.') {
            Self::Path(text.to_string())
        } else {
            Self::Node(text.to_string())
        }
    }

    /// The reference as written
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Path(s) | Self::Node(s) => s,
        }
    }
}

impl From<String> for DataSourceRef {
    fn from(text: String) -> Self {
        Self::parse(&text)
    }
}

impl From<&str> for DataSourceRef {
    fn from(text: &str) -> Self {
        Self::parse(text)
    }
}

impl From<DataSourceRef> for String {
    fn from(reference: DataSourceRef) -> Self {
        match reference {
            DataSourceRef::Path(s) | DataSourceRef::Node(s) => s,
        }
    }
}

impl fmt::Display for DataSourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operation carried by a Transform node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OperationSpec {
    /// Column total
    Sum {
        /// Target column
        column: String,
    },
    /// Column mean
    Avg {
        /// Target column
        column: String,
    },
    /// Column minimum
    Min {
        /// Target column
        column: String,
    },
    /// Column maximum
    Max {
        /// Target column
        column: String,
    },
    /// Signed amount by debit/credit indicator
    Net {
        /// Amount column
        amount: String,
        /// Indicator column; `D` keeps the sign
        indicator: String,
    },
    /// Non-null count
    Count {
        /// Target column
        column: String,
        /// Count distinct values only
        #[serde(default)]
        unique: bool,
    },
    /// Arithmetic formula over columns
    MultipleCalculation {
        /// Formula text
        formula: String,
        /// Formula variable to column
        variables: IndexMap<String, String>,
    },
    /// Flag repeated rows
    Duplicate,
    /// Drop columns
    DeleteColumn {
        /// Columns to drop
        columns: Vec<String>,
    },
    /// Keep rows matching a comparison
    Filter {
        /// Target column
        column: String,
        /// Comparison
        operator: FilterOperator,
        /// Literal, or the name of another column
        value: String,
    },
    /// Grouped aggregate
    GroupBy {
        /// Key columns
        keys: Vec<String>,
        /// Aggregated column
        column: String,
        /// Aggregation
        aggregate: GroupAggregate,
    },
    /// Flag weekend/holiday dates
    #[serde(alias = "nwd")]
    NonWorkingDay {
        /// Date column
        column: String,
        /// Flagged weekdays, 0 = Monday
        #[serde(default)]
        weekdays: Vec<u8>,
        /// Flagged ISO dates
        #[serde(default)]
        custom_dates: Vec<String>,
    },
    /// Flag times outside business hours
    #[serde(alias = "owh")]
    OutsideWorkingHours {
        /// Date-time column
        column: String,
        /// Start of business, `HH:MM`
        start: String,
        /// End of business, `HH:MM`
        end: String,
    },
    /// Day delta against a reference date
    #[serde(alias = "bkd")]
    Backdating {
        /// Date column
        column: String,
        /// Reference
        reference: BackdatingReference,
    },
    /// Join two datasources and diff columns
    Compare {
        /// First datasource
        source_1: DataSourceRef,
        /// Second datasource
        source_2: DataSourceRef,
        /// Join columns, present in both
        matching_columns: Vec<String>,
        /// Columns to diff, present in both
        compare_columns: Vec<String>,
    },
    /// Flag rows of the first datasource found in the second
    Overlap {
        /// First datasource
        source_1: DataSourceRef,
        /// Second datasource
        source_2: DataSourceRef,
    },
}

fn require(operation: &str, field: &str, value: &str) -> CoreResult<()> {
    if value.trim().is_empty() {
        return Err(CoreError::invalid_operation(
            operation,
            format!("{} is required", field),
        ));
    }
    Ok(())
}

fn require_list(operation: &str, field: &str, values: &[String]) -> CoreResult<()> {
    if values.is_empty() {
        return Err(CoreError::invalid_operation(
            operation,
            format!("{} must not be empty", field),
        ));
    }
    for v in values {
        require(operation, field, v)?;
    }
    Ok(())
}

/// Parse an ISO date parameter
///
/// # Errors
///
/// Returns `InvalidOperationSpec` naming the operation and the bad text
pub fn parse_date_param(operation: &str, text: &str) -> CoreResult<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d").map_err(|_| {
        CoreError::invalid_operation(operation, format!("'{}' is not a YYYY-MM-DD date", text))
    })
}

/// Parse an `HH:MM` parameter
///
/// # Errors
///
/// Returns `InvalidOperationSpec` naming the operation and the bad text
pub fn parse_time_param(operation: &str, text: &str) -> CoreResult<NaiveTime> {
    NaiveTime::parse_from_str(text.trim(), "%H:%M").map_err(|_| {
        CoreError::invalid_operation(operation, format!("'{}' is not an HH:MM time", text))
    })
}

impl OperationSpec {
    /// Operation name as written in pipelines
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sum { .. } => "sum",
            Self::Avg { .. } => "avg",
            Self::Min { .. } => "min",
            Self::Max { .. } => "max",
            Self::Net { .. } => "net",
            Self::Count { .. } => "count",
            Self::MultipleCalculation { .. } => "multiple_calculation",
            Self::Duplicate => "duplicate",
            Self::DeleteColumn { .. } => "delete_column",
            Self::Filter { .. } => "filter",
            Self::GroupBy { .. } => "group_by",
            Self::NonWorkingDay { .. } => "non_working_day",
            Self::OutsideWorkingHours { .. } => "outside_working_hours",
            Self::Backdating { .. } => "backdating",
            Self::Compare { .. } => "compare",
            Self::Overlap { .. } => "overlap",
        }
    }

    /// Whether this operation reads two datasources and materializes eagerly
    #[must_use]
    pub fn is_cross_table(&self) -> bool {
        matches!(self, Self::Compare { .. } | Self::Overlap { .. })
    }

    /// Check parameters
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperationSpec` for missing or incompatible
    /// parameters, `Formula` for a formula that does not parse or evaluate
    pub fn validate(&self) -> CoreResult<()> {
        let op = self.name();
        match self {
            Self::Sum { column }
            | Self::Avg { column }
            | Self::Min { column }
            | Self::Max { column }
            | Self::Count { column, .. } => require(op, "column", column),
            Self::Net { amount, indicator } => {
                require(op, "amount", amount)?;
                require(op, "indicator", indicator)
            }
            Self::MultipleCalculation { formula, variables } => {
                require(op, "formula", formula)?;
                if variables.is_empty() {
                    return Err(CoreError::invalid_operation(op, "variables must not be empty"));
                }
                for column in variables.values() {
                    require(op, "variable column", column)?;
                }
                Formula::parse(formula)?.check(variables)
            }
            Self::Duplicate => Ok(()),
            Self::DeleteColumn { columns } => require_list(op, "columns", columns),
            Self::Filter { column, .. } => require(op, "column", column),
            Self::GroupBy { keys, column, .. } => {
                require_list(op, "keys", keys)?;
                require(op, "column", column)
            }
            Self::NonWorkingDay {
                column,
                weekdays,
                custom_dates,
            } => {
                require(op, "column", column)?;
                if weekdays.is_empty() && custom_dates.is_empty() {
                    return Err(CoreError::invalid_operation(
                        op,
                        "weekdays or custom_dates is required",
                    ));
                }
                if let Some(bad) = weekdays.iter().find(|d| **d > 6) {
                    return Err(CoreError::invalid_operation(
                        op,
                        format!("weekday {} is outside 0 (Monday) to 6 (Sunday)", bad),
                    ));
                }
                for date in custom_dates {
                    parse_date_param(op, date)?;
                }
                Ok(())
            }
            Self::OutsideWorkingHours { column, start, end } => {
                require(op, "column", column)?;
                let start_at = parse_time_param(op, start)?;
                let end_at = parse_time_param(op, end)?;
                if start_at > end_at {
                    return Err(CoreError::invalid_operation(
                        op,
                        format!("start {} is after end {}", start, end),
                    ));
                }
                Ok(())
            }
            Self::Backdating { column, reference } => {
                require(op, "column", column)?;
                match reference {
                    BackdatingReference::Column { column } => require(op, "reference column", column),
                    BackdatingReference::Custom { date } => parse_date_param(op, date).map(|_| ()),
                }
            }
            Self::Compare {
                source_1,
                source_2,
                matching_columns,
                compare_columns,
            } => {
                require(op, "source_1", source_1.as_str())?;
                require(op, "source_2", source_2.as_str())?;
                require_list(op, "matching_columns", matching_columns)?;
                require_list(op, "compare_columns", compare_columns)?;
                if let Some(both) = compare_columns.iter().find(|c| matching_columns.contains(c)) {
                    return Err(CoreError::invalid_operation(
                        op,
                        format!("'{}' is both a matching and a compare column", both),
                    ));
                }
                Ok(())
            }
            Self::Overlap { source_1, source_2 } => {
                require(op, "source_1", source_1.as_str())?;
                require(op, "source_2", source_2.as_str())
            }
        }
    }
}

impl fmt::Display for OperationSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())?;
        match self {
            Self::Sum { column } | Self::Avg { column } | Self::Min { column } | Self::Max { column } => {
                write!(f, " on {}", column)
            }
            Self::Count { column, unique } => {
                write!(f, " on {} {}", column, if *unique { "unique" } else { "all" })
            }
            Self::Net { amount, indicator } => write!(
                f,
                " on {} with amount debit/credit indicator as {}",
                amount, indicator
            ),
            Self::MultipleCalculation { formula, variables } => {
                let mut rendered = String::new();
                for token in formula.split_inclusive(|c: char| !c.is_alphanumeric() && c != '_') {
                    let (word, rest) = token.split_at(
                        token
                            .find(|c: char| !c.is_alphanumeric() && c != '_')
                            .unwrap_or(token.len()),
                    );
                    rendered.push_str(variables.get(word).map_or(word, String::as_str));
                    rendered.push_str(rest);
                }
                write!(f, " with formula {}", rendered)
            }
            Self::Duplicate => Ok(()),
            Self::DeleteColumn { columns } => write!(f, " on {}", columns.join(", ")),
            Self::Filter {
                column,
                operator,
                value,
            } => write!(f, " on {} is {} {}", column, operator, value),
            Self::GroupBy {
                keys,
                column,
                aggregate,
            } => write!(
                f,
                " on {} with group by {} and aggregation type {}",
                column,
                keys.join(", "),
                aggregate
            ),
            Self::NonWorkingDay {
                column,
                weekdays,
                custom_dates,
            } => {
                write!(f, " on {}", column)?;
                if !custom_dates.is_empty() {
                    write!(f, " with custom date(s) as {}", custom_dates.join(", "))?;
                }
                if !weekdays.is_empty() {
                    let names: Vec<&str> = weekdays
                        .iter()
                        .filter_map(|d| WEEKDAY_NAMES.get(*d as usize).copied())
                        .collect();
                    write!(f, " with weekday(s) as {}", names.join(", "))?;
                }
                Ok(())
            }
            Self::OutsideWorkingHours { column, start, end } => write!(
                f,
                " on {} with start time {} and end time {}",
                column, start, end
            ),
            Self::Backdating { column, reference } => match reference {
                BackdatingReference::Column { column: other } => {
                    write!(f, " on {} with backdating column {}", column, other)
                }
                BackdatingReference::Custom { date } => {
                    write!(f, " on {} with backdating value {}", column, date)
                }
            },
            Self::Compare {
                source_1,
                source_2,
                matching_columns,
                compare_columns,
            } => write!(
                f,
                " of {} and {} with compare columns {} and matching columns {}",
                source_1,
                source_2,
                compare_columns.join(", "),
                matching_columns.join(", ")
            ),
            Self::Overlap { source_1, source_2 } => write!(f, " of {} in {}", source_1, source_2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_json(json: &str) -> OperationSpec {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_deserialize_tagged() {
        let op = from_json(r#"{"type": "sum", "column": "SALARY"}"#);
        assert_eq!(op, OperationSpec::Sum { column: "SALARY".to_string() });
        let op = from_json(r#"{"type": "count", "column": "X"}"#);
        assert_eq!(op, OperationSpec::Count { column: "X".to_string(), unique: false });
        let op = from_json(r#"{"type": "duplicate"}"#);
        assert_eq!(op, OperationSpec::Duplicate);
    }

    #[test]
    fn test_short_aliases() {
        let op = from_json(r#"{"type": "nwd", "column": "D", "weekdays": [5, 6]}"#);
        assert_eq!(op.name(), "non_working_day");
        let op = from_json(r#"{"type": "owh", "column": "D", "start": "09:00", "end": "17:00"}"#);
        assert_eq!(op.name(), "outside_working_hours");
        let op = from_json(
            r#"{"type": "bkd", "column": "D", "reference": {"mode": "custom", "date": "2022-12-31"}}"#,
        );
        assert_eq!(op.name(), "backdating");
    }

    #[test]
    fn test_filter_operator_symbols() {
        let op = from_json(r#"{"type": "filter", "column": "X", "operator": ">=", "value": "100"}"#);
        assert!(matches!(op, OperationSpec::Filter { operator: FilterOperator::Ge, .. }));
        assert_eq!(op.to_string(), "filter on X is >= 100");
    }

    #[test]
    fn test_datasource_classification() {
        assert_eq!(DataSourceRef::parse("data/a.csv"), DataSourceRef::Path("data/a.csv".into()));
        assert_eq!(DataSourceRef::parse("node-3"), DataSourceRef::Node("node-3".into()));
        assert_eq!(DataSourceRef::parse("a.csv"), DataSourceRef::Node("a.csv".into()));
        let r: DataSourceRef = serde_json::from_str("\"/tmp/x.csv\"").unwrap();
        assert!(matches!(r, DataSourceRef::Path(_)));
    }

    #[test]
    fn test_validate_required_fields() {
        let err = OperationSpec::Avg { column: " ".into() }.validate().unwrap_err();
        assert!(matches!(err, CoreError::InvalidOperationSpec { .. }));
        assert!(OperationSpec::DeleteColumn { columns: vec![] }.validate().is_err());
        assert!(OperationSpec::Duplicate.validate().is_ok());
    }

    #[test]
    fn test_validate_non_working_day() {
        let op = OperationSpec::NonWorkingDay {
            column: "D".into(),
            weekdays: vec![5, 6],
            custom_dates: vec!["2023-12-01".into()],
        };
        assert!(op.validate().is_ok());
        let op = OperationSpec::NonWorkingDay {
            column: "D".into(),
            weekdays: vec![],
            custom_dates: vec!["202311-12-01".into()],
        };
        assert!(op.validate().is_err());
        let op = OperationSpec::NonWorkingDay {
            column: "D".into(),
            weekdays: vec![7],
            custom_dates: vec![],
        };
        assert!(op.validate().is_err());
    }

    #[test]
    fn test_validate_working_hours() {
        let ok = OperationSpec::OutsideWorkingHours {
            column: "D".into(),
            start: "09:00".into(),
            end: "17:00".into(),
        };
        assert!(ok.validate().is_ok());
        let bad = OperationSpec::OutsideWorkingHours {
            column: "D".into(),
            start: "9am".into(),
            end: "17:00".into(),
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_validate_formula() {
        let variables: IndexMap<String, String> =
            [("a".to_string(), "SALARY".to_string())].into_iter().collect();
        let ok = OperationSpec::MultipleCalculation {
            formula: "a * 2 ^ 2".into(),
            variables: variables.clone(),
        };
        assert!(ok.validate().is_ok());
        let unbound = OperationSpec::MultipleCalculation {
            formula: "a + b".into(),
            variables: variables.clone(),
        };
        assert!(matches!(unbound.validate(), Err(CoreError::Formula { .. })));
        let syntax = OperationSpec::MultipleCalculation {
            formula: "a +* 2".into(),
            variables,
        };
        assert!(matches!(syntax.validate(), Err(CoreError::Formula { .. })));
    }

    #[test]
    fn test_validate_compare_disjoint_columns() {
        let op = OperationSpec::Compare {
            source_1: "A".into(),
            source_2: "B".into(),
            matching_columns: vec!["ID".into()],
            compare_columns: vec!["ID".into()],
        };
        assert!(op.validate().is_err());
    }

    #[test]
    fn test_describe_formula_substitutes_columns() {
        let variables: IndexMap<String, String> = [
            ("a".to_string(), "SALARY".to_string()),
            ("b".to_string(), "BONUS".to_string()),
        ]
        .into_iter()
        .collect();
        let op = OperationSpec::MultipleCalculation {
            formula: "a+b*2".into(),
            variables,
        };
        assert_eq!(op.to_string(), "multiple_calculation with formula SALARY+BONUS*2");
    }

    #[test]
    fn test_describe_weekdays_by_name() {
        let op = OperationSpec::NonWorkingDay {
            column: "D".into(),
            weekdays: vec![5, 6],
            custom_dates: vec![],
        };
        assert_eq!(op.to_string(), "non_working_day on D with weekday(s) as Saturday, Sunday");
    }
}
