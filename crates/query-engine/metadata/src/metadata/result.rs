//! The shape of a query result: a typed column schema and rows of tagged values.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;

use super::database::ScalarType;

/// A single result cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Exact numerics, serialized as a string so no digits are lost.
    Decimal(Decimal),
    Text(String),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    TimestampWithTimeZone(DateTime<Utc>),
    Json(serde_json::Value),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Decimal(d) => d.to_f64(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Decimal(d) => write!(f, "{d}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Date(d) => write!(f, "{d}"),
            Value::Time(t) => write!(f, "{t}"),
            Value::Timestamp(ts) => write!(f, "{ts}"),
            Value::TimestampWithTimeZone(ts) => write!(f, "{}", ts.to_rfc3339()),
            Value::Json(json) => write!(f, "{json}"),
        }
    }
}

/// A result column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub name: String,
    pub scalar_type: ScalarType,
}

impl Column {
    pub fn new(name: impl Into<String>, scalar_type: ScalarType) -> Self {
        Column {
            name: name.into(),
            scalar_type,
        }
    }
}

/// The materialized result of running an approved statement.
///
/// `row_count` never exceeds the configured row cap; when rows were dropped to
/// respect it, `truncated` is set.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Value>>,
    pub row_count: usize,
    pub execution_time: Duration,
    pub truncated: bool,
}

impl ExecutionResult {
    pub fn new(columns: Vec<Column>, rows: Vec<Vec<Value>>) -> Self {
        let row_count = rows.len();
        ExecutionResult {
            columns,
            rows,
            row_count,
            execution_time: Duration::ZERO,
            truncated: false,
        }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.name == name)
    }

    /// The values of one column, in row order.
    pub fn column_values(&self, index: usize) -> impl Iterator<Item = &Value> + '_ {
        self.rows.iter().filter_map(move |row| row.get(index))
    }

    /// Column names made unique for use as record keys. A repeated name gets
    /// the suffix `_2`, `_3` and so on, skipping names already taken.
    pub fn record_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = Vec::with_capacity(self.columns.len());
        for column in &self.columns {
            let mut key = column.name.clone();
            let mut suffix = 1;
            while keys.contains(&key)
                || (suffix > 1 && self.columns.iter().any(|c| c.name == key))
            {
                suffix += 1;
                key = format!("{}_{suffix}", column.name);
            }
            keys.push(key);
        }
        keys
    }

    /// The rows as JSON objects keyed by [`ExecutionResult::record_keys`].
    pub fn records(&self) -> Vec<serde_json::Map<String, serde_json::Value>> {
        let keys = self.record_keys();
        self.rows
            .iter()
            .map(|row| {
                keys.iter()
                    .zip(row)
                    .map(|(key, value)| {
                        (
                            key.clone(),
                            serde_json::to_value(value).unwrap_or(serde_json::Value::Null),
                        )
                    })
                    .collect()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use similar_asserts::assert_eq;

    #[test]
    fn records_are_keyed_by_column_name() {
        let result = ExecutionResult::new(
            vec![
                Column::new("store_id", ScalarType::Integer),
                Column::new("opened", ScalarType::Date),
            ],
            vec![vec![
                Value::Int(1),
                Value::Date(NaiveDate::from_ymd_opt(2005, 5, 24).unwrap()),
            ]],
        );

        assert_eq!(
            serde_json::Value::Array(
                result
                    .records()
                    .into_iter()
                    .map(serde_json::Value::Object)
                    .collect()
            ),
            serde_json::json!([{ "store_id": 1, "opened": "2005-05-24" }])
        );
    }

    #[test]
    fn repeated_column_names_get_distinct_keys() {
        let result = ExecutionResult::new(
            vec![
                Column::new("count", ScalarType::Integer),
                Column::new("count", ScalarType::Integer),
                Column::new("count_2", ScalarType::Integer),
            ],
            vec![vec![Value::Int(1), Value::Int(2), Value::Int(3)]],
        );

        assert_eq!(result.record_keys(), vec!["count", "count_3", "count_2"]);
        assert_eq!(
            serde_json::Value::Object(result.records().remove(0)),
            serde_json::json!({ "count": 1, "count_3": 2, "count_2": 3 })
        );
    }

    #[test]
    fn decimals_keep_every_digit() {
        let amount: Decimal = "12345678901234.99".parse().unwrap();
        let result = ExecutionResult::new(
            vec![Column::new("amount", ScalarType::Decimal)],
            vec![vec![Value::Decimal(amount)]],
        );

        assert_eq!(
            serde_json::Value::Object(result.records().remove(0)),
            serde_json::json!({ "amount": "12345678901234.99" })
        );
        assert_eq!(Value::Decimal(Decimal::new(25, 1)).as_f64(), Some(2.5));
    }
}
