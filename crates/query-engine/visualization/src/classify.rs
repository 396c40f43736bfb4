//! Column profiling and classification.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use nl_sql_configuration::VisualizationSettings;
use query_engine_metadata::metadata::{ExecutionResult, ScalarType, Value};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnClass {
    Temporal,
    /// few enough distinct values to group on
    CategoricalLow,
    CategoricalHigh,
    /// numbers that can be aggregated or plotted on a continuous axis
    Numeric,
    /// keys with too many distinct values to group on
    Identifier,
}

/// What one result column looks like.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnProfile {
    pub index: usize,
    pub name: String,
    pub class: ColumnClass,
    /// distinct non-null values
    pub distinct: usize,
    pub non_null: usize,
    /// whether the name or type marks the column as a key
    pub id_like: bool,
    /// sum of the values, for numeric columns
    pub sum: Option<f64>,
    /// every value is a whole number of zero or more
    pub count_like: bool,
}

impl ColumnProfile {
    /// Sums to one within the tolerance, or counts something. Such a column
    /// can be read as shares of a whole.
    pub fn is_proportion_like(&self, tolerance: f64) -> bool {
        self.class == ColumnClass::Numeric
            && (self.count_like || self.sum.is_some_and(|sum| (sum - 1.0).abs() <= tolerance))
    }
}

pub fn is_id_like(name: &str, scalar_type: ScalarType) -> bool {
    let name = name.to_ascii_lowercase();
    scalar_type == ScalarType::Uuid || name == "id" || name.ends_with("_id")
}

fn is_iso_temporal(text: &str) -> bool {
    let text = text.trim();
    NaiveDate::parse_from_str(text, "%Y-%m-%d").is_ok()
        || NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
        || NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f").is_ok()
        || DateTime::parse_from_rfc3339(text).is_ok()
}

/// Profile every column of a result.
pub fn profile_columns(
    result: &ExecutionResult,
    settings: &VisualizationSettings,
) -> Vec<ColumnProfile> {
    result
        .columns
        .iter()
        .enumerate()
        .map(|(index, column)| {
            let values: Vec<&Value> = result
                .column_values(index)
                .filter(|value| !value.is_null())
                .collect();
            let distinct = values
                .iter()
                .map(ToString::to_string)
                .collect::<BTreeSet<_>>()
                .len();
            let id_like = is_id_like(&column.name, column.scalar_type);

            let numeric = column.scalar_type.is_numeric()
                || (column.scalar_type == ScalarType::Any
                    && !values.is_empty()
                    && values.iter().all(|value| value.as_f64().is_some()));
            let temporal = column.scalar_type.is_temporal()
                || (matches!(column.scalar_type, ScalarType::Text | ScalarType::Any)
                    && !values.is_empty()
                    && values
                        .iter()
                        .all(|value| value.as_str().is_some_and(is_iso_temporal)));

            let class = if temporal {
                ColumnClass::Temporal
            } else if id_like {
                if distinct > settings.low_cardinality_max {
                    ColumnClass::Identifier
                } else {
                    ColumnClass::CategoricalLow
                }
            } else if numeric {
                ColumnClass::Numeric
            } else if distinct <= settings.low_cardinality_max {
                ColumnClass::CategoricalLow
            } else {
                ColumnClass::CategoricalHigh
            };

            let numbers: Vec<f64> = values.iter().filter_map(|value| value.as_f64()).collect();
            let sum = (class == ColumnClass::Numeric).then(|| numbers.iter().sum());
            let count_like = class == ColumnClass::Numeric
                && !numbers.is_empty()
                && numbers.iter().all(|n| *n >= 0.0 && n.fract() == 0.0);

            ColumnProfile {
                index,
                name: column.name.clone(),
                class,
                distinct,
                non_null: values.len(),
                id_like,
                sum,
                count_like,
            }
        })
        .collect()
}
