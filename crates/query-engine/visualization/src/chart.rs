//! Chart candidates.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::VisualizationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartType {
    Line,
    Bar,
    Pie,
    Scatter,
    CorrelationMatrix,
    Histogram,
    Box,
    Network,
    Table,
}

impl ChartType {
    pub fn name(self) -> &'static str {
        match self {
            ChartType::Line => "line",
            ChartType::Bar => "bar",
            ChartType::Pie => "pie",
            ChartType::Scatter => "scatter",
            ChartType::CorrelationMatrix => "correlation_matrix",
            ChartType::Histogram => "histogram",
            ChartType::Box => "box",
            ChartType::Network => "network",
            ChartType::Table => "table",
        }
    }
}

impl fmt::Display for ChartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ChartType {
    type Err = VisualizationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "line" | "time_series" => Ok(ChartType::Line),
            "bar" => Ok(ChartType::Bar),
            "pie" => Ok(ChartType::Pie),
            "scatter" => Ok(ChartType::Scatter),
            "correlation_matrix" | "correlation" | "heatmap" => Ok(ChartType::CorrelationMatrix),
            "histogram" => Ok(ChartType::Histogram),
            "box" | "box_plot" => Ok(ChartType::Box),
            "network" => Ok(ChartType::Network),
            "table" => Ok(ChartType::Table),
            other => Err(VisualizationError::UnknownChartType(other.to_string())),
        }
    }
}

/// A proposed chart: which result columns go where, and how well the chart
/// fits the result.
///
/// | chart              | `x`                 | `y`                              |
/// |--------------------|---------------------|----------------------------------|
/// | line               | temporal column     | one series per numeric column    |
/// | bar                | category            | numeric columns                  |
/// | pie                | category            | the value column, or none to count rows |
/// | scatter            | first numeric       | second numeric                   |
/// | correlation_matrix | none                | the numeric columns              |
/// | histogram          | the numeric column  | none                             |
/// | box                | category, or none   | the numeric column               |
/// | network            | edge source         | edge target                      |
/// | table              | none                | every column                     |
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSpec {
    pub chart_type: ChartType,
    pub x: Option<String>,
    pub y: Vec<String>,
    /// between 0 and 1; candidates are ranked on it
    pub confidence: f64,
}

impl ChartSpec {
    pub fn new(
        chart_type: ChartType,
        x: Option<&str>,
        y: impl IntoIterator<Item = impl Into<String>>,
        confidence: f64,
    ) -> Self {
        ChartSpec {
            chart_type,
            x: x.map(str::to_string),
            y: y.into_iter().map(Into::into).collect(),
            confidence,
        }
    }
}
