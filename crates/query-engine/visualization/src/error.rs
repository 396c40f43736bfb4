use thiserror::Error;

use crate::chart::ChartType;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VisualizationError {
    #[error("a {chart_type} chart does not fit this result: {reason}")]
    Incompatible {
        chart_type: ChartType,
        reason: String,
    },
    #[error("unknown chart type: {0}")]
    UnknownChartType(String),
}
