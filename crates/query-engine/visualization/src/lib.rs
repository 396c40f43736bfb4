//! Propose charts that fit the shape of a query result.
//!
//! Every column is profiled and classified, then a fixed set of rules turns
//! the mix of column classes into ranked [`ChartSpec`] candidates. Nothing
//! here looks at the question that was asked, only at the result.

pub mod chart;
pub mod classify;
pub mod error;
pub mod selector;

pub use chart::{ChartSpec, ChartType};
pub use classify::{ColumnClass, ColumnProfile};
pub use error::VisualizationError;
pub use selector::Selector;
