//! Rank chart candidates for a result.

use nl_sql_configuration::VisualizationSettings;
use query_engine_metadata::metadata::ExecutionResult;

use crate::chart::{ChartSpec, ChartType};
use crate::classify::{profile_columns, ColumnClass, ColumnProfile};
use crate::error::VisualizationError;

const LINE: f64 = 0.95;
const MULTI_SERIES_LINE: f64 = 0.85;
const BAR: f64 = 0.85;
const HIGH_CARDINALITY_BAR: f64 = 0.55;
const SCATTER: f64 = 0.75;
const CORRELATION_MATRIX: f64 = 0.65;
const PIE: f64 = 0.6;
const HISTOGRAM: f64 = 0.6;
const BOX: f64 = 0.5;
/// A lone measure needs this many rows before its spread is worth a box.
const BOX_MIN_ROWS: usize = 5;
const NETWORK: f64 = 0.3;
const TABLE: f64 = 0.1;

/// Order in which candidates of equal confidence are listed.
const CHART_TYPES: [ChartType; 9] = [
    ChartType::Line,
    ChartType::Bar,
    ChartType::Scatter,
    ChartType::CorrelationMatrix,
    ChartType::Pie,
    ChartType::Histogram,
    ChartType::Box,
    ChartType::Network,
    ChartType::Table,
];

/// Proposing is stricter than generating: a chart the caller asked for only
/// needs to be drawable, a proposed one needs to be a good fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Propose,
    Generate,
}

struct Shape<'a> {
    columns: &'a [ColumnProfile],
    temporal: Vec<&'a ColumnProfile>,
    low: Vec<&'a ColumnProfile>,
    high: Vec<&'a ColumnProfile>,
    numeric: Vec<&'a ColumnProfile>,
    id_like: Vec<&'a ColumnProfile>,
    rows: usize,
}

impl<'a> Shape<'a> {
    fn new(columns: &'a [ColumnProfile], rows: usize) -> Self {
        let of = |class: ColumnClass| -> Vec<&'a ColumnProfile> {
            columns.iter().filter(|c| c.class == class).collect()
        };
        Shape {
            columns,
            temporal: of(ColumnClass::Temporal),
            low: of(ColumnClass::CategoricalLow),
            high: of(ColumnClass::CategoricalHigh),
            numeric: of(ColumnClass::Numeric),
            id_like: columns.iter().filter(|c| c.id_like).collect(),
            rows,
        }
    }

    fn has_categories(&self) -> bool {
        !self.low.is_empty() || !self.high.is_empty()
    }
}

fn names<'a>(columns: &[&'a ColumnProfile]) -> Vec<&'a str> {
    columns.iter().map(|c| c.name.as_str()).collect()
}

/// Chooses charts for results, using the configured cardinality limits.
#[derive(Debug, Clone, Default)]
pub struct Selector {
    settings: VisualizationSettings,
}

impl Selector {
    pub fn new(settings: VisualizationSettings) -> Self {
        Selector { settings }
    }

    pub fn profile(&self, result: &ExecutionResult) -> Vec<ColumnProfile> {
        profile_columns(result, &self.settings)
    }

    /// Every chart that fits the result, best first. A table is always
    /// among them, last.
    pub fn analyze(&self, result: &ExecutionResult) -> Vec<ChartSpec> {
        let profiles = self.profile(result);
        let shape = Shape::new(&profiles, result.row_count);
        let mut candidates: Vec<ChartSpec> = CHART_TYPES
            .iter()
            .filter_map(|chart_type| self.candidate(&shape, *chart_type, Mode::Propose).ok())
            .collect();
        // stable, so ties keep the CHART_TYPES order
        candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        tracing::debug!(
            candidates = ?candidates.iter().map(|c| c.chart_type.name()).collect::<Vec<_>>(),
            "ranked chart candidates"
        );
        candidates
    }

    /// The chart of the requested type for this result. A pie with too many
    /// slices is drawn as a bar chart instead.
    pub fn generate(
        &self,
        result: &ExecutionResult,
        chart_type: ChartType,
    ) -> Result<ChartSpec, VisualizationError> {
        let profiles = self.profile(result);
        let shape = Shape::new(&profiles, result.row_count);
        match self.candidate(&shape, chart_type, Mode::Generate) {
            Ok(spec) => Ok(spec),
            Err(Unfit::TooManySlices) => {
                tracing::debug!("too many slices for a pie chart, using a bar chart");
                self.candidate(&shape, ChartType::Bar, Mode::Generate)
                    .map_err(|unfit| incompatible(ChartType::Pie, &unfit))
            }
            Err(unfit) => Err(incompatible(chart_type, &unfit)),
        }
    }

    fn candidate(
        &self,
        shape: &Shape<'_>,
        chart_type: ChartType,
        mode: Mode,
    ) -> Result<ChartSpec, Unfit> {
        if shape.rows == 0 && chart_type != ChartType::Table {
            return Err(Unfit::Empty);
        }
        match chart_type {
            ChartType::Line => {
                let (Some(x), false) = (shape.temporal.first(), shape.numeric.is_empty()) else {
                    return Err(Unfit::Needs("a date or time column and a numeric column"));
                };
                let confidence = if shape.temporal.len() == 1 && shape.numeric.len() == 1 {
                    LINE
                } else {
                    MULTI_SERIES_LINE
                };
                Ok(ChartSpec::new(
                    chart_type,
                    Some(x.name.as_str()),
                    names(&shape.numeric),
                    confidence,
                ))
            }
            ChartType::Bar => {
                if shape.numeric.is_empty() {
                    return Err(Unfit::Needs("a category column and a numeric column"));
                }
                let (x, confidence) = match (shape.low.first(), shape.high.first()) {
                    (Some(x), _) => (x, BAR),
                    (None, Some(x)) => (x, HIGH_CARDINALITY_BAR),
                    (None, None) => {
                        return Err(Unfit::Needs("a category column and a numeric column"))
                    }
                };
                Ok(ChartSpec::new(
                    chart_type,
                    Some(x.name.as_str()),
                    names(&shape.numeric),
                    confidence,
                ))
            }
            ChartType::Pie => self.pie(shape, mode),
            ChartType::Scatter => {
                if shape.numeric.len() < 2 || (mode == Mode::Propose && shape.has_categories()) {
                    return Err(Unfit::Needs("two numeric columns and no categories"));
                }
                Ok(ChartSpec::new(
                    chart_type,
                    Some(shape.numeric[0].name.as_str()),
                    [shape.numeric[1].name.as_str()],
                    SCATTER,
                ))
            }
            ChartType::CorrelationMatrix => {
                let needed = match mode {
                    Mode::Propose => 3,
                    Mode::Generate => 2,
                };
                if shape.numeric.len() < needed || (mode == Mode::Propose && shape.has_categories())
                {
                    return Err(Unfit::Needs("several numeric columns"));
                }
                Ok(ChartSpec::new(
                    chart_type,
                    None,
                    names(&shape.numeric),
                    CORRELATION_MATRIX,
                ))
            }
            ChartType::Histogram => {
                let Some(x) = shape.numeric.first() else {
                    return Err(Unfit::Needs("a numeric column"));
                };
                if mode == Mode::Propose
                    && (shape.numeric.len() > 1 || shape.has_categories() || !shape.temporal.is_empty())
                {
                    return Err(Unfit::Needs("a single numeric column"));
                }
                Ok(ChartSpec::new(
                    chart_type,
                    Some(x.name.as_str()),
                    Vec::<String>::new(),
                    HISTOGRAM,
                ))
            }
            ChartType::Box => Self::box_plot(shape, mode),
            ChartType::Network => {
                let pair = match (mode, shape.id_like.as_slice(), shape.columns) {
                    (_, [source, target, ..], _) => (*source, *target),
                    (Mode::Generate, _, [source, target]) => (source, target),
                    _ => return Err(Unfit::Needs("two key columns")),
                };
                let (source, target) = pair;
                Ok(ChartSpec::new(
                    chart_type,
                    Some(source.name.as_str()),
                    [target.name.as_str()],
                    NETWORK,
                ))
            }
            ChartType::Table => Ok(ChartSpec::new(
                chart_type,
                None,
                shape.columns.iter().map(|c| c.name.as_str()),
                TABLE,
            )),
        }
    }

    /// The spread of a measure, per category when a category has several rows
    /// to each value.
    fn box_plot(shape: &Shape<'_>, mode: Mode) -> Result<ChartSpec, Unfit> {
        let Some(measure) = shape.numeric.first() else {
            return Err(Unfit::Needs("a numeric column"));
        };
        let group = shape.low.first();
        if mode == Mode::Propose && !shape.temporal.is_empty() {
            return Err(Unfit::Needs("no date or time column"));
        }
        let fits = match group {
            Some(group) => group.distinct * 2 <= shape.rows,
            None => {
                shape.numeric.len() == 1 && shape.high.is_empty() && shape.rows >= BOX_MIN_ROWS
            }
        };
        if mode == Mode::Propose && !fits {
            return Err(Unfit::Needs("several values of a measure per category"));
        }
        Ok(ChartSpec::new(
            ChartType::Box,
            group.map(|g| g.name.as_str()),
            [measure.name.as_str()],
            BOX,
        ))
    }

    fn pie(&self, shape: &Shape<'_>, mode: Mode) -> Result<ChartSpec, Unfit> {
        // a single category column is counted row by row
        if let ([category], [only]) = (shape.low.as_slice(), shape.columns) {
            if category.index == only.index {
                return self.slices(category).map(|()| {
                    ChartSpec::new(ChartType::Pie, Some(category.name.as_str()), Vec::<String>::new(), PIE)
                });
            }
        }

        let (Some(category), Some(value)) = (shape.low.first(), shape.numeric.first()) else {
            return match (mode, shape.high.first(), shape.numeric.first()) {
                (Mode::Generate, Some(_), Some(_)) => Err(Unfit::TooManySlices),
                _ => Err(Unfit::Needs("a category column and a numeric column")),
            };
        };
        self.slices(category)?;
        if !value.is_proportion_like(self.settings.proportion_tolerance) {
            return Err(Unfit::Needs("values that are shares of a whole"));
        }
        Ok(ChartSpec::new(
            ChartType::Pie,
            Some(category.name.as_str()),
            [value.name.as_str()],
            PIE,
        ))
    }

    fn slices(&self, category: &ColumnProfile) -> Result<(), Unfit> {
        if category.distinct > self.settings.pie_max_slices {
            Err(Unfit::TooManySlices)
        } else {
            Ok(())
        }
    }
}

/// Why a chart type does not fit.
#[derive(Debug)]
enum Unfit {
    Empty,
    TooManySlices,
    Needs(&'static str),
}

fn incompatible(chart_type: ChartType, unfit: &Unfit) -> VisualizationError {
    let reason = match unfit {
        Unfit::Empty => "the result has no rows".to_string(),
        Unfit::TooManySlices => "too many categories for a pie chart".to_string(),
        Unfit::Needs(what) => format!("it needs {what}"),
    };
    VisualizationError::Incompatible { chart_type, reason }
}
