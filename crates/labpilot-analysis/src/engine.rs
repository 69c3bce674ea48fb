//! The analysis engine seam and its in-process implementation.

use tracing::debug;

use labpilot_core::types::{Dataset, PlotSpec, Table};

use crate::aggregate::{self, AggFunc};
use crate::describe::{self, Description};
use crate::error::AnalysisError;
use crate::expr::Expr;
use crate::plot::{self, PlotRequest};

/// Tabular analysis operations over one immutable dataset.
///
/// Implementations never mutate the dataset. All failures are
/// [`AnalysisError`]s, which callers treat as validation errors.
pub trait AnalysisEngine: Send + Sync {
    /// Rows matching a boolean expression, with the dataset's column order.
    fn filter(&self, dataset: &Dataset, expression: &str) -> Result<Table, AnalysisError>;

    /// Group by one column and reduce another.
    fn aggregate(
        &self,
        dataset: &Dataset,
        group_column: &str,
        value_column: &str,
        func: AggFunc,
    ) -> Result<Table, AnalysisError>;

    /// Summary statistics for every column.
    fn describe(&self, dataset: &Dataset) -> Result<Description, AnalysisError>;

    /// A chart specification.
    fn plot(&self, dataset: &Dataset, request: &PlotRequest) -> Result<PlotSpec, AnalysisError>;
}

/// Default engine: evaluates everything in-process over the row records.
#[derive(Debug, Clone, Copy, Default)]
pub struct TabularEngine;

impl TabularEngine {
    pub fn new() -> Self {
        Self
    }
}

impl AnalysisEngine for TabularEngine {
    fn filter(&self, dataset: &Dataset, expression: &str) -> Result<Table, AnalysisError> {
        let expr = Expr::parse(expression)?;
        expr.validate(dataset)?;

        let rows: Vec<_> = dataset
            .rows
            .iter()
            .filter(|row| expr.matches(row))
            .cloned()
            .collect();
        debug!(
            dataset_id = %dataset.id,
            matched = rows.len(),
            total = dataset.row_count(),
            "Filter evaluated"
        );
        Ok(Table::new(dataset.column_names(), rows))
    }

    fn aggregate(
        &self,
        dataset: &Dataset,
        group_column: &str,
        value_column: &str,
        func: AggFunc,
    ) -> Result<Table, AnalysisError> {
        let table = aggregate::aggregate(dataset, group_column, value_column, func)?;
        debug!(
            dataset_id = %dataset.id,
            group_column,
            value_column,
            func = %func,
            groups = table.row_count(),
            "Aggregation evaluated"
        );
        Ok(table)
    }

    fn describe(&self, dataset: &Dataset) -> Result<Description, AnalysisError> {
        Ok(describe::describe(dataset))
    }

    fn plot(&self, dataset: &Dataset, request: &PlotRequest) -> Result<PlotSpec, AnalysisError> {
        plot::plot(dataset, request)
    }
}
