//! Plotly-compatible chart specifications.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use labpilot_core::types::{Dataset, PlotSpec, Scalar};

use crate::error::AnalysisError;

/// Supported chart kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlotType {
    Bar,
    Line,
    Scatter,
    Pie,
    Histogram,
    Box,
}

impl PlotType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlotType::Bar => "bar",
            PlotType::Line => "line",
            PlotType::Scatter => "scatter",
            PlotType::Pie => "pie",
            PlotType::Histogram => "histogram",
            PlotType::Box => "box",
        }
    }

    /// Whether the chart cannot be drawn without a y column.
    pub fn requires_y(&self) -> bool {
        matches!(self, PlotType::Line | PlotType::Scatter)
    }
}

impl fmt::Display for PlotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlotType {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bar" | "bar chart" => Ok(PlotType::Bar),
            "line" | "line chart" => Ok(PlotType::Line),
            "scatter" | "scatter plot" => Ok(PlotType::Scatter),
            "pie" | "pie chart" => Ok(PlotType::Pie),
            "histogram" | "hist" => Ok(PlotType::Histogram),
            "box" | "boxplot" | "box plot" => Ok(PlotType::Box),
            _ => Err(AnalysisError::UnsupportedPlotType(s.to_string())),
        }
    }
}

/// Parameters for one chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotRequest {
    pub plot_type: PlotType,
    pub x_column: String,
    #[serde(default)]
    pub y_column: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

/// Build the chart specification for `request` over `dataset`.
///
/// Bar and pie charts without a y column plot value counts of x. Histogram
/// plots the distribution of x; box plots x, split by nothing, or y grouped
/// by x when a y column is given.
pub fn plot(dataset: &Dataset, request: &PlotRequest) -> Result<PlotSpec, AnalysisError> {
    let x = request.x_column.as_str();
    if !dataset.has_column(x) {
        return Err(AnalysisError::UnknownColumn(x.to_string()));
    }
    let y = request.y_column.as_deref().filter(|y| !y.trim().is_empty());
    if let Some(y) = y {
        if !dataset.has_column(y) {
            return Err(AnalysisError::UnknownColumn(y.to_string()));
        }
    }
    if request.plot_type.requires_y() && y.is_none() {
        return Err(AnalysisError::InvalidParameter(format!(
            "a {} chart needs a y column",
            request.plot_type
        )));
    }

    let column = |name: &str| -> Vec<Value> {
        dataset
            .rows
            .iter()
            .map(|r| json!(r.get(name).unwrap_or(&Scalar::Null)))
            .collect()
    };

    let trace = match (request.plot_type, y) {
        (PlotType::Bar, Some(y)) => json!({"type": "bar", "x": column(x), "y": column(y)}),
        (PlotType::Bar, None) => {
            let (labels, counts) = value_counts(dataset, x);
            json!({"type": "bar", "x": labels, "y": counts})
        }
        (PlotType::Pie, Some(y)) => json!({"type": "pie", "labels": column(x), "values": column(y)}),
        (PlotType::Pie, None) => {
            let (labels, counts) = value_counts(dataset, x);
            json!({"type": "pie", "labels": labels, "values": counts})
        }
        (PlotType::Line, Some(y)) => {
            json!({"type": "scatter", "mode": "lines", "x": column(x), "y": column(y)})
        }
        (PlotType::Scatter, Some(y)) => {
            json!({"type": "scatter", "mode": "markers", "x": column(x), "y": column(y)})
        }
        (PlotType::Histogram, _) => json!({"type": "histogram", "x": column(x)}),
        (PlotType::Box, Some(y)) => json!({"type": "box", "x": column(x), "y": column(y)}),
        (PlotType::Box, None) => json!({"type": "box", "y": column(x), "name": x}),
        (PlotType::Line | PlotType::Scatter, None) => {
            return Err(AnalysisError::InvalidParameter(format!(
                "a {} chart needs a y column",
                request.plot_type
            )))
        }
    };

    let title = request
        .title
        .clone()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| default_title(request.plot_type, x, y));
    let y_title = match (request.plot_type, y) {
        (PlotType::Histogram, _) | (PlotType::Bar, None) => "count",
        (PlotType::Box, None) => x,
        (_, Some(y)) => y,
        (_, None) => "",
    };

    Ok(PlotSpec(json!({
        "data": [trace],
        "layout": {
            "title": {"text": title},
            "xaxis": {"title": {"text": x}},
            "yaxis": {"title": {"text": y_title}},
        },
    })))
}

fn default_title(plot_type: PlotType, x: &str, y: Option<&str>) -> String {
    match (plot_type, y) {
        (PlotType::Histogram, _) => format!("Distribution of {}", x),
        (PlotType::Box, None) => format!("Box plot of {}", x),
        (_, Some(y)) => format!("{} by {}", y, x),
        (_, None) => format!("Count of {}", x),
    }
}

/// Distinct non-null values of `column` with their counts, most frequent
/// first; ties keep first appearance.
fn value_counts(dataset: &Dataset, column: &str) -> (Vec<Value>, Vec<usize>) {
    let mut counts: Vec<(&Scalar, usize)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for value in dataset.rows.iter().filter_map(|r| r.get(column)) {
        if value.is_null() {
            continue;
        }
        let slot = *index.entry(value.group_key()).or_insert_with(|| {
            counts.push((value, 0));
            counts.len() - 1
        });
        counts[slot].1 += 1;
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts.into_iter().map(|(v, n)| (json!(v), n)).unzip()
}
