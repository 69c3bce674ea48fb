//! Group-by aggregation.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use labpilot_core::types::{Dataset, Record, Scalar, Table};

use crate::error::AnalysisError;

/// Reduction applied to each group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggFunc {
    #[default]
    Mean,
    Sum,
    /// Number of non-null values.
    Count,
    Min,
    Max,
    Median,
    /// Sample standard deviation.
    Std,
}

impl AggFunc {
    pub const ALL: [AggFunc; 7] = [
        AggFunc::Mean,
        AggFunc::Sum,
        AggFunc::Count,
        AggFunc::Min,
        AggFunc::Max,
        AggFunc::Median,
        AggFunc::Std,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AggFunc::Mean => "mean",
            AggFunc::Sum => "sum",
            AggFunc::Count => "count",
            AggFunc::Min => "min",
            AggFunc::Max => "max",
            AggFunc::Median => "median",
            AggFunc::Std => "std",
        }
    }

    /// Reduce one group's values.
    pub fn reduce(&self, values: &[&Scalar]) -> Scalar {
        if *self == AggFunc::Count {
            let n = values.iter().filter(|v| !v.is_null()).count();
            return Scalar::Number(n as f64);
        }

        let nums: Vec<f64> = values.iter().filter_map(|v| v.as_f64()).collect();
        let result = match self {
            AggFunc::Mean => mean(&nums),
            AggFunc::Sum => (!nums.is_empty()).then(|| nums.iter().sum()),
            AggFunc::Min => nums.iter().copied().reduce(f64::min),
            AggFunc::Max => nums.iter().copied().reduce(f64::max),
            AggFunc::Median => median(&nums),
            AggFunc::Std => sample_std(&nums),
            AggFunc::Count => None,
        };
        result.map(Scalar::from).unwrap_or(Scalar::Null)
    }
}

impl fmt::Display for AggFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggFunc {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mean" | "avg" | "average" => Ok(AggFunc::Mean),
            "sum" | "total" => Ok(AggFunc::Sum),
            "count" => Ok(AggFunc::Count),
            "min" | "minimum" => Ok(AggFunc::Min),
            "max" | "maximum" => Ok(AggFunc::Max),
            "median" => Ok(AggFunc::Median),
            "std" | "stddev" | "stdev" => Ok(AggFunc::Std),
            _ => Err(AnalysisError::UnsupportedAggregation(s.to_string())),
        }
    }
}

pub(crate) fn mean(nums: &[f64]) -> Option<f64> {
    if nums.is_empty() {
        None
    } else {
        Some(nums.iter().sum::<f64>() / nums.len() as f64)
    }
}

pub(crate) fn sample_std(nums: &[f64]) -> Option<f64> {
    if nums.len() < 2 {
        return None;
    }
    let m = mean(nums)?;
    let var = nums.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (nums.len() - 1) as f64;
    Some(var.sqrt())
}

/// Linear-interpolated quantile of already sorted values.
pub(crate) fn quantile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64))
}

pub(crate) fn sorted(nums: &[f64]) -> Vec<f64> {
    let mut out = nums.to_vec();
    out.sort_by(f64::total_cmp);
    out
}

fn median(nums: &[f64]) -> Option<f64> {
    quantile_sorted(&sorted(nums), 0.5)
}

static NULL: Scalar = Scalar::Null;

/// Group `dataset` rows by `group_column` and reduce `value_column`.
///
/// Output rows follow the first appearance of each group value. Rows whose
/// group value is null are left out. When both columns are the same, the
/// result column is named `<column>_<func>`.
pub fn aggregate(
    dataset: &Dataset,
    group_column: &str,
    value_column: &str,
    func: AggFunc,
) -> Result<Table, AnalysisError> {
    for column in [group_column, value_column] {
        if !dataset.has_column(column) {
            return Err(AnalysisError::UnknownColumn(column.to_string()));
        }
    }

    let mut order: Vec<Scalar> = Vec::new();
    let mut groups: HashMap<String, Vec<&Scalar>> = HashMap::new();
    for row in &dataset.rows {
        let Some(key) = row.get(group_column).filter(|v| !v.is_null()) else {
            continue;
        };
        let value = row.get(value_column).unwrap_or(&NULL);
        groups
            .entry(key.group_key())
            .or_insert_with(|| {
                order.push(key.clone());
                Vec::new()
            })
            .push(value);
    }

    let output_column = if group_column == value_column {
        format!("{}_{}", value_column, func)
    } else {
        value_column.to_string()
    };

    let rows = order
        .into_iter()
        .map(|key| {
            let reduced = groups
                .get(&key.group_key())
                .map(|values| func.reduce(values))
                .unwrap_or(Scalar::Null);
            Record::from([
                (group_column.to_string(), key),
                (output_column.clone(), reduced),
            ])
        })
        .collect();

    Ok(Table::new(
        vec![group_column.to_string(), output_column],
        rows,
    ))
}
