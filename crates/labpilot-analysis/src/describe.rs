//! Descriptive statistics per column.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use labpilot_core::types::{ColumnType, Dataset, Record, Scalar, Table};

use crate::aggregate::{mean, quantile_sorted, sample_std, sorted};

/// Number of most frequent values listed for categorical columns.
pub const TOP_VALUES: usize = 5;

/// Statistics for every column, as a nested mapping and as a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Description {
    /// Column name to statistic name to value.
    pub summary: Value,
    /// One row per column.
    pub table: Table,
}

const TABLE_COLUMNS: [&str; 13] = [
    "column", "type", "count", "mean", "std", "min", "25%", "50%", "75%", "max", "unique", "top",
    "freq",
];

/// Describe every column of `dataset`.
///
/// Numeric columns get count, mean, sample std, min, quartiles and max.
/// Other columns get the non-null count, distinct count, the most frequent
/// value with its frequency, and the top values.
pub fn describe(dataset: &Dataset) -> Description {
    let mut summary = Map::new();
    let mut rows = Vec::with_capacity(dataset.columns.len());

    for column in &dataset.columns {
        let values: Vec<&Scalar> = dataset
            .rows
            .iter()
            .filter_map(|r| r.get(&column.name))
            .collect();

        let mut row = Record::new();
        for name in TABLE_COLUMNS {
            row.insert(name.to_string(), Scalar::Null);
        }
        row.insert("column".to_string(), Scalar::from(column.name.as_str()));
        row.insert(
            "type".to_string(),
            Scalar::from(column_type_name(column.column_type)),
        );

        let stats = if column.column_type.is_numeric() {
            numeric_stats(&values, &mut row)
        } else {
            categorical_stats(&values, &mut row)
        };
        summary.insert(column.name.clone(), stats);
        rows.push(row);
    }

    Description {
        summary: Value::Object(summary),
        table: Table::new(TABLE_COLUMNS.iter().map(|c| c.to_string()).collect(), rows),
    }
}

fn column_type_name(t: ColumnType) -> &'static str {
    match t {
        ColumnType::Number => "number",
        ColumnType::Boolean => "boolean",
        ColumnType::String => "string",
        ColumnType::Null => "null",
    }
}

fn numeric_stats(values: &[&Scalar], row: &mut Record) -> Value {
    let nums: Vec<f64> = values.iter().filter_map(|v| v.as_f64()).collect();
    let s = sorted(&nums);

    let fields = [
        ("count", Some(nums.len() as f64)),
        ("mean", mean(&nums)),
        ("std", sample_std(&nums)),
        ("min", s.first().copied()),
        ("25%", quantile_sorted(&s, 0.25)),
        ("50%", quantile_sorted(&s, 0.5)),
        ("75%", quantile_sorted(&s, 0.75)),
        ("max", s.last().copied()),
    ];

    let mut stats = Map::new();
    for (name, value) in fields {
        let scalar = value.map(Scalar::from).unwrap_or(Scalar::Null);
        stats.insert(name.to_string(), json!(scalar));
        row.insert(name.to_string(), scalar);
    }
    Value::Object(stats)
}

fn categorical_stats(values: &[&Scalar], row: &mut Record) -> Value {
    let present: Vec<&Scalar> = values.iter().copied().filter(|v| !v.is_null()).collect();

    // (value, count) in first-appearance order.
    let mut counts: Vec<(Scalar, usize)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for v in &present {
        let slot = *index.entry(v.group_key()).or_insert_with(|| {
            counts.push(((*v).clone(), 0));
            counts.len() - 1
        });
        counts[slot].1 += 1;
    }
    // Stable: ties keep first appearance.
    counts.sort_by(|a, b| b.1.cmp(&a.1));

    let count = present.len();
    let unique = counts.len();
    let top = counts.first().map(|(v, _)| v.clone()).unwrap_or(Scalar::Null);
    let freq = counts.first().map(|(_, n)| *n);

    row.insert("count".to_string(), Scalar::from(count as i64));
    row.insert("unique".to_string(), Scalar::from(unique as i64));
    row.insert("top".to_string(), top.clone());
    row.insert(
        "freq".to_string(),
        freq.map(|n| Scalar::from(n as i64)).unwrap_or(Scalar::Null),
    );

    let top_values: Vec<Value> = counts
        .iter()
        .take(TOP_VALUES)
        .map(|(v, n)| json!({"value": v, "count": n}))
        .collect();

    json!({
        "count": count,
        "unique": unique,
        "top": top,
        "freq": freq,
        "top_values": top_values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use labpilot_core::types::{DatasetId, NewDataset};

    fn dataset() -> Dataset {
        let rows = vec![
            ("BRCA1", 1.0, "up"),
            ("TP53", 2.0, "down"),
            ("EGFR", 3.0, "up"),
            ("MYC", 4.0, "up"),
        ]
        .into_iter()
        .map(|(g, e, d)| {
            Record::from([
                ("gene".to_string(), Scalar::from(g)),
                ("expr".to_string(), Scalar::from(e)),
                ("dir".to_string(), Scalar::from(d)),
            ])
        })
        .collect();
        Dataset::build(
            DatasetId::new("d"),
            NewDataset::new("t", vec!["gene".into(), "expr".into(), "dir".into()], rows),
        )
        .unwrap()
    }

    #[test]
    fn test_numeric_summary() {
        let d = describe(&dataset());
        let expr = &d.summary["expr"];
        assert_eq!(expr["count"], json!(4.0));
        assert_eq!(expr["mean"], json!(2.5));
        assert_eq!(expr["min"], json!(1.0));
        assert_eq!(expr["25%"], json!(1.75));
        assert_eq!(expr["50%"], json!(2.5));
        assert_eq!(expr["75%"], json!(3.25));
        assert_eq!(expr["max"], json!(4.0));
        let std = expr["std"].as_f64().unwrap();
        assert!((std - 1.2909944487358056).abs() < 1e-12);
    }

    #[test]
    fn test_categorical_summary() {
        let d = describe(&dataset());
        let dir = &d.summary["dir"];
        assert_eq!(dir["count"], json!(4));
        assert_eq!(dir["unique"], json!(2));
        assert_eq!(dir["top"], json!("up"));
        assert_eq!(dir["freq"], json!(3));
        assert_eq!(dir["top_values"][1], json!({"value": "down", "count": 1}));
    }

    #[test]
    fn test_table_has_one_row_per_column() {
        let d = describe(&dataset());
        assert_eq!(d.table.row_count(), 3);
        assert_eq!(d.table.columns.len(), TABLE_COLUMNS.len());
        assert_eq!(d.table.rows[0]["column"], Scalar::from("gene"));
        assert_eq!(d.table.rows[1]["type"], Scalar::from("number"));
        assert_eq!(d.table.rows[1]["unique"], Scalar::Null);
        assert_eq!(d.table.rows[2]["mean"], Scalar::Null);
        for row in &d.table.rows {
            assert_eq!(row.len(), TABLE_COLUMNS.len());
        }
    }

    #[test]
    fn test_empty_dataset() {
        let ds = Dataset::build(
            DatasetId::new("d"),
            NewDataset::new("t", vec!["a".into()], vec![]),
        )
        .unwrap();
        let d = describe(&ds);
        assert_eq!(d.summary["a"]["count"], json!(0));
        assert_eq!(d.summary["a"]["top"], Value::Null);
    }
}
