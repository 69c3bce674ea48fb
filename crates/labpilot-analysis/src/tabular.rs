//! Parsing uploaded tabular files into [`NewDataset`]s.
//!
//! [`TabularParser`] is the file-format seam. [`CsvParser`] reads
//! comma- and tab-separated text with the `csv` crate. [`TabularLoader`]
//! picks a parser by file extension.

use std::collections::BTreeSet;

use tracing::debug;

use labpilot_core::types::{NewDataset, Record, Scalar};

use crate::error::AnalysisError;

/// Turns the bytes of an uploaded file into a dataset description.
pub trait TabularParser: Send + Sync {
    /// Lowercase file extensions this parser reads, without the dot.
    fn extensions(&self) -> &[&'static str];

    fn parse(&self, name: &str, bytes: &[u8]) -> Result<NewDataset, AnalysisError>;
}

// =============================================================================
// CSV
// =============================================================================

/// Delimited-text parser. `.tsv` files are tab-separated, everything else
/// comma-separated.
///
/// The first record is the header. Blank headers become `Unnamed: <i>` and
/// repeated headers get a `.1`, `.2` suffix. Each column is typed as a whole:
/// numeric if every non-empty cell parses as a number, boolean if every one
/// is `true`/`false`, text otherwise. Empty cells are null.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvParser;

impl CsvParser {
    pub fn new() -> Self {
        Self
    }
}

impl TabularParser for CsvParser {
    fn extensions(&self) -> &[&'static str] {
        &["csv", "tsv", "txt"]
    }

    fn parse(&self, name: &str, bytes: &[u8]) -> Result<NewDataset, AnalysisError> {
        let delimiter = if extension(name).as_deref() == Some("tsv") {
            b'\t'
        } else {
            b','
        };
        let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(bytes);

        let headers = reader.headers().map_err(unreadable)?.clone();
        if headers.iter().all(str::is_empty) {
            return Err(AnalysisError::UnreadableFile(
                "file has no header row".to_string(),
            ));
        }
        let columns = column_names(headers.iter());

        let mut cells: Vec<Vec<String>> = Vec::new();
        for (i, record) in reader.records().enumerate() {
            let record = record.map_err(unreadable)?;
            if record.iter().all(str::is_empty) {
                continue;
            }
            if record.len() > columns.len() {
                return Err(AnalysisError::UnreadableFile(format!(
                    "line {} has {} fields, expected {}",
                    i + 2,
                    record.len(),
                    columns.len()
                )));
            }
            cells.push(record.iter().map(str::to_string).collect());
        }

        let kinds: Vec<CellKind> = (0..columns.len())
            .map(|c| column_kind(cells.iter().filter_map(|row| row.get(c))))
            .collect();

        let rows: Vec<Record> = cells
            .into_iter()
            .map(|row| {
                columns
                    .iter()
                    .zip(&kinds)
                    .enumerate()
                    .map(|(c, (column, kind))| {
                        let value = row.get(c).map(|raw| kind.convert(raw)).unwrap_or(Scalar::Null);
                        (column.clone(), value)
                    })
                    .collect()
            })
            .collect();

        debug!(name, columns = columns.len(), rows = rows.len(), "Parsed delimited file");
        Ok(NewDataset::new(name, columns, rows))
    }
}

fn unreadable(err: csv::Error) -> AnalysisError {
    AnalysisError::UnreadableFile(err.to_string())
}

fn column_names<'a>(headers: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut names = Vec::new();
    for (i, header) in headers.enumerate() {
        let base = if header.is_empty() {
            format!("Unnamed: {}", i)
        } else {
            header.to_string()
        };
        let mut name = base.clone();
        let mut suffix = 1;
        while !seen.insert(name.clone()) {
            name = format!("{}.{}", base, suffix);
            suffix += 1;
        }
        names.push(name);
    }
    names
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CellKind {
    Number,
    Bool,
    Text,
}

impl CellKind {
    fn convert(self, raw: &str) -> Scalar {
        if raw.is_empty() {
            return Scalar::Null;
        }
        match self {
            CellKind::Number => raw.parse::<f64>().map(Scalar::from).unwrap_or(Scalar::Null),
            CellKind::Bool => parse_bool(raw).map(Scalar::Bool).unwrap_or(Scalar::Null),
            CellKind::Text => Scalar::Text(raw.to_string()),
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

fn column_kind<'a>(values: impl Iterator<Item = &'a String>) -> CellKind {
    let mut numeric = true;
    let mut boolean = true;
    let mut any = false;
    for raw in values.filter(|v| !v.is_empty()) {
        any = true;
        numeric &= raw.parse::<f64>().is_ok();
        boolean &= parse_bool(raw).is_some();
    }
    match (any, numeric, boolean) {
        (false, _, _) => CellKind::Text,
        (true, true, _) => CellKind::Number,
        (true, false, true) => CellKind::Bool,
        _ => CellKind::Text,
    }
}

fn extension(name: &str) -> Option<String> {
    name.rsplit_once('.').map(|(_, ext)| ext.to_lowercase())
}

// =============================================================================
// Loader
// =============================================================================

/// Dispatches uploads to the parser registered for their extension.
pub struct TabularLoader {
    parsers: Vec<Box<dyn TabularParser>>,
}

impl TabularLoader {
    pub fn new(parsers: Vec<Box<dyn TabularParser>>) -> Self {
        Self { parsers }
    }

    /// Extensions accepted by any registered parser.
    pub fn supported(&self) -> Vec<&'static str> {
        self.parsers
            .iter()
            .flat_map(|p| p.extensions().iter().copied())
            .collect()
    }

    /// Parse `bytes` with the parser matching `name`'s extension.
    pub fn load(&self, name: &str, bytes: &[u8]) -> Result<NewDataset, AnalysisError> {
        let ext = extension(name).unwrap_or_default();
        let parser = self
            .parsers
            .iter()
            .find(|p| p.extensions().contains(&ext.as_str()))
            .ok_or_else(|| {
                AnalysisError::UnreadableFile(format!(
                    "unsupported file type '{}'; upload one of: {}",
                    name,
                    self.supported().join(", ")
                ))
            })?;
        parser.parse(name, bytes)
    }
}

impl Default for TabularLoader {
    fn default() -> Self {
        Self::new(vec![Box::new(CsvParser::new())])
    }
}
